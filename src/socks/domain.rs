//! Domain name validation against the public suffix list
//!
//! A domain target is only dialed when it is a syntactically valid DNS name
//! with a registrable part under a public suffix. Only the ICANN section of
//! the list is loaded, so `foo.blogspot.com` validates against `com`. A TLD
//! missing from the list counts as a suffix of its own (the implicit `*`
//! rule), so `example.newtld` is registrable while a bare `localhost` is not.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use publicsuffix::{List, Psl};
use std::path::Path;
use std::sync::Arc;

const EMBEDDED_PSL: &str = include_str!("../../resources/public_suffix_list.dat");
const PRIVATE_SECTION_MARKER: &str = "===BEGIN PRIVATE DOMAINS===";
const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

lazy_static! {
    static ref EMBEDDED_LIST: Arc<List> = Arc::new(
        parse_icann(EMBEDDED_PSL).expect("embedded public suffix list is well-formed")
    );
}

/// Validates domain targets against a public suffix list
#[derive(Clone)]
pub struct DomainValidator {
    list: Arc<List>,
}

impl std::fmt::Debug for DomainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainValidator").finish_non_exhaustive()
    }
}

impl Default for DomainValidator {
    fn default() -> Self {
        DomainValidator {
            list: EMBEDDED_LIST.clone(),
        }
    }
}

impl DomainValidator {
    /// Load a validator from a public suffix list file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read public suffix list: {:?}", path.as_ref()))?;
        let list = parse_icann(&content)?;
        Ok(DomainValidator {
            list: Arc::new(list),
        })
    }

    /// Build a validator from an optional list path, falling back to the embedded list
    pub fn from_optional_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check whether `name` is a valid registrable domain
    pub fn is_valid(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if !is_valid_dns_name(&name) {
            return false;
        }
        self.list.domain(name.as_bytes()).is_some()
    }
}

/// Parse only the ICANN part of a public suffix list
fn parse_icann(content: &str) -> Result<List> {
    let icann = match content.find(PRIVATE_SECTION_MARKER) {
        Some(pos) => &content[..pos],
        None => content,
    };
    List::from_bytes(icann.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to parse public suffix list: {:?}", e))
}

fn is_valid_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    name.split('.').all(|label| {
        let bytes = label.as_bytes();
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && bytes.first() != Some(&b'-')
            && bytes.last() != Some(&b'-')
            && bytes
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dns_name_syntax() {
        assert!(is_valid_dns_name("github.com"));
        assert!(is_valid_dns_name("a-b.example.com"));
        assert!(!is_valid_dns_name("bad domain.example"));
        assert!(!is_valid_dns_name("-bad.example"));
        assert!(!is_valid_dns_name("bad-.example"));
        assert!(!is_valid_dns_name("bad..example"));
        assert!(!is_valid_dns_name(""));
        assert!(!is_valid_dns_name(&"a".repeat(64)));
    }

    #[test]
    fn test_registrable_domains() {
        let validator = DomainValidator::default();
        assert!(validator.is_valid("example.com"));
        assert!(validator.is_valid("www.example.com"));
        assert!(validator.is_valid("Example.COM"));
        assert!(validator.is_valid("example.com."));
        assert!(validator.is_valid("bbc.co.uk"));
    }

    #[test]
    fn test_bare_suffixes_rejected() {
        let validator = DomainValidator::default();
        assert!(!validator.is_valid("com"));
        assert!(!validator.is_valid("co.uk"));
        assert!(!validator.is_valid("localhost"));
    }

    #[test]
    fn test_country_code_domains() {
        let validator = DomainValidator::default();
        for name in [
            "google.es",
            "example.ch",
            "www.admin.ch",
            "wikipedia.pl",
            "example.se",
            "www.bund.de",
            "example.com.br",
            "yahoo.co.jp",
            "example.com.au",
        ] {
            assert!(validator.is_valid(name), "{} should be valid", name);
        }
        assert!(!validator.is_valid("com.br"));
        assert!(!validator.is_valid("co.jp"));
    }

    #[test]
    fn test_wildcard_and_exception_rules() {
        let validator = DomainValidator::default();
        // `*.ck` makes every second level a suffix, `!www.ck` carves one out
        assert!(!validator.is_valid("foo.ck"));
        assert!(validator.is_valid("bar.foo.ck"));
        assert!(validator.is_valid("www.ck"));
    }

    #[test]
    fn test_unlisted_tld_uses_default_rule() {
        let validator = DomainValidator::default();
        assert!(validator.is_valid("example.invalidtld"));
        assert!(validator.is_valid("printer.lan"));
        assert!(!validator.is_valid("invalidtld"));
    }

    #[test]
    fn test_malformed_rejected() {
        let validator = DomainValidator::default();
        assert!(!validator.is_valid("bad domain.com"));
        assert!(!validator.is_valid("exa$mple.com"));
        assert!(!validator.is_valid(".example.com"));
    }

    #[test]
    fn test_private_section_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "// ===BEGIN ICANN DOMAINS===\ncom\n// ===END ICANN DOMAINS===\n// ===BEGIN PRIVATE DOMAINS===\nblogspot.com\n// ===END PRIVATE DOMAINS==="
        )
        .unwrap();

        let validator = DomainValidator::from_file(file.path()).unwrap();
        assert!(validator.is_valid("blogspot.com"));
        assert!(validator.is_valid("me.blogspot.com"));
    }

    #[test]
    fn test_from_optional_file_missing() {
        assert!(DomainValidator::from_optional_file(Some("/nonexistent/psl.dat")).is_err());
        assert!(DomainValidator::from_optional_file::<&str>(None).is_ok());
    }
}
