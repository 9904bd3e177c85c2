//! Config-driven rule set
//!
//! Rules are checked in order and the first match decides. A rule matches a
//! host when any of its matchers does; hosts that match nothing fall through
//! to the `final` route.

use super::{RouteDecision, RuleLookup};
use crate::config::{RuleConfig, RulesConfig, DIRECT_ROUTE};
use anyhow::{bail, Context, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Parse `a.b.c.d/n` or `v6::/n`; a bare address matches only itself
fn parse_cidr(s: &str) -> Result<IpNet> {
    let s = s.trim();
    if s.contains('/') {
        return s
            .parse::<IpNet>()
            .with_context(|| format!("Invalid CIDR: {}", s));
    }
    let ip: IpAddr = s.parse().with_context(|| format!("Invalid CIDR: {}", s))?;
    Ok(IpNet::from(ip))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Domain(String),
    DomainSuffix(String),
    DomainKeyword(String),
    IpCidr(IpNet),
}

impl Matcher {
    fn matches(&self, host: &str, ip: Option<&IpAddr>) -> bool {
        match self {
            Matcher::Domain(domain) => ip.is_none() && host == domain,
            Matcher::DomainSuffix(suffix) => {
                ip.is_none()
                    && (host == suffix
                        || (host.len() > suffix.len()
                            && host.ends_with(suffix.as_str())
                            && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'))
            }
            Matcher::DomainKeyword(keyword) => ip.is_none() && host.contains(keyword.as_str()),
            Matcher::IpCidr(net) => ip.map_or(false, |ip| net.contains(ip)),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    matchers: Vec<Matcher>,
    decision: RouteDecision,
}

/// Ordered rule list implementing [`RuleLookup`]
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    fallback: RouteDecision,
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet {
            rules: Vec::new(),
            fallback: RouteDecision::Direct,
        }
    }
}

impl RuleSet {
    /// Compile the configured rules
    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        let rules = config
            .rule
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                compile_rule(rule).with_context(|| format!("Invalid rule #{}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RuleSet {
            rules,
            fallback: decision_for(&config.fallback),
        })
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules besides the fallback
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleLookup for RuleSet {
    fn resolve(&self, host: &str) -> RouteDecision {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let ip = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .ok();

        self.rules
            .iter()
            .find(|rule| rule.matchers.iter().any(|m| m.matches(&host, ip.as_ref())))
            .map(|rule| rule.decision.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn decision_for(via: &str) -> RouteDecision {
    if via.eq_ignore_ascii_case(DIRECT_ROUTE) {
        RouteDecision::Direct
    } else {
        RouteDecision::ProxyVia(via.to_string())
    }
}

fn compile_rule(rule: &RuleConfig) -> Result<Rule> {
    let lower = |s: &String| s.trim().trim_end_matches('.').to_ascii_lowercase();

    let mut matchers = Vec::new();
    matchers.extend(rule.domain.iter().map(|d| Matcher::Domain(lower(d))));
    matchers.extend(
        rule.domain_suffix
            .iter()
            .map(|d| Matcher::DomainSuffix(lower(d).trim_start_matches('.').to_string())),
    );
    matchers.extend(
        rule.domain_keyword
            .iter()
            .map(|d| Matcher::DomainKeyword(lower(d))),
    );
    for cidr in &rule.ip_cidr {
        matchers.push(Matcher::IpCidr(parse_cidr(cidr)?));
    }

    if matchers.is_empty() {
        bail!("Rule has no matchers");
    }

    Ok(Rule {
        matchers,
        decision: decision_for(&rule.via),
    })
}
