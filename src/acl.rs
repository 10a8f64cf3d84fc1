use crate::config::AclConfig;
use base64::Engine;
use std::net::IpAddr;

/// One ordered ACL rule. Predicates that are `None` are not constraints —
/// a rule with no `identity` matches requests with or without Basic auth.
struct AclRule {
    identity: Option<String>,
    cidr: Option<ipnet::IpNet>,
    verbs: Vec<String>,
    allow: bool,
}

impl AclRule {
    fn matches(&self, ip: IpAddr, identity: Option<&str>, verb_upper: &str) -> bool {
        if let Some(net) = &self.cidr {
            if !net.contains(&ip) {
                return false;
            }
        }
        if let Some(want) = &self.identity {
            if identity != Some(want.as_str()) {
                return false;
            }
        }
        self.verbs
            .iter()
            .any(|v| v == "*" || v.eq_ignore_ascii_case(verb_upper))
    }
}

pub struct Acl {
    rules: Vec<AclRule>,
}

impl Acl {
    /// Each JSON `acl` entry may carry an `enabled` list, a `disabled`
    /// list, or both. Both are flattened into separate rules, `enabled`
    /// first, preserving declaration order across the whole array so that
    /// first-match-wins evaluation still respects "this entry's allow
    /// takes priority over this entry's deny."
    pub fn new(config: Option<Vec<AclConfig>>) -> Self {
        let mut rules = Vec::new();
        for entry in config.into_iter().flatten() {
            let cidr = entry.cidr.as_deref().and_then(|c| c.parse().ok());
            if let Some(verbs) = entry.enabled.filter(|v| !v.is_empty()) {
                rules.push(AclRule {
                    identity: entry.http_basic_auth.clone(),
                    cidr,
                    verbs,
                    allow: true,
                });
            }
            if let Some(verbs) = entry.disabled.filter(|v| !v.is_empty()) {
                rules.push(AclRule {
                    identity: entry.http_basic_auth.clone(),
                    cidr,
                    verbs,
                    allow: false,
                });
            }
        }
        Self { rules }
    }

    /// First matching rule wins. No rules configured ⇒ default allow.
    /// Rules configured but none match ⇒ default deny.
    pub fn check(&self, ip: IpAddr, verb: &[u8], basic_auth: Option<&str>) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let verb_upper = String::from_utf8_lossy(verb).to_ascii_uppercase();
        for rule in &self.rules {
            if rule.matches(ip, basic_auth, &verb_upper) {
                return rule.allow;
            }
        }
        false
    }
}

/// Decodes an HTTP `Authorization: Basic <b64>` header into the literal
/// `user:pass` string an ACL rule's `http_basic_auth` is compared against.
pub fn decode_basic_auth(header_value: &str) -> Option<String> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    String::from_utf8(decoded).ok()
}
