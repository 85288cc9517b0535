//! Network policy configuration and host classification.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Static network policy for a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPolicy {
    /// Domain patterns external requests may target. Empty blocks all
    /// external traffic. `*` matches any hostname.
    pub allowed: Vec<String>,
    /// Domain patterns that are always refused. A blocked match overrides
    /// an allow match.
    pub blocked: Vec<String>,
    /// Allow localhost targets without elicitation.
    pub allow_localhost: bool,
    /// Allow RFC1918 targets without elicitation.
    pub allow_private_ips: bool,
    /// Upper bound on serialized request body bytes.
    pub max_request_bytes: usize,
    /// Upper bound on response body bytes.
    pub max_response_bytes: u64,
    /// Per-request wall clock in milliseconds.
    pub timeout_ms: u64,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            blocked: Vec::new(),
            allow_localhost: false,
            allow_private_ips: false,
            max_request_bytes: 1024 * 1024,
            max_response_bytes: 10 * 1024 * 1024,
            timeout_ms: 30_000,
        }
    }
}

impl NetworkPolicy {
    /// Whether `hostname` matches any allowed pattern.
    #[must_use]
    pub fn is_allowed_host(&self, hostname: &str) -> bool {
        self.allowed.iter().any(|p| pattern_matches(p, hostname))
    }

    /// Whether `hostname` matches any blocked pattern.
    #[must_use]
    pub fn is_blocked_host(&self, hostname: &str) -> bool {
        self.blocked.iter().any(|p| pattern_matches(p, hostname))
    }

    /// Apply a per-binding override, field-wise. Override fields win.
    #[must_use]
    pub fn merged_with(&self, over: &PolicyOverride) -> Self {
        Self {
            allowed: over.allowed.clone().unwrap_or_else(|| self.allowed.clone()),
            blocked: over.blocked.clone().unwrap_or_else(|| self.blocked.clone()),
            allow_localhost: over.allow_localhost.unwrap_or(self.allow_localhost),
            allow_private_ips: over.allow_private_ips.unwrap_or(self.allow_private_ips),
            max_request_bytes: over.max_request_bytes.unwrap_or(self.max_request_bytes),
            max_response_bytes: over.max_response_bytes.unwrap_or(self.max_response_bytes),
            timeout_ms: over.timeout_ms.unwrap_or(self.timeout_ms),
        }
    }
}

/// Partial policy attached to a binding; merged over the global policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    /// Replacement allow list.
    pub allowed: Option<Vec<String>>,
    /// Replacement block list.
    pub blocked: Option<Vec<String>>,
    /// Override for localhost access.
    pub allow_localhost: Option<bool>,
    /// Override for RFC1918 access.
    pub allow_private_ips: Option<bool>,
    /// Override for the request size cap.
    pub max_request_bytes: Option<usize>,
    /// Override for the response size cap.
    pub max_response_bytes: Option<u64>,
    /// Override for the per-request deadline.
    pub timeout_ms: Option<u64>,
}

/// Match a domain pattern against a hostname.
///
/// Grammar: `*` matches anything; `*.suffix` matches any hostname that
/// ends with `.suffix` (but not the bare suffix); anything else matches
/// exactly, case-insensitively.
#[must_use]
pub fn pattern_matches(pattern: &str, hostname: &str) -> bool {
    let hostname = hostname.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return hostname
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'));
    }
    pattern == hostname
}

/// Classification of a request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostClass {
    /// Loopback names and addresses.
    Localhost,
    /// RFC1918 private IPv4 space.
    PrivateIp,
    /// Anything else.
    External,
}

/// Classify a hostname.
#[must_use]
pub fn classify_host(hostname: &str) -> HostClass {
    let lower = hostname.to_ascii_lowercase();
    if matches!(lower.as_str(), "localhost" | "::1" | "0.0.0.0") {
        return HostClass::Localhost;
    }
    if let Ok(ip) = lower.parse::<Ipv4Addr>() {
        if ip.is_loopback() {
            return HostClass::Localhost;
        }
        let octets = ip.octets();
        let private = octets[0] == 10
            || (octets[0] == 172 && (16..=31).contains(&octets[1]))
            || (octets[0] == 192 && octets[1] == 168);
        if private {
            return HostClass::PrivateIp;
        }
    }
    HostClass::External
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        assert!(pattern_matches("api.example.com", "api.example.com"));
        assert!(pattern_matches("API.Example.com", "api.example.com"));
        assert!(!pattern_matches("api.example.com", "www.example.com"));
    }

    #[test]
    fn test_wildcard_suffix_pattern() {
        assert!(pattern_matches("*.example.com", "api.example.com"));
        assert!(pattern_matches("*.example.com", "a.b.example.com"));
        assert!(!pattern_matches("*.example.com", "example.com"));
        assert!(!pattern_matches("*.example.com", "badexample.com"));
    }

    #[test]
    fn test_star_matches_any_hostname() {
        assert!(pattern_matches("*", "anything.invalid"));
        assert!(pattern_matches("*", "localhost"));
    }

    #[test]
    fn test_blocked_overrides_allowed() {
        let policy = NetworkPolicy {
            allowed: vec!["*.example.com".into()],
            blocked: vec!["evil.example.com".into()],
            ..NetworkPolicy::default()
        };
        assert!(policy.is_allowed_host("evil.example.com"));
        assert!(policy.is_blocked_host("evil.example.com"));
    }

    #[test]
    fn test_classify_localhost() {
        assert_eq!(classify_host("localhost"), HostClass::Localhost);
        assert_eq!(classify_host("127.0.0.1"), HostClass::Localhost);
        assert_eq!(classify_host("::1"), HostClass::Localhost);
        assert_eq!(classify_host("0.0.0.0"), HostClass::Localhost);
    }

    #[test]
    fn test_classify_private_ranges() {
        assert_eq!(classify_host("10.0.0.5"), HostClass::PrivateIp);
        assert_eq!(classify_host("172.16.1.1"), HostClass::PrivateIp);
        assert_eq!(classify_host("172.31.255.1"), HostClass::PrivateIp);
        assert_eq!(classify_host("192.168.0.10"), HostClass::PrivateIp);
        assert_eq!(classify_host("172.32.0.1"), HostClass::External);
        assert_eq!(classify_host("8.8.8.8"), HostClass::External);
    }

    #[test]
    fn test_override_merge() {
        let base = NetworkPolicy {
            allowed: vec!["api.example.com".into()],
            timeout_ms: 30_000,
            ..NetworkPolicy::default()
        };
        let over = PolicyOverride {
            allowed: Some(vec!["internal.corp".into()]),
            timeout_ms: Some(5_000),
            ..PolicyOverride::default()
        };
        let merged = base.merged_with(&over);
        assert_eq!(merged.allowed, vec!["internal.corp".to_string()]);
        assert_eq!(merged.timeout_ms, 5_000);
        assert_eq!(merged.max_request_bytes, base.max_request_bytes);
    }
}
