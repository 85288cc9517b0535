//! Runtime configuration.

use islet_audit::AuditConfig;
use islet_isolate::IsolateConfig;
use islet_policy::NetworkPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for the whole subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Network policy applied to submissions.
    pub network: NetworkPolicy,
    /// Audit behavior.
    pub audit: AuditConfig,
    /// Isolate tiers and engine limits.
    pub isolate: IsolateConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_locked_down() {
        let config = RuntimeConfig::default();
        assert!(config.network.allowed.is_empty());
        assert!(!config.network.allow_localhost);
        assert!(!config.network.allow_private_ips);
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml_src = r#"
            [network]
            allowed = ["api.example.com", "*.internal.corp"]
            allow_localhost = true
            timeout_ms = 5000

            [audit]
            include_code_snippets = true

            [isolate]
            start_tier = "in_process"
        "#;
        let config: RuntimeConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.network.allowed.len(), 2);
        assert!(config.network.allow_localhost);
        assert_eq!(config.network.timeout_ms, 5000);
        assert!(config.audit.include_code_snippets);
        assert_eq!(config.isolate.start_tier, islet_isolate::Tier::InProcess);

        let rendered = toml::to_string(&config).unwrap();
        let back: RuntimeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(back.network.allowed, config.network.allowed);
    }
}
