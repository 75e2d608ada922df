//! IP allow-list enforcement.

use crate::config::EmptyAllowlistPolicy;
use crate::security::settings::SecuritySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpDecision {
    Allow,
    Deny,
}

/// Decides whether a client IP may pass the deployment's allow-list.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpPolicy {
    empty_allowlist: EmptyAllowlistPolicy,
}

impl IpPolicy {
    pub fn new(empty_allowlist: EmptyAllowlistPolicy) -> Self {
        Self { empty_allowlist }
    }

    /// Check `client_ip` against the allow-list.
    ///
    /// Matching is exact string equality after trimming both sides; no CIDR
    /// or address normalisation. An enabled list with no entries follows the
    /// configured [`EmptyAllowlistPolicy`].
    pub fn check(&self, settings: &SecuritySettings, client_ip: &str) -> IpDecision {
        let access = &settings.access;
        if !access.ip_whitelist_enabled {
            return IpDecision::Allow;
        }

        if access.allowed_ips.is_empty() {
            return match self.empty_allowlist {
                EmptyAllowlistPolicy::AllowAll => IpDecision::Allow,
                EmptyAllowlistPolicy::DenyAll => IpDecision::Deny,
            };
        }

        let client_ip = client_ip.trim();
        if access.allowed_ips.iter().any(|ip| ip.trim() == client_ip) {
            IpDecision::Allow
        } else {
            IpDecision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::settings::AccessSettings;

    fn settings(enabled: bool, ips: &[&str]) -> SecuritySettings {
        SecuritySettings {
            access: AccessSettings {
                ip_whitelist_enabled: enabled,
                allowed_ips: ips.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_disabled_allows_everyone() {
        let policy = IpPolicy::default();
        assert_eq!(policy.check(&settings(false, &["10.0.0.1"]), "8.8.8.8"), IpDecision::Allow);
    }

    #[test]
    fn test_enabled_list_is_enforced() {
        let policy = IpPolicy::default();
        let s = settings(true, &[" 10.0.0.1 ", "10.0.0.2"]);
        assert_eq!(policy.check(&s, "10.0.0.1"), IpDecision::Allow);
        assert_eq!(policy.check(&s, "10.0.0.2 "), IpDecision::Allow);
        assert_eq!(policy.check(&s, "10.0.0.3"), IpDecision::Deny);
        assert_eq!(policy.check(&s, "unknown"), IpDecision::Deny);
    }

    #[test]
    fn test_no_prefix_or_cidr_matching() {
        let policy = IpPolicy::default();
        let s = settings(true, &["10.0.0.0/8"]);
        assert_eq!(policy.check(&s, "10.0.0.1"), IpDecision::Deny);
    }

    #[test]
    fn test_enabled_empty_list_allows_by_default() {
        let policy = IpPolicy::default();
        assert_eq!(policy.check(&settings(true, &[]), "8.8.8.8"), IpDecision::Allow);
    }

    #[test]
    fn test_enabled_empty_list_can_deny_all() {
        let policy = IpPolicy::new(EmptyAllowlistPolicy::DenyAll);
        assert_eq!(policy.check(&settings(true, &[]), "8.8.8.8"), IpDecision::Deny);
        assert_eq!(policy.check(&settings(false, &[]), "8.8.8.8"), IpDecision::Allow);
    }
}
