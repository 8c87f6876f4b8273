//! Feature passwords gating provider and admin permissions
//!
//! Passwords are configured as `pw_a:perm1,perm2;pw_b:perm3` and presented
//! in the `x-feature-password` header. A `<group>-all` permission grants
//! every permission of that group, so `llm-all` unlocks `llm-gemini`.
//!
//! Without configured passwords every `llm-*` permission is open, while
//! `admin-*` permissions are always refused.

use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Permission required for queue status and tuning endpoints
pub const ADMIN_QUEUE_PERMISSION: &str = "admin-queue";

const ALL_SUFFIX: &str = "all";
const ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeaturePasswords {
    enabled: bool,
    grants: HashMap<String, HashSet<String>>,
}

impl FeaturePasswords {
    /// Parse a password list; malformed entries are skipped with a warning
    pub fn parse(spec: &str, enabled: bool) -> Self {
        let mut grants: HashMap<String, HashSet<String>> = HashMap::new();

        for entry in spec.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            let [password, permissions] = parts.as_slice() else {
                warn!(entry_parts = parts.len(), "Skipping malformed feature password entry");
                continue;
            };

            let password = password.trim();
            if password.is_empty() {
                continue;
            }

            grants.entry(password.to_string()).or_default().extend(
                permissions
                    .split(',')
                    .map(str::trim)
                    .filter(|permission| !permission.is_empty())
                    .map(str::to_string),
            );
        }

        Self { enabled, grants }
    }

    /// No password is ever required
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Checks apply only when enabled and at least one password exists
    pub fn is_active(&self) -> bool {
        self.enabled && !self.grants.is_empty()
    }

    pub fn has_permission(&self, password: Option<&str>, permission: &str) -> bool {
        if !self.is_active() {
            return !is_admin(permission);
        }

        let Some(granted) = password.and_then(|password| self.grants.get(password)) else {
            return false;
        };

        if granted.contains(permission) {
            return true;
        }

        permission
            .split_once('-')
            .is_some_and(|(group, _)| granted.contains(&format!("{group}-{ALL_SUFFIX}")))
    }
}

fn is_admin(permission: &str) -> bool {
    permission
        .split_once('-')
        .is_some_and(|(group, _)| group == ADMIN_GROUP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn passwords() -> FeaturePasswords {
        FeaturePasswords::parse(" alpha: llm-gemini , llm-openai ;beta:llm-all;gamma;:x;delta:admin-queue", true)
    }

    #[rstest]
    #[case(Some("alpha"), "llm-gemini", true)]
    #[case(Some("alpha"), "llm-openai", true)]
    #[case(Some("alpha"), "llm-deepseek", false)]
    #[case(Some("beta"), "llm-deepseek", true)]
    #[case(Some("beta"), "admin-queue", false)]
    #[case(Some("delta"), "admin-queue", true)]
    #[case(Some("gamma"), "llm-gemini", false)]
    #[case(Some("unknown"), "llm-gemini", false)]
    #[case(None, "llm-gemini", false)]
    fn permissions_follow_grants(
        #[case] password: Option<&str>,
        #[case] permission: &str,
        #[case] allowed: bool,
    ) {
        assert_eq!(passwords().has_permission(password, permission), allowed);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let parsed = FeaturePasswords::parse("a:b:c;ok:llm-openai", true);
        assert!(parsed.is_active());
        assert!(!parsed.has_permission(Some("a"), "b"));
        assert!(parsed.has_permission(Some("ok"), "llm-openai"));
    }

    #[test]
    fn provider_checks_are_off_without_passwords_or_when_disabled() {
        assert!(FeaturePasswords::parse("", true).has_permission(None, "llm-gemini"));
        assert!(FeaturePasswords::parse("pw:llm-openai", false).has_permission(None, "llm-gemini"));
        assert!(FeaturePasswords::disabled().has_permission(Some("x"), "llm-deepseek"));
    }

    #[rstest]
    #[case::disabled(FeaturePasswords::disabled())]
    #[case::empty_list(FeaturePasswords::parse("", true))]
    #[case::check_turned_off(FeaturePasswords::parse("ops:admin-queue", false))]
    fn admin_permissions_are_refused_when_checks_are_inactive(#[case] passwords: FeaturePasswords) {
        assert!(!passwords.has_permission(None, ADMIN_QUEUE_PERMISSION));
        assert!(!passwords.has_permission(Some("ops"), ADMIN_QUEUE_PERMISSION));
    }
}
