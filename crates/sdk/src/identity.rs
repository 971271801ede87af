//! External profiles and session principals

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Identity data returned by a provider after a successful handshake
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// Provider-assigned identifier
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    /// Unmodified provider payload, for hooks that need extra claims
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ExternalProfile {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

/// Minimal authenticated identity kept in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Internal user id
    pub id: String,
    /// Caller-derived extension data, never mixed into `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<serde_json::Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session: None,
        }
    }
}

/// Computes session extension data from a profile
pub trait SessionExtension: Send + Sync {
    fn extend(&self, profile: &ExternalProfile) -> Option<serde_json::Value>;
}

/// Adds nothing to the session
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionExtension;

impl SessionExtension for NoSessionExtension {
    fn extend(&self, _profile: &ExternalProfile) -> Option<serde_json::Value> {
        None
    }
}

/// Group memberships derived from profile emails
///
/// Keys are either a full address (`alice@example.com`) or a domain prefixed
/// with `@` (`@example.com`). Matches are stored as `{"groups": [...]}`.
#[derive(Debug, Clone, Default)]
pub struct EmailGroupMapping {
    rules: HashMap<String, Vec<String>>,
}

impl EmailGroupMapping {
    pub fn new(rules: HashMap<String, Vec<String>>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Groups for all emails of the profile, sorted and deduplicated
    pub fn groups_for(&self, profile: &ExternalProfile) -> Vec<String> {
        let mut groups = BTreeSet::new();
        for email in &profile.emails {
            let email = email.to_ascii_lowercase();
            if let Some(found) = self.rules.get(&email) {
                groups.extend(found.iter().cloned());
            }
            if let Some((_, domain)) = email.rsplit_once('@') {
                if let Some(found) = self.rules.get(&format!("@{domain}")) {
                    groups.extend(found.iter().cloned());
                }
            }
        }
        groups.into_iter().collect()
    }
}

impl SessionExtension for EmailGroupMapping {
    fn extend(&self, profile: &ExternalProfile) -> Option<serde_json::Value> {
        let groups = self.groups_for(profile);
        if groups.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "groups": groups }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(emails: &[&str]) -> ExternalProfile {
        ExternalProfile {
            id: "u1".to_string(),
            display_name: "Alice".to_string(),
            emails: emails.iter().map(|e| (*e).to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_principal_serialization_omits_empty_session() {
        let json = serde_json::to_value(Principal::new("abc")).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "abc" }));
    }

    #[test]
    fn test_group_mapping_domain_and_address() {
        let mapping = EmailGroupMapping::new(HashMap::from([
            ("@Example.com".to_string(), vec!["staff".to_string()]),
            (
                "alice@example.com".to_string(),
                vec!["admins".to_string(), "staff".to_string()],
            ),
        ]));

        assert_eq!(
            mapping.groups_for(&profile(&["Alice@example.com"])),
            vec!["admins".to_string(), "staff".to_string()]
        );
        assert_eq!(
            mapping.groups_for(&profile(&["bob@example.com"])),
            vec!["staff".to_string()]
        );
        assert!(mapping.extend(&profile(&["eve@other.org"])).is_none());
    }
}
