use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::rate_limit::AdmissionError;
use crate::config::PolicyOverride;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;

/// Admission policies. Each route is assigned exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatePolicy {
    CredentialIssuance,
    BotCreation,
    ChatTurn,
    General,
    Upload,
}

impl RatePolicy {
    pub const ALL: [RatePolicy; 5] = [
        Self::CredentialIssuance,
        Self::BotCreation,
        Self::ChatTurn,
        Self::General,
        Self::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialIssuance => "credential-issuance",
            Self::BotCreation => "bot-creation",
            Self::ChatTurn => "chat-turn",
            Self::General => "general",
            Self::Upload => "upload",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn default_spec(&self) -> PolicySpec {
        match self {
            Self::CredentialIssuance => PolicySpec {
                window_ms: 15 * MINUTE_MS,
                limit: 1000,
                bypassable: true,
                skip_successful: true,
            },
            Self::BotCreation => PolicySpec {
                window_ms: 60 * MINUTE_MS,
                limit: 100,
                bypassable: true,
                skip_successful: false,
            },
            // Enforced in every environment, unlike its siblings.
            Self::ChatTurn => PolicySpec {
                window_ms: 60 * SECOND_MS,
                limit: 100,
                bypassable: false,
                skip_successful: false,
            },
            Self::General => PolicySpec {
                window_ms: 15 * MINUTE_MS,
                limit: 100,
                bypassable: false,
                skip_successful: false,
            },
            Self::Upload => PolicySpec {
                window_ms: 60 * MINUTE_MS,
                limit: 200,
                bypassable: true,
                skip_successful: false,
            },
        }
    }
}

impl fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySpec {
    pub window_ms: u64,
    pub limit: u32,
    /// Skipped entirely when the controller is not enforced
    pub bypassable: bool,
    /// Only requests that end unsuccessfully consume budget
    pub skip_successful: bool,
}

/// Resolved per-policy parameters.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    specs: HashMap<RatePolicy, PolicySpec>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            specs: RatePolicy::ALL
                .into_iter()
                .map(|p| (p, p.default_spec()))
                .collect(),
        }
    }
}

impl PolicyTable {
    pub fn with_overrides(
        overrides: &HashMap<String, PolicyOverride>,
    ) -> Result<Self, AdmissionError> {
        let mut table = Self::default();
        for (name, o) in overrides {
            let policy = RatePolicy::from_name(name)
                .ok_or_else(|| AdmissionError::UnknownPolicy(name.clone()))?;
            let spec = table
                .specs
                .get_mut(&policy)
                .ok_or_else(|| AdmissionError::UnknownPolicy(name.clone()))?;
            if let Some(window_ms) = o.window_ms {
                spec.window_ms = window_ms;
            }
            if let Some(limit) = o.limit {
                spec.limit = limit;
            }
            if spec.window_ms == 0 || spec.limit == 0 {
                return Err(AdmissionError::InvalidPolicy(format!(
                    "{} needs a non-zero window and limit",
                    policy
                )));
            }
        }
        Ok(table)
    }

    pub fn get(&self, policy: RatePolicy) -> PolicySpec {
        self.specs
            .get(&policy)
            .copied()
            .unwrap_or_else(|| policy.default_spec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = PolicyTable::default();

        let chat = table.get(RatePolicy::ChatTurn);
        assert_eq!((chat.window_ms, chat.limit), (60_000, 100));
        assert!(!chat.bypassable);

        let creds = table.get(RatePolicy::CredentialIssuance);
        assert_eq!((creds.window_ms, creds.limit), (900_000, 1000));
        assert!(creds.bypassable && creds.skip_successful);

        assert!(!table.get(RatePolicy::General).bypassable);
        assert!(table.get(RatePolicy::BotCreation).bypassable);
        assert_eq!(table.get(RatePolicy::Upload).limit, 200);
    }

    #[test]
    fn test_policy_names() {
        for policy in RatePolicy::ALL {
            assert_eq!(RatePolicy::from_name(policy.as_str()), Some(policy));
        }
        assert_eq!(RatePolicy::from_name("Chat-Turn"), Some(RatePolicy::ChatTurn));
        assert_eq!(RatePolicy::from_name("login"), None);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "chat-turn".to_string(),
            PolicyOverride {
                window_ms: Some(1_000),
                limit: Some(3),
            },
        );
        let table = PolicyTable::with_overrides(&overrides).unwrap();
        let chat = table.get(RatePolicy::ChatTurn);
        assert_eq!((chat.window_ms, chat.limit), (1_000, 3));
        assert_eq!(table.get(RatePolicy::General).limit, 100);

        overrides.insert(
            "nope".to_string(),
            PolicyOverride {
                window_ms: None,
                limit: None,
            },
        );
        assert!(matches!(
            PolicyTable::with_overrides(&overrides),
            Err(AdmissionError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "upload".to_string(),
            PolicyOverride {
                window_ms: None,
                limit: Some(0),
            },
        );
        assert!(matches!(
            PolicyTable::with_overrides(&overrides),
            Err(AdmissionError::InvalidPolicy(_))
        ));
    }
}
