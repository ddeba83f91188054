//! Principals and the directory they are resolved from.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::password::PasswordService;
use crate::config::AccountSeed;

/// Authenticated identity attached to a request. Never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid account seed {id}: {reason}")]
    InvalidSeed { id: String, reason: String },
}

/// User lookup collaborator (port).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_principal_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError>;

    /// Resolve a principal from login credentials. `None` covers both an
    /// unknown email and a wrong password.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Principal>, DirectoryError>;
}

#[derive(Debug, Clone)]
struct Account {
    principal: Principal,
    password_hash: String,
}

/// In-process directory backed by DashMap.
#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: DashMap<String, Account>,
    /// lowercase email -> id
    by_email: DashMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: &[AccountSeed]) -> Result<Self, DirectoryError> {
        let directory = Self::new();
        for seed in seeds {
            PasswordService::validate_format(&seed.password_hash).map_err(|e| {
                DirectoryError::InvalidSeed {
                    id: seed.id.clone(),
                    reason: e.to_string(),
                }
            })?;
            directory.insert(
                Principal {
                    id: seed.id.clone(),
                    email: seed.email.clone(),
                    display_name: seed.display_name.clone(),
                },
                seed.password_hash.clone(),
            );
        }
        info!("Principal directory seeded with {} account(s)", directory.len());
        Ok(directory)
    }

    pub fn insert(&self, principal: Principal, password_hash: String) {
        self.by_email
            .insert(principal.email.to_lowercase(), principal.id.clone());
        self.accounts.insert(
            principal.id.clone(),
            Account {
                principal,
                password_hash,
            },
        );
    }

    pub fn remove(&self, id: &str) -> Option<Principal> {
        let (_, account) = self.accounts.remove(id)?;
        self.by_email.remove(&account.principal.email.to_lowercase());
        Some(account.principal)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryDirectory {
    async fn find_principal_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.accounts.get(id).map(|a| a.principal.clone()))
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Principal>, DirectoryError> {
        let Some(id) = self.by_email.get(&email.to_lowercase()).map(|e| e.value().clone()) else {
            debug!("Login for unknown email");
            return Ok(None);
        };

        let Some(account) = self.accounts.get(&id).map(|a| a.value().clone()) else {
            return Ok(None);
        };

        let valid = PasswordService::verify(password, &account.password_hash)
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if !valid {
            warn!("Invalid password for principal {}", account.principal.id);
            return Ok(None);
        }

        Ok(Some(account.principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal {
            id: "u-1".to_string(),
            email: "Alice@Example.com".to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lookup_and_authenticate() {
        let directory = InMemoryDirectory::new();
        directory.insert(alice(), PasswordService::hash("s3cret-pass").unwrap());

        let found = directory.find_principal_by_id("u-1").await.unwrap();
        assert_eq!(found, Some(alice()));
        assert!(directory.find_principal_by_id("u-2").await.unwrap().is_none());

        let ok = directory
            .authenticate("alice@example.com", "s3cret-pass")
            .await
            .unwrap();
        assert_eq!(ok, Some(alice()));

        let wrong = directory
            .authenticate("alice@example.com", "nope")
            .await
            .unwrap();
        assert!(wrong.is_none());
    }

    #[tokio::test]
    async fn test_removed_principal_is_gone() {
        let directory = InMemoryDirectory::new();
        directory.insert(alice(), PasswordService::hash("pw").unwrap());
        assert!(directory.remove("u-1").is_some());
        assert!(directory.find_principal_by_id("u-1").await.unwrap().is_none());
        assert!(directory
            .authenticate("alice@example.com", "pw")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_seed_rejects_plaintext_password() {
        let seeds = vec![AccountSeed {
            id: "u-1".to_string(),
            email: "a@b.c".to_string(),
            display_name: "A".to_string(),
            password_hash: "plaintext".to_string(),
        }];
        assert!(matches!(
            InMemoryDirectory::from_seeds(&seeds),
            Err(DirectoryError::InvalidSeed { .. })
        ));
    }
}
