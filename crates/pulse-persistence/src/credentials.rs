//! Broker credential interface.
//!
//! Token storage and encryption live outside the core; the pipeline only
//! ever asks for a token by user id and treats `None` as "no linked
//! broker account".

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// One linked broker account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAccount {
    pub account_id: String,
    pub currency: String,
}

/// Credential lookup capability.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn get_token(&self, user_id: &str) -> Option<String>;
    async fn get_active_account(&self, user_id: &str) -> Option<BrokerAccount>;
    async fn list_accounts(&self, user_id: &str) -> Vec<BrokerAccount>;
}

#[derive(Clone)]
struct CredentialEntry {
    token: String,
    accounts: Vec<BrokerAccount>,
}

/// In-memory credentials for tests and development.
#[derive(Default)]
pub struct InMemoryCredentials {
    entries: RwLock<HashMap<String, CredentialEntry>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(
        &self,
        user_id: impl Into<String>,
        token: impl Into<String>,
        accounts: Vec<BrokerAccount>,
    ) {
        self.entries.write().insert(
            user_id.into(),
            CredentialEntry {
                token: token.into(),
                accounts,
            },
        );
    }
}

#[async_trait]
impl CredentialSource for InMemoryCredentials {
    async fn get_token(&self, user_id: &str) -> Option<String> {
        self.entries.read().get(user_id).map(|e| e.token.clone())
    }

    async fn get_active_account(&self, user_id: &str) -> Option<BrokerAccount> {
        self.entries
            .read()
            .get(user_id)
            .and_then(|e| e.accounts.first().cloned())
    }

    async fn list_accounts(&self, user_id: &str) -> Vec<BrokerAccount> {
        self.entries
            .read()
            .get(user_id)
            .map(|e| e.accounts.clone())
            .unwrap_or_default()
    }
}
