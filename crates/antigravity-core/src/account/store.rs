//! Atomic, serialised JSON persistence for the account list.
//!
//! Grounded in the teacher's `modules/config.rs` temp-file + rename
//! discipline, generalised to the full account CRUD surface the spec
//! requires (`list`, `get`, `upsert`, `remove`, `setEnabled`, `setInvalid`,
//! `setThresholds`, `reload`).

use std::collections::HashMap;
use std::path::PathBuf;

use antigravity_types::error::AccountError;
use antigravity_types::models::{Account, AccountIndex, SubscriptionTier};
use tokio::sync::Mutex;

type Result<T> = std::result::Result<T, AccountError>;

/// Owns the on-disk account index and serialises every write behind a
/// single mutex, so concurrent dispatcher tasks never race a save.
pub struct AccountStore {
    path: PathBuf,
    max_accounts: usize,
    inner: Mutex<AccountIndex>,
}

impl AccountStore {
    /// Load (or initialise) the store at `path`.
    pub async fn load(path: PathBuf, max_accounts: usize) -> Result<Self> {
        let index = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AccountError::StorageError { message: format!("parse accounts.json: {err}") }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AccountIndex::new(),
            Err(err) => {
                return Err(AccountError::StorageError {
                    message: format!("read accounts.json: {err}"),
                })
            }
        };
        Ok(Self { path, max_accounts, inner: Mutex::new(index) })
    }

    /// All accounts currently held in memory.
    pub async fn list(&self) -> Vec<Account> {
        self.inner.lock().await.accounts.clone()
    }

    /// A single account by email.
    pub async fn get(&self, email: &str) -> Option<Account> {
        self.inner.lock().await.accounts.iter().find(|a| a.email == email).cloned()
    }

    /// Insert or replace an account, enforcing the maximum-accounts cap on
    /// insert (replacing an existing email never counts against the cap).
    pub async fn upsert(&self, account: Account) -> Result<()> {
        let mut index = self.inner.lock().await;
        match index.accounts.iter_mut().find(|a| a.email == account.email) {
            Some(existing) => *existing = account,
            None => {
                if index.accounts.len() >= self.max_accounts {
                    return Err(AccountError::PoolExhausted {
                        reason: format!("max account cap ({}) reached", self.max_accounts),
                    });
                }
                index.accounts.push(account);
            }
        }
        self.persist(&index).await
    }

    /// Remove an account by email. No-op if absent.
    pub async fn remove(&self, email: &str) -> Result<()> {
        let mut index = self.inner.lock().await;
        index.accounts.retain(|a| a.email != email);
        self.persist(&index).await
    }

    /// Toggle the account-level `enabled` flag.
    pub async fn set_enabled(&self, email: &str, enabled: bool) -> Result<()> {
        let mut index = self.inner.lock().await;
        let account = index
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| AccountError::NotFound { id: email.to_string() })?;
        account.enabled = enabled;
        self.persist(&index).await
    }

    /// Mark (or clear) an account as permanently invalid.
    pub async fn set_invalid(&self, email: &str, reason: Option<String>) -> Result<()> {
        let mut index = self.inner.lock().await;
        let account = index
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| AccountError::NotFound { id: email.to_string() })?;
        account.is_invalid = reason.is_some();
        account.invalid_reason = reason;
        self.persist(&index).await
    }

    /// Record the subscription tier last observed for `email`.
    pub async fn set_subscription_tier(&self, email: &str, tier: SubscriptionTier) -> Result<()> {
        let mut index = self.inner.lock().await;
        let account = index
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| AccountError::NotFound { id: email.to_string() })?;
        account.subscription_tier = tier;
        self.persist(&index).await
    }

    /// Update the account- and per-model quota thresholds.
    pub async fn set_thresholds(
        &self,
        email: &str,
        account_threshold: Option<f64>,
        per_model_thresholds: Option<HashMap<String, f64>>,
    ) -> Result<()> {
        let mut index = self.inner.lock().await;
        let account = index
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| AccountError::NotFound { id: email.to_string() })?;
        account.account_quota_threshold = account_threshold;
        account.per_model_quota_thresholds = per_model_thresholds;
        self.persist(&index).await
    }

    /// Re-read the file from disk, merging dispatcher-owned transient state
    /// (rate-limit entries, consecutive-failure counters) from the current
    /// in-memory copy by email so an external edit never erases live pool
    /// bookkeeping.
    pub async fn reload(&self) -> Result<()> {
        let on_disk: AccountIndex = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AccountError::StorageError { message: format!("parse accounts.json: {err}") }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AccountIndex::new(),
            Err(err) => {
                return Err(AccountError::StorageError {
                    message: format!("read accounts.json: {err}"),
                })
            }
        };

        let mut index = self.inner.lock().await;
        let previous: HashMap<String, Account> =
            index.accounts.drain(..).map(|a| (a.email.clone(), a)).collect();

        index.accounts = on_disk
            .accounts
            .into_iter()
            .map(|mut fresh| {
                if let Some(live) = previous.get(&fresh.email) {
                    fresh.rate_limits = live.rate_limits.clone();
                    fresh.consecutive_failures = live.consecutive_failures;
                }
                fresh
            })
            .collect();
        index.active_email = on_disk.active_email;

        Ok(())
    }

    async fn persist(&self, index: &AccountIndex) -> Result<()> {
        let serialized = serde_json::to_string_pretty(index).map_err(|err| {
            AccountError::StorageError { message: format!("serialize accounts.json: {err}") }
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                AccountError::StorageError { message: format!("create config dir: {err}") }
            })?;
        }
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|err| AccountError::StorageError { message: format!("write temp file: {err}") })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|err| AccountError::StorageError { message: format!("rename temp file: {err}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_types::models::CredentialKind;

    fn make_account(email: &str) -> Account {
        Account::new(email.to_string(), CredentialKind::OauthRefresh, "rt|p|mp".to_string())
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::load(dir.path().join("accounts.json"), 10).await.unwrap();
        store.upsert(make_account("a@x.com")).await.unwrap();
        let fetched = store.get("a@x.com").await.unwrap();
        assert_eq!(fetched.email, "a@x.com");
    }

    #[tokio::test]
    async fn max_accounts_cap_is_enforced_on_insert() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::load(dir.path().join("accounts.json"), 1).await.unwrap();
        store.upsert(make_account("a@x.com")).await.unwrap();
        let second = store.upsert(make_account("b@x.com")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn reload_preserves_transient_rate_limit_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let store = AccountStore::load(path.clone(), 10).await.unwrap();
        store.upsert(make_account("a@x.com")).await.unwrap();

        {
            let mut index = store.inner.lock().await;
            index.accounts[0].mark_rate_limited("gemini-3-pro", 999_999);
        }

        store.reload().await.unwrap();
        let reloaded = store.get("a@x.com").await.unwrap();
        assert!(reloaded.rate_limits.contains_key("gemini-3-pro"));
    }
}
