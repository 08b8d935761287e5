use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{LoginKey, ServiceResult, SessionId, UserId};

/// Anonymous identity. Only the latest `session_id` is considered valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub login_key: LoginKey,
    pub session_id: SessionId,
    pub last_user_id: UserId,
    pub created_ip: String,
    pub created: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub system: i64,
}

#[async_trait::async_trait]
pub trait AccountRepository {
    /// Creates an account under a freshly generated login key.
    async fn register_account(&self, ip: &str) -> ServiceResult<Account>;
    /// Creates an account under a caller supplied login key.
    /// Fails with `Conflict` if the key is taken.
    async fn register_account_with_login_key(
        &self,
        ip: &str,
        login_key: &str,
    ) -> ServiceResult<Account>;
    async fn get_account_by_login_key(&self, login_key: &str) -> ServiceResult<Account>;
    /// Issues a new session id and bumps `last_login`. The previous session id
    /// is overwritten.
    async fn login_account(&self, account: &Account) -> ServiceResult<Account>;
}

pub type ArcAccountRepository = Arc<dyn AccountRepository + Send + Sync + 'static>;
