use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{LoginKey, ServiceResult, SessionId, UserId};

pub const DEFAULT_USER_NAME: &str = "default";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BattleCounters {
    pub battle: i64,
    pub win: i64,
    pub lose: i64,
    pub kill: i64,
    pub death: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DailyCounters {
    pub battle: i64,
    pub win: i64,
    pub lose: i64,
}

/// A character registered under an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub login_key: LoginKey,
    pub session_id: SessionId,
    pub name: String,
    pub team: String,
    pub total: BattleCounters,
    pub aeug: BattleCounters,
    pub titans: BattleCounters,
    pub daily: DailyCounters,
    pub created: DateTime<Utc>,
    pub system: i64,
}

impl User {
    pub fn new(user_id: UserId, login_key: LoginKey, created: DateTime<Utc>) -> Self {
        Self {
            user_id,
            login_key,
            session_id: String::new(),
            name: DEFAULT_USER_NAME.to_string(),
            team: String::new(),
            total: BattleCounters::default(),
            aeug: BattleCounters::default(),
            titans: BattleCounters::default(),
            daily: DailyCounters::default(),
            created,
            system: 0,
        }
    }
}

#[async_trait::async_trait]
pub trait UserRepository {
    async fn register_user(&self, login_key: &str) -> ServiceResult<User>;
    async fn get_user_list(&self, login_key: &str) -> ServiceResult<Vec<User>>;
    /// Looks a user up by id alone; user ids are unique by construction.
    async fn get_user(&self, user_id: &str) -> ServiceResult<User>;
    /// Points the owning account at this user and stores the user's session id,
    /// both in one transaction.
    async fn login_user(&self, user: &User) -> ServiceResult<()>;
    /// Overwrites name, team, every counter and the system flag.
    async fn update_user(&self, user: &User) -> ServiceResult<()>;
}

pub type ArcUserRepository = Arc<dyn UserRepository + Send + Sync + 'static>;
