use thiserror::Error;

pub mod account;
pub mod battle_record;
pub mod ranking;
pub mod user;
pub mod util;

pub type LoginKey = String;
pub type SessionId = String;
pub type UserId = String;
pub type BattleCode = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("migration failed: {0}")]
    MigrationFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::NotFound(msg.into()))
    }

    pub fn conflict<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Conflict(msg.into()))
    }

    pub fn internal<T, R>(msg: T) -> ServiceResult<R>
    where
        T: Into<String>,
    {
        Err(ServiceError::Internal(msg.into()))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Faction filter used by battle records and rankings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Neutral when stored on a record, "all factions" when used as a filter.
    #[default]
    All,
    Aeug,
    Titans,
}

impl Side {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Side::All),
            1 => Some(Side::Aeug),
            2 => Some(Side::Titans),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Side::All => 0,
            Side::Aeug => 1,
            Side::Titans => 2,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}
