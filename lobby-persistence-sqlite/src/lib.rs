use std::{sync::Arc, time::Duration};

use lobby_server_domain::{
    ServiceError,
    account::ArcAccountRepository,
    battle_record::ArcBattleRecordRepository,
    ranking::{ArcRankingCache, ArcRankingRepository, RankingCache},
    user::ArcUserRepository,
};
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    accounts::SqliteAccountRepository, battle_records::SqliteBattleRecordRepository,
    migrator::SchemaMigrator, rankings::SqliteRankingRepository, users::SqliteUserRepository,
};

pub mod accounts;
pub mod battle_records;
pub mod migrator;
pub mod rankings;
pub mod schema;
pub mod users;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads `LOBBY_DB` and the optional `LOBBY_DB_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self, String> {
        let path = std::env::var("LOBBY_DB").map_err(|_| "LOBBY_DB env var not set".to_string())?;
        let max_connections = match std::env::var("LOBBY_DB_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .map_err(|e| format!("invalid LOBBY_DB_MAX_CONNECTIONS {}: {}", value, e))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            path,
            max_connections,
        })
    }
}

pub async fn create_db_pool(config: &DatabaseConfig) -> Result<Pool<Sqlite>, ServiceError> {
    let conn_options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(conn_options)
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

pub(crate) fn internal(e: sqlx::Error) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

/// All stores of one database, sharing a single ranking cache.
pub struct LobbyStore {
    pub migrator: SchemaMigrator,
    pub accounts: ArcAccountRepository,
    pub users: ArcUserRepository,
    pub battle_records: ArcBattleRecordRepository,
    pub rankings: ArcRankingRepository,
    pub ranking_cache: ArcRankingCache,
}

impl LobbyStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self::with_ranking_cache(pool, Arc::new(RankingCache::new()))
    }

    pub fn with_ranking_cache(pool: Pool<Sqlite>, ranking_cache: ArcRankingCache) -> Self {
        Self {
            migrator: SchemaMigrator::new(pool.clone()),
            accounts: Arc::new(SqliteAccountRepository::new(pool.clone())),
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            battle_records: Arc::new(SqliteBattleRecordRepository::new(
                pool.clone(),
                ranking_cache.clone(),
            )),
            rankings: Arc::new(SqliteRankingRepository::new(pool, ranking_cache.clone())),
            ranking_cache,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::str::FromStr;

    use sqlx::{
        Pool, Sqlite,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    };

    use crate::migrator::SchemaMigrator;

    /// Single connection in-memory database; every connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn memory_pool() -> Pool<Sqlite> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("valid in-memory url");
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .expect("Failed to open in-memory database")
    }

    pub async fn initialized_pool() -> Pool<Sqlite> {
        let pool = memory_pool().await;
        SchemaMigrator::new(pool.clone())
            .init()
            .await
            .expect("Failed to create schema");
        pool
    }
}
