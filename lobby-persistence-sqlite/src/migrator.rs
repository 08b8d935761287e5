use lobby_server_domain::{ServiceError, ServiceResult};
use log::{error, info};
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::schema::{LEGACY_INDEXES, TABLES, TableSchema};

fn migration_failure(step: &str) -> impl FnOnce(sqlx::Error) -> ServiceError + '_ {
    move |e| ServiceError::MigrationFailure(format!("{} failed: {}", step, e))
}

pub struct SchemaMigrator {
    pool: Pool<Sqlite>,
}

impl SchemaMigrator {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Creates missing tables and indexes. Safe to run on every start.
    pub async fn init(&self) -> ServiceResult<()> {
        for table in TABLES {
            sqlx::query(table.create)
                .execute(&self.pool)
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            for index in table.indexes {
                sqlx::query(index.create)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Rebuilds every table under the current schema, carrying rows over
    /// through the declared column mappings.
    ///
    /// Runs in a single transaction; on any error nothing is changed.
    pub async fn migrate(&self) -> ServiceResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(migration_failure("BEGIN"))?;

        let rebuilt = Self::rebuild_tables(&mut *tx).await;
        match rebuilt {
            Ok(()) => {
                tx.commit().await.map_err(migration_failure("COMMIT"))?;
                info!("Schema migration committed");
                Ok(())
            }
            Err(e) => {
                error!("Schema migration rolled back: {}", e);
                tx.rollback().await.map_err(migration_failure("ROLLBACK"))?;
                Err(e)
            }
        }
    }

    async fn rebuild_tables(conn: &mut SqliteConnection) -> ServiceResult<()> {
        // a fresh database has nothing to rename yet
        for table in TABLES {
            sqlx::query(table.create)
                .execute(&mut *conn)
                .await
                .map_err(migration_failure("CREATE TABLE"))?;
        }

        for table in TABLES {
            info!("Moving {} aside", table.name);
            sqlx::query(&format!(
                "ALTER TABLE {} RENAME TO {}",
                table.name,
                table.temporary_name()
            ))
            .execute(&mut *conn)
            .await
            .map_err(migration_failure("ALTER TABLE"))?;
        }

        // renamed tables keep their index names, which would shadow the new ones
        let index_names = TABLES
            .iter()
            .flat_map(|t| t.indexes.iter().map(|i| i.name))
            .chain(LEGACY_INDEXES.iter().copied());
        for index in index_names {
            sqlx::query(&format!("DROP INDEX IF EXISTS {}", index))
                .execute(&mut *conn)
                .await
                .map_err(migration_failure("DROP INDEX"))?;
        }

        for table in TABLES {
            sqlx::query(table.create)
                .execute(&mut *conn)
                .await
                .map_err(migration_failure("CREATE TABLE"))?;
            for index in table.indexes {
                sqlx::query(index.create)
                    .execute(&mut *conn)
                    .await
                    .map_err(migration_failure("CREATE INDEX"))?;
            }
        }

        for table in TABLES {
            Self::copy_rows(conn, table).await?;
            sqlx::query(&format!("DROP TABLE {}", table.temporary_name()))
                .execute(&mut *conn)
                .await
                .map_err(migration_failure("DROP TABLE"))?;
        }
        Ok(())
    }

    async fn copy_rows(conn: &mut SqliteConnection, table: &TableSchema) -> ServiceResult<()> {
        let tmp = table.temporary_name();
        let old_columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(&tmp)
                .fetch_all(&mut *conn)
                .await
                .map_err(migration_failure("reading columns"))?;

        let plan = table
            .copy_plan(&old_columns)
            .map_err(ServiceError::MigrationFailure)?;
        if plan.is_empty() {
            return Ok(());
        }

        let targets = plan.iter().map(|m| m.to).collect::<Vec<_>>().join(", ");
        let sources = plan
            .iter()
            .map(|m| m.source())
            .collect::<Vec<_>>()
            .join(", ");
        let copied = sqlx::query(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            table.name, targets, sources, tmp
        ))
        .execute(&mut *conn)
        .await
        .map_err(migration_failure("INSERT"))?;
        info!(
            "Copied {} rows into {}",
            copied.rows_affected(),
            table.name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lobby_server_domain::{
        Side,
        account::AccountRepository,
        battle_record::{BattleCountResult, BattleRecordRepository},
        ranking::RankingCache,
        util::{from_unix_millis, now_millis_precision, to_unix_millis},
    };

    use crate::{
        accounts::SqliteAccountRepository,
        battle_records::SqliteBattleRecordRepository,
        test_util::{initialized_pool, memory_pool},
    };

    use super::*;

    async fn count(pool: &Pool<Sqlite>, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .expect("Failed to count rows")
    }

    async fn index_names(pool: &Pool<Sqlite>) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'BATTLE_RECORD_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("Failed to list indexes")
    }

    async fn seed(pool: &Pool<Sqlite>) {
        sqlx::query(
            "INSERT INTO account (login_key, session_id, created_ip, created, last_login) VALUES ('k1', 's1', '1.2.3.4', 1, 2)",
        )
        .execute(pool)
        .await
        .expect("Failed to seed account");
        sqlx::query(
            "INSERT INTO user (user_id, login_key, name, win_count, created) VALUES ('u1', 'k1', 'amuro', 3, 1)",
        )
        .execute(pool)
        .await
        .expect("Failed to seed user");
        sqlx::query(
            "INSERT INTO battle_record (battle_code, user_id, user_name, pilot_name, players, aggregate, win, created, updated) VALUES ('b1', 'u1', 'amuro', 'p', 4, 1, 1, 1, 1)",
        )
        .execute(pool)
        .await
        .expect("Failed to seed battle record");
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let pool = initialized_pool().await;
        seed(&pool).await;
        SchemaMigrator::new(pool.clone())
            .init()
            .await
            .expect("Second init should succeed");
        assert_eq!(count(&pool, "account").await, 1);
        assert_eq!(index_names(&pool).await.len(), 4);
    }

    #[tokio::test]
    async fn test_migrate_on_fresh_database() {
        let pool = memory_pool().await;
        SchemaMigrator::new(pool.clone())
            .migrate()
            .await
            .expect("Migration should create the schema");
        assert_eq!(count(&pool, "battle_record").await, 0);
        assert_eq!(index_names(&pool).await.len(), 4);
    }

    #[tokio::test]
    async fn test_migrate_twice_preserves_rows() {
        let pool = initialized_pool().await;
        seed(&pool).await;
        let migrator = SchemaMigrator::new(pool.clone());

        migrator.migrate().await.expect("First migration failed");
        migrator.migrate().await.expect("Second migration failed");

        assert_eq!(count(&pool, "account").await, 1);
        assert_eq!(count(&pool, "user").await, 1);
        assert_eq!(count(&pool, "battle_record").await, 1);
        let (name, wins): (String, i64) =
            sqlx::query_as("SELECT name, win_count FROM user WHERE user_id = 'u1'")
                .fetch_one(&pool)
                .await
                .expect("Failed to read user");
        assert_eq!(name, "amuro");
        assert_eq!(wins, 3);
        assert_eq!(
            index_names(&pool).await,
            vec![
                "BATTLE_RECORD_AGGREGATE",
                "BATTLE_RECORD_CREATED",
                "BATTLE_RECORD_PLAYERS",
                "BATTLE_RECORD_USER_ID",
            ]
        );
        let leftovers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name LIKE '%_tmp'")
                .fetch_one(&pool)
                .await
                .expect("Failed to list tables");
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_migrate_fills_new_columns_with_defaults() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE user (user_id text, login_key text, name text, created timestamp, PRIMARY KEY (user_id, login_key))")
            .execute(&pool)
            .await
            .expect("Failed to create old user table");
        sqlx::query("INSERT INTO user (user_id, login_key, name, created) VALUES ('u1', 'k1', 'char', 5)")
            .execute(&pool)
            .await
            .expect("Failed to seed old user table");
        sqlx::query("CREATE INDEX BATTLE_RECORD_AGGRIGATE ON user(name)")
            .execute(&pool)
            .await
            .expect("Failed to create legacy index");

        SchemaMigrator::new(pool.clone())
            .migrate()
            .await
            .expect("Migration failed");

        let (name, team, daily_lose): (String, String, i64) = sqlx::query_as(
            "SELECT name, team, daily_lose_count FROM user WHERE user_id = 'u1'",
        )
        .fetch_one(&pool)
        .await
        .expect("Failed to read migrated user");
        assert_eq!(name, "char");
        assert_eq!(team, "");
        assert_eq!(daily_lose, 0);
        assert!(!index_names(&pool).await.contains(&"BATTLE_RECORD_AGGRIGATE".to_string()));
    }

    #[tokio::test]
    async fn test_migrate_rolls_back_on_undeclared_column() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE account (login_key text, password text, PRIMARY KEY (login_key))")
            .execute(&pool)
            .await
            .expect("Failed to create old account table");
        sqlx::query("INSERT INTO account (login_key, password) VALUES ('k1', 'secret')")
            .execute(&pool)
            .await
            .expect("Failed to seed old account table");

        let err = SchemaMigrator::new(pool.clone())
            .migrate()
            .await
            .expect_err("Undeclared column must abort the migration");
        assert!(matches!(err, ServiceError::MigrationFailure(_)));

        let password: String =
            sqlx::query_scalar("SELECT password FROM account WHERE login_key = 'k1'")
                .fetch_one(&pool)
                .await
                .expect("Old account table should be untouched");
        assert_eq!(password, "secret");
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('user', 'battle_record', 'account_tmp')",
        )
        .fetch_one(&pool)
        .await
        .expect("Failed to list tables");
        assert_eq!(tables, 0);
    }

    #[tokio::test]
    async fn test_migrate_converts_text_timestamps() {
        let pool = initialized_pool().await;
        sqlx::query(
            "INSERT INTO account (login_key, created, last_login) VALUES ('k1', '2020-01-01 10:00:00+09:00', '2020-01-02 10:00:00.250+09:00')",
        )
        .execute(&pool)
        .await
        .expect("Failed to seed account");
        sqlx::query(
            "INSERT INTO battle_record (battle_code, user_id, user_name, pilot_name, players, aggregate, side, round, win, created, updated) VALUES ('old', 'u1', 'amuro', 'p', 4, 1, 1, 3, 2, '2020-01-01 10:00:00+09:00', '2020-01-01 10:30:00+09:00')",
        )
        .execute(&pool)
        .await
        .expect("Failed to seed old battle record");
        let recent = to_unix_millis(&now_millis_precision());
        sqlx::query(
            "INSERT INTO battle_record (battle_code, user_id, user_name, pilot_name, players, aggregate, side, round, win, created, updated) VALUES ('new', 'u1', 'amuro', 'p', 4, 1, 1, 1, 1, ?, ?)",
        )
        .bind(recent)
        .bind(recent)
        .execute(&pool)
        .await
        .expect("Failed to seed recent battle record");

        SchemaMigrator::new(pool.clone())
            .migrate()
            .await
            .expect("Migration failed");

        let account = SqliteAccountRepository::new(pool.clone())
            .get_account_by_login_key("k1")
            .await
            .expect("Migrated account should be readable");
        assert_eq!(account.created, from_unix_millis(1_577_840_400_000));
        assert_eq!(account.last_login, from_unix_millis(1_577_926_800_000));

        let battle_records = SqliteBattleRecordRepository::new(pool, Arc::new(RankingCache::new()));
        let old = battle_records
            .get_battle_record("old", "u1")
            .await
            .expect("Migrated battle record should be readable");
        assert_eq!(old.created, from_unix_millis(1_577_840_400_000));
        assert_eq!(old.updated, from_unix_millis(1_577_842_200_000));
        let new = battle_records
            .get_battle_record("new", "u1")
            .await
            .expect("Integer timestamps should pass through");
        assert_eq!(to_unix_millis(&new.created), recent);

        let daily = battle_records
            .daily_battle_count("u1")
            .await
            .expect("Failed to count daily battles");
        assert_eq!(
            daily,
            BattleCountResult {
                battles: 1,
                wins: 1,
                ..Default::default()
            }
        );
        let total = battle_records
            .total_battle_count("u1", Side::Aeug)
            .await
            .expect("Failed to count battles");
        assert_eq!(total.battles, 4);
        assert_eq!(total.wins, 3);
    }
}
