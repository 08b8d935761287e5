use lobby_server_domain::{
    ServiceError, ServiceResult,
    ranking::sanitize_text,
    user::{BattleCounters, DailyCounters, User, UserRepository},
    util::{from_unix_millis, generate_unique_token, now_millis_precision, to_unix_millis},
};
use log::debug;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::{internal, is_unique_violation};

// name and team may hold bytes that are not UTF-8; they are decoded from blobs
const USER_COLUMNS: &str = "*, CAST(name AS BLOB) AS name_bytes, CAST(team AS BLOB) AS team_bytes";

pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

/// Reads the five counters stored under `{prefix}battle_count` and friends.
pub(crate) fn counters_from_row(row: &SqliteRow, prefix: &str) -> sqlx::Result<BattleCounters> {
    Ok(BattleCounters {
        battle: row.try_get(format!("{}battle_count", prefix).as_str())?,
        win: row.try_get(format!("{}win_count", prefix).as_str())?,
        lose: row.try_get(format!("{}lose_count", prefix).as_str())?,
        kill: row.try_get(format!("{}kill_count", prefix).as_str())?,
        death: row.try_get(format!("{}death_count", prefix).as_str())?,
    })
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
        Ok(User {
            user_id: row.try_get("user_id")?,
            login_key: row.try_get("login_key")?,
            session_id: row.try_get("session_id")?,
            name: sanitize_text(row.try_get("name_bytes")?),
            team: sanitize_text(row.try_get("team_bytes")?),
            total: counters_from_row(row, "")?,
            aeug: counters_from_row(row, "aeug_")?,
            titans: counters_from_row(row, "titans_")?,
            daily: DailyCounters {
                battle: row.try_get("daily_battle_count")?,
                win: row.try_get("daily_win_count")?,
                lose: row.try_get("daily_lose_count")?,
            },
            created: from_unix_millis(row.try_get("created")?),
            system: row.try_get("system")?,
        })
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteUserRepository {
    async fn register_user(&self, login_key: &str) -> ServiceResult<User> {
        let user = User::new(
            generate_unique_token(),
            login_key.to_string(),
            now_millis_precision(),
        );
        let result = sqlx::query("INSERT INTO user (user_id, login_key, created) VALUES (?, ?, ?)")
            .bind(&user.user_id)
            .bind(&user.login_key)
            .bind(to_unix_millis(&user.created))
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => {
                debug!("Registered user {} under {}", user.user_id, login_key);
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => {
                ServiceError::conflict(format!("user {} already registered", user.user_id))
            }
            Err(e) => Err(internal(e)),
        }
    }

    async fn get_user_list(&self, login_key: &str) -> ServiceResult<Vec<User>> {
        sqlx::query(&format!(
            "SELECT {} FROM user WHERE login_key = ? ORDER BY created, user_id",
            USER_COLUMNS
        ))
            .bind(login_key)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?
            .iter()
            .map(|row| Self::user_from_row(row).map_err(internal))
            .collect::<ServiceResult<Vec<User>>>()
    }

    async fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        let row = sqlx::query(&format!("SELECT {} FROM user WHERE user_id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        match row {
            Some(row) => Self::user_from_row(&row).map_err(internal),
            None => ServiceError::not_found(format!("user {}", user_id)),
        }
    }

    async fn login_user(&self, user: &User) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let account = sqlx::query("UPDATE account SET last_user_id = ? WHERE login_key = ?")
            .bind(&user.user_id)
            .bind(&user.login_key)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;
        if account.rows_affected() == 0 {
            tx.rollback().await.map_err(internal)?;
            return ServiceError::not_found(format!("account {}", user.login_key));
        }

        let updated = sqlx::query("UPDATE user SET session_id = ? WHERE user_id = ?")
            .bind(&user.session_id)
            .bind(&user.user_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;
        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(internal)?;
            return ServiceError::not_found(format!("user {}", user.user_id));
        }

        tx.commit().await.map_err(internal)?;
        debug!("User {} logged in", user.user_id);
        Ok(())
    }

    async fn update_user(&self, user: &User) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE user SET
                name = ?, team = ?,
                battle_count = ?, win_count = ?, lose_count = ?, kill_count = ?, death_count = ?,
                aeug_battle_count = ?, aeug_win_count = ?, aeug_lose_count = ?, aeug_kill_count = ?, aeug_death_count = ?,
                titans_battle_count = ?, titans_win_count = ?, titans_lose_count = ?, titans_kill_count = ?, titans_death_count = ?,
                daily_battle_count = ?, daily_win_count = ?, daily_lose_count = ?,
                system = ?
            WHERE user_id = ?",
        )
        .bind(&user.name)
        .bind(&user.team)
        .bind(user.total.battle)
        .bind(user.total.win)
        .bind(user.total.lose)
        .bind(user.total.kill)
        .bind(user.total.death)
        .bind(user.aeug.battle)
        .bind(user.aeug.win)
        .bind(user.aeug.lose)
        .bind(user.aeug.kill)
        .bind(user.aeug.death)
        .bind(user.titans.battle)
        .bind(user.titans.win)
        .bind(user.titans.lose)
        .bind(user.titans.kill)
        .bind(user.titans.death)
        .bind(user.daily.battle)
        .bind(user.daily.win)
        .bind(user.daily.lose)
        .bind(user.system)
        .bind(&user.user_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found(format!("user {}", user.user_id));
        }
        Ok(())
    }
}
