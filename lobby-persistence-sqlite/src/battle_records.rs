use chrono::Duration;
use lobby_server_domain::{
    ServiceError, ServiceResult, Side,
    battle_record::{
        BattleCountResult, BattleRecord, BattleRecordRepository, OFFICIAL_BATTLE_PLAYERS,
    },
    ranking::ArcRankingCache,
    util::{from_unix_millis, now_millis_precision, to_unix_millis},
};
use log::debug;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::{internal, is_unique_violation};

const DAILY_WINDOW_HOURS: i64 = 24;

// SUM over no rows is NULL, so every total is folded from zero.
const COUNT_COLUMNS: &str = "COALESCE(SUM(round), 0), COALESCE(SUM(win), 0), COALESCE(SUM(lose), 0), COALESCE(SUM(kill), 0), COALESCE(SUM(death), 0)";

pub struct SqliteBattleRecordRepository {
    pool: Pool<Sqlite>,
    ranking_cache: ArcRankingCache,
}

impl SqliteBattleRecordRepository {
    pub fn new(pool: Pool<Sqlite>, ranking_cache: ArcRankingCache) -> Self {
        Self {
            pool,
            ranking_cache,
        }
    }

    fn battle_record_from_row(row: &SqliteRow) -> sqlx::Result<BattleRecord> {
        let side: i64 = row.try_get("side")?;
        Ok(BattleRecord {
            battle_code: row.try_get("battle_code")?,
            user_id: row.try_get("user_id")?,
            user_name: row.try_get("user_name")?,
            pilot_name: row.try_get("pilot_name")?,
            players: row.try_get("players")?,
            aggregate: row.try_get::<i64, _>("aggregate")? != 0,
            pos: row.try_get("pos")?,
            side: Side::from_i64(side).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "side".to_string(),
                source: format!("unknown side {}", side).into(),
            })?,
            round: row.try_get("round")?,
            win: row.try_get("win")?,
            lose: row.try_get("lose")?,
            kill: row.try_get("kill")?,
            death: row.try_get("death")?,
            frame: row.try_get("frame")?,
            result: row.try_get("result")?,
            created: from_unix_millis(row.try_get("created")?),
            updated: from_unix_millis(row.try_get("updated")?),
            system: row.try_get("system")?,
        })
    }

    fn count_from_row(row: &SqliteRow) -> sqlx::Result<BattleCountResult> {
        Ok(BattleCountResult {
            battles: row.try_get(0)?,
            wins: row.try_get(1)?,
            losses: row.try_get(2)?,
            kills: row.try_get(3)?,
            deaths: row.try_get(4)?,
        })
    }
}

#[async_trait::async_trait]
impl BattleRecordRepository for SqliteBattleRecordRepository {
    async fn add_battle_record(&self, record: &BattleRecord) -> ServiceResult<BattleRecord> {
        let now = now_millis_precision();
        let result = sqlx::query(
            "INSERT INTO battle_record
                (battle_code, user_id, user_name, pilot_name, players, aggregate, pos, side, created, updated, system)
            VALUES
                (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.battle_code)
        .bind(&record.user_id)
        .bind(&record.user_name)
        .bind(&record.pilot_name)
        .bind(record.players)
        .bind(if record.aggregate { 1i64 } else { 0i64 })
        .bind(record.pos)
        .bind(record.side.as_i64())
        .bind(to_unix_millis(&now))
        .bind(to_unix_millis(&now))
        .bind(record.system)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    "Added battle record {} for user {}",
                    record.battle_code, record.user_id
                );
                Ok(BattleRecord {
                    round: 0,
                    win: 0,
                    lose: 0,
                    kill: 0,
                    death: 0,
                    frame: 0,
                    result: String::new(),
                    created: now,
                    updated: now,
                    ..record.clone()
                })
            }
            Err(e) if is_unique_violation(&e) => ServiceError::conflict(format!(
                "battle record {} for user {} already exists",
                record.battle_code, record.user_id
            )),
            Err(e) => Err(internal(e)),
        }
    }

    async fn update_battle_record(&self, record: &BattleRecord) -> ServiceResult<()> {
        let updated = now_millis_precision();
        let result = sqlx::query(
            "UPDATE battle_record SET
                round = ?, win = ?, lose = ?, kill = ?, death = ?, frame = ?,
                result = ?, updated = ?, system = ?
            WHERE battle_code = ? AND user_id = ?",
        )
        .bind(record.round)
        .bind(record.win)
        .bind(record.lose)
        .bind(record.kill)
        .bind(record.death)
        .bind(record.frame)
        .bind(&record.result)
        .bind(to_unix_millis(&updated))
        .bind(record.system)
        .bind(&record.battle_code)
        .bind(&record.user_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return ServiceError::not_found(format!(
                "battle record {} for user {}",
                record.battle_code, record.user_id
            ));
        }
        debug!(
            "Finalized battle record {} for user {}",
            record.battle_code, record.user_id
        );
        if record.aggregate {
            self.ranking_cache.clear_all();
        }
        Ok(())
    }

    async fn get_battle_record(
        &self,
        battle_code: &str,
        user_id: &str,
    ) -> ServiceResult<BattleRecord> {
        let row = sqlx::query("SELECT * FROM battle_record WHERE battle_code = ? AND user_id = ?")
            .bind(battle_code)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        match row {
            Some(row) => Self::battle_record_from_row(&row).map_err(internal),
            None => ServiceError::not_found(format!(
                "battle record {} for user {}",
                battle_code, user_id
            )),
        }
    }

    async fn total_battle_count(
        &self,
        user_id: &str,
        side: Side,
    ) -> ServiceResult<BattleCountResult> {
        let row = match side {
            Side::All => sqlx::query(&format!(
                "SELECT {} FROM battle_record WHERE user_id = ? AND aggregate <> 0 AND players = ?",
                COUNT_COLUMNS
            ))
            .bind(user_id)
            .bind(OFFICIAL_BATTLE_PLAYERS)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?,
            _ => sqlx::query(&format!(
                "SELECT {} FROM battle_record WHERE user_id = ? AND aggregate <> 0 AND players = ? AND side = ?",
                COUNT_COLUMNS
            ))
            .bind(user_id)
            .bind(OFFICIAL_BATTLE_PLAYERS)
            .bind(side.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?,
        };
        Self::count_from_row(&row).map_err(internal)
    }

    async fn daily_battle_count(&self, user_id: &str) -> ServiceResult<BattleCountResult> {
        let since = now_millis_precision() - Duration::hours(DAILY_WINDOW_HOURS);
        let row = sqlx::query(&format!(
            "SELECT {} FROM battle_record WHERE user_id = ? AND aggregate <> 0 AND players = ? AND created > ?",
            COUNT_COLUMNS
        ))
        .bind(user_id)
        .bind(OFFICIAL_BATTLE_PLAYERS)
        .bind(to_unix_millis(&since))
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Self::count_from_row(&row).map_err(internal)
    }
}
