use lobby_server_domain::{
    ServiceResult, Side,
    ranking::{
        ArcRankingCache, RANKING_LIMIT, Ranking, RankingKey, RankingMetric, RankingRecord,
        RankingRepository, sanitize_text,
    },
};
use log::debug;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::{internal, users::counters_from_row};

pub struct SqliteRankingRepository {
    pool: Pool<Sqlite>,
    ranking_cache: ArcRankingCache,
}

fn ranked_column(key: RankingKey) -> &'static str {
    match (key.metric, key.side) {
        (RankingMetric::Win, Side::All) => "win_count",
        (RankingMetric::Win, Side::Aeug) => "aeug_win_count",
        (RankingMetric::Win, Side::Titans) => "titans_win_count",
        (RankingMetric::Kill, Side::All) => "kill_count",
        (RankingMetric::Kill, Side::Aeug) => "aeug_kill_count",
        (RankingMetric::Kill, Side::Titans) => "titans_kill_count",
    }
}

impl SqliteRankingRepository {
    pub fn new(pool: Pool<Sqlite>, ranking_cache: ArcRankingCache) -> Self {
        Self {
            pool,
            ranking_cache,
        }
    }

    fn ranking_record_from_row(row: &SqliteRow) -> sqlx::Result<RankingRecord> {
        Ok(RankingRecord {
            rank: row.try_get("rank")?,
            user_id: row.try_get("user_id")?,
            name: sanitize_text(row.try_get("name")?),
            team: sanitize_text(row.try_get("team")?),
            total: counters_from_row(row, "")?,
            aeug: counters_from_row(row, "aeug_")?,
            titans: counters_from_row(row, "titans_")?,
        })
    }

    async fn get_ranking(&self, key: RankingKey) -> ServiceResult<Ranking> {
        if let Some(ranking) = self.ranking_cache.get(&key) {
            return Ok(ranking);
        }

        // ties share a rank; user_id only makes the order within a tie stable
        let column = ranked_column(key);
        let rows = sqlx::query(&format!(
            "SELECT RANK() OVER (ORDER BY {column} DESC) AS rank,
                user_id, CAST(name AS BLOB) AS name, CAST(team AS BLOB) AS team,
                battle_count, win_count, lose_count, kill_count, death_count,
                aeug_battle_count, aeug_win_count, aeug_lose_count, aeug_kill_count, aeug_death_count,
                titans_battle_count, titans_win_count, titans_lose_count, titans_kill_count, titans_death_count
            FROM user ORDER BY rank, user_id LIMIT ?"
        ))
        .bind(RANKING_LIMIT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let ranking = rows
            .iter()
            .map(|row| Self::ranking_record_from_row(row).map_err(internal))
            .collect::<ServiceResult<Vec<RankingRecord>>>()?;

        debug!(
            "Computed {} ranking for side {} with {} entries",
            key.metric.name(),
            key.side,
            ranking.len()
        );
        Ok(self.ranking_cache.insert(key, ranking))
    }
}

#[async_trait::async_trait]
impl RankingRepository for SqliteRankingRepository {
    async fn get_win_ranking(&self, side: Side) -> ServiceResult<Ranking> {
        self.get_ranking(RankingKey::new(RankingMetric::Win, side)).await
    }

    async fn get_kill_ranking(&self, side: Side) -> ServiceResult<Ranking> {
        self.get_ranking(RankingKey::new(RankingMetric::Kill, side)).await
    }
}
