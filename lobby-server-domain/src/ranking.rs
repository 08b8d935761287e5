use std::{collections::HashMap, sync::Arc};

use log::debug;
use parking_lot::Mutex;

use crate::{ServiceResult, Side, UserId, user::BattleCounters};

/// Maximum number of entries in one leaderboard.
pub const RANKING_LIMIT: usize = 100;

/// Substituted for names and teams that are not valid UTF-8.
pub const INVALID_TEXT_PLACEHOLDER: &str = "？";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RankingMetric {
    Win,
    Kill,
}

impl RankingMetric {
    pub fn name(self) -> &'static str {
        match self {
            RankingMetric::Win => "win",
            RankingMetric::Kill => "kill",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RankingKey {
    pub metric: RankingMetric,
    pub side: Side,
}

impl RankingKey {
    pub fn new(metric: RankingMetric, side: Side) -> Self {
        Self { metric, side }
    }
}

/// Read-only projection of a user as it appears on a leaderboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankingRecord {
    pub rank: i64,
    pub user_id: UserId,
    pub name: String,
    pub team: String,
    pub total: BattleCounters,
    pub aeug: BattleCounters,
    pub titans: BattleCounters,
}

impl RankingRecord {
    pub fn counter(&self, key: RankingKey) -> i64 {
        let counters = match key.side {
            Side::All => &self.total,
            Side::Aeug => &self.aeug,
            Side::Titans => &self.titans,
        };
        match key.metric {
            RankingMetric::Win => counters.win,
            RankingMetric::Kill => counters.kill,
        }
    }
}

pub type Ranking = Arc<Vec<RankingRecord>>;

pub fn sanitize_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|_| INVALID_TEXT_PLACEHOLDER.to_string())
}

/// Memoized leaderboards keyed by metric and side.
///
/// Entries are never mutated once stored; they are only dropped wholesale by
/// `clear_all`. The lock covers map access only, so two concurrent misses on
/// the same key may both compute the ranking and the later insert wins.
#[derive(Default)]
pub struct RankingCache {
    rankings: Mutex<HashMap<RankingKey, Ranking>>,
}

impl RankingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RankingKey) -> Option<Ranking> {
        self.rankings.lock().get(key).cloned()
    }

    pub fn insert(&self, key: RankingKey, ranking: Vec<RankingRecord>) -> Ranking {
        let ranking = Arc::new(ranking);
        self.rankings.lock().insert(key, ranking.clone());
        ranking
    }

    pub fn clear_all(&self) {
        let mut rankings = self.rankings.lock();
        debug!("Clearing {} cached rankings", rankings.len());
        *rankings = HashMap::new();
    }

    pub fn len(&self) -> usize {
        self.rankings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.lock().is_empty()
    }
}

pub type ArcRankingCache = Arc<RankingCache>;

#[async_trait::async_trait]
pub trait RankingRepository {
    /// Top users by win count for the side, served from the cache when present.
    async fn get_win_ranking(&self, side: Side) -> ServiceResult<Ranking>;
    /// Top users by kill count for the side, served from the cache when present.
    async fn get_kill_ranking(&self, side: Side) -> ServiceResult<Ranking>;
}

pub type ArcRankingRepository = Arc<dyn RankingRepository + Send + Sync + 'static>;
