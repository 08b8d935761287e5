use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{BattleCode, ServiceResult, Side, UserId};

/// Battle size class of an official ranked battle.
pub const OFFICIAL_BATTLE_PLAYERS: i64 = 4;

/// One participant's row for one battle.
///
/// Created when the participant joins with only the identity and position
/// fields set, then finalized in place once with the results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BattleRecord {
    pub battle_code: BattleCode,
    pub user_id: UserId,
    pub user_name: String,
    pub pilot_name: String,
    pub players: i64,
    pub aggregate: bool,
    pub pos: i64,
    pub side: Side,
    pub round: i64,
    pub win: i64,
    pub lose: i64,
    pub kill: i64,
    pub death: i64,
    pub frame: i64,
    pub result: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub system: i64,
}

impl BattleRecord {
    /// A freshly joined participant with zeroed results. The seat fields are
    /// filled in with struct update syntax.
    pub fn joined(battle_code: BattleCode, user_id: UserId) -> Self {
        Self {
            battle_code,
            user_id,
            ..Default::default()
        }
    }
}

/// Sums over aggregate, official battle records. All zero when nothing matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BattleCountResult {
    pub battles: i64,
    pub wins: i64,
    pub losses: i64,
    pub kills: i64,
    pub deaths: i64,
}

#[async_trait::async_trait]
pub trait BattleRecordRepository {
    /// Inserts the joined row. Fails with `Conflict` on a duplicate
    /// `(battle_code, user_id)`.
    async fn add_battle_record(&self, record: &BattleRecord) -> ServiceResult<BattleRecord>;
    /// Writes the final results. Clears every cached ranking when the record
    /// counts toward statistics.
    async fn update_battle_record(&self, record: &BattleRecord) -> ServiceResult<()>;
    async fn get_battle_record(
        &self,
        battle_code: &str,
        user_id: &str,
    ) -> ServiceResult<BattleRecord>;
    async fn total_battle_count(&self, user_id: &str, side: Side)
    -> ServiceResult<BattleCountResult>;
    /// Same as `total_battle_count` over all sides, restricted to the trailing
    /// 24 hours.
    async fn daily_battle_count(&self, user_id: &str) -> ServiceResult<BattleCountResult>;
}

pub type ArcBattleRecordRepository = Arc<dyn BattleRecordRepository + Send + Sync + 'static>;
