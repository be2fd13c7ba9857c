// =============================================================================
// Watchlist — candidates an agent is tracking ahead of an entry decision
// =============================================================================
//
// A watchlist entry is the record that sits between "the screener liked this
// symbol" and "a position was opened". It carries the composite scores that
// produced the candidate, the trigger condition the hunter cycle is waiting
// on, and expires on its own schedule per asset class so stale candidates
// don't linger. Grounded on the teacher's `position_engine.rs` convention of
// a `RwLock<Vec<T>>` store with id-keyed mutation, generalised to the entry
// (rather than exit) side of the pipeline.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::types::{EntryTrigger, WatchlistStatus};

const CRYPTO_EXPIRY_HOURS: i64 = 48;
const EQUITIES_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistAssetClass {
    Crypto,
    Equities,
}

impl WatchlistAssetClass {
    fn expiry(self) -> ChronoDuration {
        match self {
            Self::Crypto => ChronoDuration::hours(CRYPTO_EXPIRY_HOURS),
            Self::Equities => ChronoDuration::days(EQUITIES_EXPIRY_DAYS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WatchlistScores {
    pub composite: f64,
    pub technical: f64,
    pub fundamental: f64,
    pub momentum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub asset_class: WatchlistAssetClass,
    pub scores: WatchlistScores,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub entry_trigger: EntryTrigger,
    pub status: WatchlistStatus,
    /// Serialised analysis payload (trend/fundamental snapshot) kept for
    /// display and post-hoc review; not re-parsed by the hunter cycle.
    pub analysis: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Watchlist {
    entries: RwLock<Vec<WatchlistEntry>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add `symbol` to `agent_id`'s watchlist, or refresh it in place if a
    /// `watching` row for the same (agent, symbol) already exists — the
    /// at-most-one-watching invariant is enforced here rather than at the
    /// call site.
    pub fn upsert(
        &self,
        agent_id: &str,
        symbol: &str,
        asset_class: WatchlistAssetClass,
        scores: WatchlistScores,
        entry_price: f64,
        target_price: f64,
        stop_loss: f64,
        entry_trigger: EntryTrigger,
        analysis: serde_json::Value,
    ) -> String {
        let now = Utc::now();
        let mut entries = self.entries.write();

        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.agent_id == agent_id && e.symbol == symbol && e.status == WatchlistStatus::Watching)
        {
            existing.scores = scores;
            existing.entry_price = entry_price;
            existing.target_price = target_price;
            existing.stop_loss = stop_loss;
            existing.entry_trigger = entry_trigger;
            existing.analysis = analysis;
            existing.updated_at = now;
            return existing.id.clone();
        }

        let id = Uuid::new_v4().to_string();
        entries.push(WatchlistEntry {
            id: id.clone(),
            agent_id: agent_id.to_string(),
            symbol: symbol.to_string(),
            asset_class,
            scores,
            entry_price,
            target_price,
            stop_loss,
            entry_trigger,
            status: WatchlistStatus::Watching,
            analysis,
            created_at: now,
            updated_at: now,
        });
        info!(agent_id, symbol, "added to watchlist");
        id
    }

    pub fn set_status(&self, id: &str, status: WatchlistStatus) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(e) => {
                e.status = status;
                e.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn watching_for(&self, agent_id: &str) -> Vec<WatchlistEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.agent_id == agent_id && e.status == WatchlistStatus::Watching)
            .cloned()
            .collect()
    }

    /// Transition `watching` rows older than their asset class's expiry
    /// window to `expired`. Returns the number of rows transitioned.
    pub fn expire_stale(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let mut count = 0;
        for e in entries.iter_mut() {
            if e.status != WatchlistStatus::Watching {
                continue;
            }
            if now - e.created_at >= e.asset_class.expiry() {
                e.status = WatchlistStatus::Expired;
                e.updated_at = now;
                count += 1;
            }
        }
        count
    }

    pub fn all_for(&self, agent_id: &str) -> Vec<WatchlistEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect()
    }
}

impl Default for Watchlist {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Watchlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchlist")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> WatchlistScores {
        WatchlistScores {
            composite: 80.0,
            technical: 75.0,
            fundamental: 70.0,
            momentum: 65.0,
        }
    }

    #[test]
    fn upsert_then_refresh_keeps_single_watching_row() {
        let wl = Watchlist::new();
        let id1 = wl.upsert(
            "agent-1",
            "BTC-USD",
            WatchlistAssetClass::Crypto,
            scores(),
            100.0,
            120.0,
            92.0,
            EntryTrigger::Breakout,
            serde_json::json!({}),
        );
        let id2 = wl.upsert(
            "agent-1",
            "BTC-USD",
            WatchlistAssetClass::Crypto,
            scores(),
            101.0,
            121.0,
            93.0,
            EntryTrigger::Breakout,
            serde_json::json!({}),
        );
        assert_eq!(id1, id2);
        assert_eq!(wl.watching_for("agent-1").len(), 1);
        assert_eq!(wl.watching_for("agent-1")[0].entry_price, 101.0);
    }

    #[test]
    fn expire_stale_crypto_after_48h() {
        let wl = Watchlist::new();
        let id = wl.upsert(
            "agent-1",
            "BTC-USD",
            WatchlistAssetClass::Crypto,
            scores(),
            100.0,
            120.0,
            92.0,
            EntryTrigger::Breakout,
            serde_json::json!({}),
        );
        {
            let mut entries = wl.entries.write();
            let e = entries.iter_mut().find(|e| e.id == id).unwrap();
            e.created_at = Utc::now() - ChronoDuration::hours(49);
        }
        let expired_count = wl.expire_stale();
        assert_eq!(expired_count, 1);
        assert!(wl.watching_for("agent-1").is_empty());
    }

    #[test]
    fn different_symbols_coexist() {
        let wl = Watchlist::new();
        wl.upsert(
            "agent-1",
            "BTC-USD",
            WatchlistAssetClass::Crypto,
            scores(),
            100.0,
            120.0,
            92.0,
            EntryTrigger::Breakout,
            serde_json::json!({}),
        );
        wl.upsert(
            "agent-1",
            "ETH-USD",
            WatchlistAssetClass::Crypto,
            scores(),
            100.0,
            120.0,
            92.0,
            EntryTrigger::Breakout,
            serde_json::json!({}),
        );
        assert_eq!(wl.watching_for("agent-1").len(), 2);
    }
}
