// =============================================================================
// RecommendationStore — pending/approved/executed/rejected/expired lifecycle
// =============================================================================
//
// Recommendations are how the orchestrator surfaces a proposed options trade
// (put spread, call spread, long call) for a human to approve before it is
// ever sent to a broker — distinct from the hunters' `auto_trade` path.
// Grounded on the teacher's `DecisionEnvelope` convention (a small typed
// record with an explicit terminal-state field) generalised from a single
// `final_decision` into a five-state lifecycle with a time-based expiry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::PutSpreadCandidate;
use crate::types::{RecommendationAction, RecommendationStatus, RegimeType};

/// A proposed options trade, including the spread legs it would actually be
/// executed with (`place_spread_order(short, long, expiration, right, qty,
/// limit_price)` reads directly off these fields) and the regime context it
/// was generated under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub action: RecommendationAction,
    pub rationale: String,
    pub status: RecommendationStatus,

    pub regime_type: RegimeType,
    pub qqq_price: f64,
    pub vix: f64,

    pub short_strike: Option<f64>,
    pub long_strike: Option<f64>,
    /// YYYYMMDD.
    pub expiration: Option<String>,
    pub contracts: Option<u32>,
    pub short_delta: Option<f64>,
    pub estimated_credit: Option<f64>,
    pub estimated_debit: Option<f64>,
    pub max_risk: Option<f64>,
    pub max_profit: Option<f64>,
    pub risk_assessment: Option<String>,
    pub rejection_reason: Option<String>,

    pub order_id: Option<String>,
    pub execution_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

pub struct RecommendationStore {
    ttl: ChronoDuration,
    rows: RwLock<Vec<Recommendation>>,
}

impl RecommendationStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            ttl: ChronoDuration::hours(ttl_hours),
            rows: RwLock::new(Vec::new()),
        }
    }

    /// `spread` carries the candidate's legs when `action` proposes one
    /// (`open_put_spread` / `open_call_spread` / `close_put_spread`); left
    /// `None` for actions that don't involve a two-leg spread
    /// (`open_long_call`).
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        agent_id: &str,
        symbol: &str,
        action: RecommendationAction,
        regime_type: RegimeType,
        qqq_price: f64,
        vix: f64,
        rationale: impl Into<String>,
        risk_assessment: impl Into<String>,
        spread: Option<&PutSpreadCandidate>,
        contracts: Option<u32>,
        estimated_debit: Option<f64>,
    ) -> Recommendation {
        let now = Utc::now();
        let rec = Recommendation {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            symbol: symbol.to_string(),
            action,
            rationale: rationale.into(),
            status: RecommendationStatus::Pending,
            regime_type,
            qqq_price,
            vix,
            short_strike: spread.map(|s| s.short_strike),
            long_strike: spread.map(|s| s.long_strike),
            expiration: spread.map(|s| s.expiration.clone()),
            contracts,
            short_delta: spread.map(|s| s.short_delta),
            estimated_credit: spread.map(|s| s.estimated_credit),
            estimated_debit,
            max_risk: spread.map(|s| s.max_risk),
            max_profit: spread.map(|s| s.max_profit),
            risk_assessment: Some(risk_assessment.into()),
            rejection_reason: None,
            order_id: None,
            execution_price: None,
            created_at: now,
            expires_at: now + self.ttl,
            executed_at: None,
        };
        self.rows.write().push(rec.clone());
        rec
    }

    pub fn get(&self, id: &str) -> Option<Recommendation> {
        self.rows.read().iter().find(|r| r.id == id).cloned()
    }

    /// Pending -> Approved, only while still unexpired.
    pub fn approve(&self, id: &str) -> Result<Recommendation, String> {
        let mut rows = self.rows.write();
        let rec = rows.iter_mut().find(|r| r.id == id).ok_or("recommendation not found")?;
        if rec.status != RecommendationStatus::Pending {
            return Err(format!("cannot approve a recommendation in {:?} state", rec.status));
        }
        if Utc::now() >= rec.expires_at {
            rec.status = RecommendationStatus::Expired;
            return Err("recommendation has expired".to_string());
        }
        rec.status = RecommendationStatus::Approved;
        Ok(rec.clone())
    }

    /// Pending or Approved -> Rejected.
    pub fn reject(&self, id: &str, reason: Option<String>) -> Result<Recommendation, String> {
        let mut rows = self.rows.write();
        let rec = rows.iter_mut().find(|r| r.id == id).ok_or("recommendation not found")?;
        if !matches!(rec.status, RecommendationStatus::Pending | RecommendationStatus::Approved) {
            return Err(format!("cannot reject a recommendation in {:?} state", rec.status));
        }
        rec.status = RecommendationStatus::Rejected;
        rec.rejection_reason = reason;
        Ok(rec.clone())
    }

    /// Approved -> Executed, recording the fill.
    pub fn mark_executed(&self, id: &str, order_id: String, execution_price: f64) -> Result<Recommendation, String> {
        let mut rows = self.rows.write();
        let rec = rows.iter_mut().find(|r| r.id == id).ok_or("recommendation not found")?;
        if rec.status != RecommendationStatus::Approved {
            return Err(format!("cannot execute a recommendation in {:?} state", rec.status));
        }
        rec.status = RecommendationStatus::Executed;
        rec.order_id = Some(order_id);
        rec.execution_price = Some(execution_price);
        rec.executed_at = Some(Utc::now());
        Ok(rec.clone())
    }

    /// Sweep pending/approved rows whose TTL has elapsed; returns how many
    /// were expired. Intended to run once per scheduler tick.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut rows = self.rows.write();
        let mut count = 0;
        for rec in rows.iter_mut() {
            if matches!(rec.status, RecommendationStatus::Pending | RecommendationStatus::Approved) && now >= rec.expires_at {
                rec.status = RecommendationStatus::Expired;
                count += 1;
            }
        }
        count
    }

    pub fn for_agent(&self, agent_id: &str) -> Vec<Recommendation> {
        self.rows.read().iter().filter(|r| r.agent_id == agent_id).cloned().collect()
    }

    pub fn pending(&self) -> Vec<Recommendation> {
        self.rows.read().iter().filter(|r| r.status == RecommendationStatus::Pending).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spread() -> PutSpreadCandidate {
        PutSpreadCandidate {
            short_strike: 440.0,
            long_strike: 435.0,
            expiration: "20260821".to_string(),
            short_delta: 0.16,
            estimated_credit: 1.25,
            max_risk: 375.0,
            max_profit: 125.0,
        }
    }

    #[test]
    fn create_then_approve_then_execute() {
        let store = RecommendationStore::new(4);
        let spread = sample_spread();
        let rec = store.create(
            "agent-1",
            "QQQ",
            RecommendationAction::OpenPutSpread,
            RegimeType::NormalBull,
            450.0,
            18.0,
            "vix spike",
            "sized to 5% of allocated capital",
            Some(&spread),
            Some(2),
            None,
        );
        assert_eq!(rec.short_strike, Some(440.0));
        store.approve(&rec.id).unwrap();
        let executed = store.mark_executed(&rec.id, "order-1".to_string(), 450.25).unwrap();
        assert_eq!(executed.status, RecommendationStatus::Executed);
        assert_eq!(executed.order_id.as_deref(), Some("order-1"));
    }

    #[test]
    fn approve_after_expiry_fails_and_marks_expired() {
        let store = RecommendationStore::new(4);
        let spread = sample_spread();
        let rec = store.create(
            "agent-1",
            "QQQ",
            RecommendationAction::OpenPutSpread,
            RegimeType::NormalBull,
            450.0,
            18.0,
            "vix spike",
            "sized to 5% of allocated capital",
            Some(&spread),
            Some(2),
            None,
        );
        {
            let mut rows = store.rows.write();
            rows[0].expires_at = Utc::now() - ChronoDuration::hours(1);
        }
        let err = store.approve(&rec.id);
        assert!(err.is_err());
        assert_eq!(store.for_agent("agent-1")[0].status, RecommendationStatus::Expired);
    }

    #[test]
    fn sweep_expired_counts_only_pending_and_approved() {
        let store = RecommendationStore::new(4);
        let rec = store.create(
            "agent-1",
            "QQQ",
            RecommendationAction::ClosePutSpread,
            RegimeType::RecoveryMode,
            430.0,
            30.0,
            "recovery",
            "closing a losing spread",
            None,
            None,
            None,
        );
        {
            let mut rows = store.rows.write();
            rows[0].expires_at = Utc::now() - ChronoDuration::minutes(1);
        }
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.for_agent("agent-1")[0].status, RecommendationStatus::Expired);
        let _ = rec;
    }

    #[test]
    fn reject_pending_recommendation_records_reason() {
        let store = RecommendationStore::new(4);
        let rec = store.create(
            "agent-1",
            "QQQ",
            RecommendationAction::OpenLongCall,
            RegimeType::NormalBull,
            450.0,
            15.0,
            "breakout",
            "discretionary directional bet",
            None,
            None,
            None,
        );
        let rejected = store.reject(&rec.id, Some("too far out of the money".to_string())).unwrap();
        assert_eq!(rejected.status, RecommendationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("too far out of the money"));
    }

    #[test]
    fn get_returns_none_for_unknown_id() {
        let store = RecommendationStore::new(4);
        assert!(store.get("does-not-exist").is_none());
    }
}
