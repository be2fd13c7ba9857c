// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. All other endpoints require a valid Bearer token checked via
// the `AuthBearer` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::types::{AgentStatus, RecommendationAction, RecommendationStatus};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/agents/:agent_id", get(agent_detail))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/trades", get(trades))
        .route("/api/v1/trades/stats", get(trade_stats))
        .route("/api/v1/watchlist", get(watchlist))
        .route("/api/v1/activity", get(activity))
        .route("/api/v1/regime", get(regime))
        .route("/api/v1/recommendations", get(recommendations))
        .route("/api/v1/recommendations/:id/approve", post(approve_recommendation))
        .route("/api/v1/recommendations/:id/reject", post(reject_recommendation))
        .route("/api/v1/recommendations/:id/execute", post(execute_recommendation))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/config", post(set_config))
        .route("/api/v1/control/:agent_id/pause", post(control_pause))
        .route("/api/v1/control/:agent_id/resume", post(control_resume))
        .route("/api/v1/control/:agent_id/stop", post(control_stop))
        .route("/api/v1/scheduler", get(scheduler_status))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn not_found(message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn agent_detail(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let stack = state
        .stack_for(&agent_id)
        .ok_or_else(|| not_found(format!("unknown agent '{agent_id}'")))?;

    Ok(Json(serde_json::json!({
        "agent_id": stack.agent_id,
        "kind": stack.kind.to_string(),
        "status": stack.status.read().to_string(),
        "risk": stack.risk.get_state(),
        "open_positions": stack.positions.open_for_agent(&stack.agent_id),
        "watching": stack.watchlist.watching_for(&stack.agent_id),
    })))
}

// =============================================================================
// Positions / trades / watchlist (authenticated)
// =============================================================================

async fn positions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.open_positions())
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn trades(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.recent_trades(query.limit.unwrap_or(100)))
}

async fn trade_stats(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut closed = state.crypto.positions.get_closed_positions(10_000);
    closed.extend(state.equities.positions.get_closed_positions(10_000));

    let total = closed.len();
    if total == 0 {
        return Json(serde_json::json!({
            "total_trades": 0,
            "win_rate": 0.0,
            "total_net_pnl": 0.0,
            "profit_factor": 0.0,
        }));
    }

    let wins = closed.iter().filter(|p| p.realized_pnl > 0.0).count();
    let win_rate = wins as f64 / total as f64;
    let total_net_pnl: f64 = closed.iter().map(|p| p.realized_pnl).sum();
    let gross_profit: f64 = closed.iter().filter(|p| p.realized_pnl > 0.0).map(|p| p.realized_pnl).sum();
    let gross_loss: f64 = closed.iter().filter(|p| p.realized_pnl < 0.0).map(|p| p.realized_pnl.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    Json(serde_json::json!({
        "total_trades": total,
        "win_rate": win_rate,
        "total_net_pnl": total_net_pnl,
        "profit_factor": profit_factor,
    }))
}

async fn watchlist(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.watching())
}

async fn activity(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.recent_activity(query.limit.unwrap_or(200)))
}

// =============================================================================
// Orchestrator: regime + recommendations (authenticated)
// =============================================================================

async fn regime(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.regime.current() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => Json(serde_json::json!({ "regime": null, "message": "no regime evaluation yet" })).into_response(),
    }
}

async fn recommendations(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recommendations.pending())
}

async fn approve_recommendation(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let rec = state.recommendations.approve(&id).map_err(bad_request)?;
    state.increment_version();
    info!(id = %rec.id, agent_id = %rec.agent_id, "recommendation approved via API");
    Ok(Json(rec))
}

#[derive(Deserialize)]
struct RejectQuery {
    reason: Option<String>,
}

async fn reject_recommendation(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RejectQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let rec = state.recommendations.reject(&id, query.reason).map_err(bad_request)?;
    state.increment_version();
    info!(id = %rec.id, agent_id = %rec.agent_id, "recommendation rejected via API");
    Ok(Json(rec))
}

/// Approved -> Executed: places the spread order against the equities
/// broker and records the fill. The broker's spread order response carries
/// only an `order_id` (see `OrderHandle`), so the recommendation's own
/// quoted credit/debit stands in for the execution price — the same
/// approximation the equities hunter's market orders make before a fill
/// report arrives.
async fn execute_recommendation(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let rec = state
        .recommendations
        .get(&id)
        .ok_or_else(|| not_found(format!("unknown recommendation '{id}'")))?;

    if rec.status != RecommendationStatus::Approved {
        return Err(bad_request(format!(
            "cannot execute a recommendation in {:?} state, must be approved first",
            rec.status
        )));
    }

    let (short_strike, long_strike, expiration, contracts) =
        match (rec.short_strike, rec.long_strike, rec.expiration.clone(), rec.contracts) {
            (Some(s), Some(l), Some(e), Some(c)) => (s, l, e, c),
            _ => return Err(bad_request("recommendation has no spread legs to execute")),
        };

    let right = match rec.action {
        RecommendationAction::OpenPutSpread | RecommendationAction::ClosePutSpread => "P",
        RecommendationAction::OpenCallSpread | RecommendationAction::OpenLongCall => "C",
    };
    let limit_price = rec.estimated_credit.or(rec.estimated_debit).unwrap_or(0.0);

    let handle = state
        .equities
        .broker
        .place_spread_order(short_strike, long_strike, &expiration, right, contracts, limit_price)
        .await
        .map_err(|e| bad_request(format!("broker rejected spread order: {e}")))?;

    let executed = state
        .recommendations
        .mark_executed(&rec.id, handle.order_id.clone(), limit_price)
        .map_err(bad_request)?;
    state.increment_version();
    info!(id = %executed.id, agent_id = %executed.agent_id, order_id = %handle.order_id, "recommendation executed via API");
    Ok(Json(executed))
}

// =============================================================================
// Runtime config (authenticated)
// =============================================================================

async fn get_config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime_config.read().clone())
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<crate::runtime_config::RuntimeConfig>,
) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        *config = update;
    }
    state.increment_version();

    if let Err(e) = state.save_config().await {
        warn!(error = %e, "failed to persist runtime config update");
    }
    info!("runtime config replaced via API");

    Json(state.runtime_config.read().clone())
}

// =============================================================================
// Control endpoints (authenticated) — per-agent status, scoped to one
// `AgentStack` rather than a single process-wide switch.
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    agent_id: String,
    status: String,
}

async fn control_pause(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let stack = state
        .stack_for(&agent_id)
        .ok_or_else(|| not_found(format!("unknown agent '{agent_id}'")))?;
    *stack.status.write() = AgentStatus::Paused;
    state.increment_version();
    info!(agent_id = %agent_id, "agent paused via API");
    Ok(Json(ControlResponse { agent_id, status: "paused".to_string() }))
}

async fn control_resume(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let stack = state
        .stack_for(&agent_id)
        .ok_or_else(|| not_found(format!("unknown agent '{agent_id}'")))?;
    *stack.status.write() = AgentStatus::Idle;
    state.increment_version();
    info!(agent_id = %agent_id, "agent resumed via API");
    Ok(Json(ControlResponse { agent_id, status: "idle".to_string() }))
}

async fn control_stop(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let stack = state
        .stack_for(&agent_id)
        .ok_or_else(|| not_found(format!("unknown agent '{agent_id}'")))?;
    *stack.status.write() = AgentStatus::Stopped;
    state.scheduler.stop(&agent_id);
    state.increment_version();
    warn!(agent_id = %agent_id, "agent stopped via API — scheduled job will not run again until restart");
    Ok(Json(ControlResponse { agent_id, status: "stopped".to_string() }))
}

// =============================================================================
// Scheduler status (authenticated)
// =============================================================================

async fn scheduler_status(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.status())
}
