//! HTTP route handlers for the operator API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::actions::generator::GenerationContext;
use crate::actions::prompts::DRAFT_HISTORICAL_EXAMPLES;
use crate::actions::trigger;
use crate::actions::types::{Action, MarketSignal, ScreenshotMode};
use crate::db::pool;
use crate::error::ActionError;

use super::server::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn api_error(status: StatusCode, message: impl ToString) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.to_string() })))
}

fn internal(e: ActionError) -> (StatusCode, Json<Value>) {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
}

/// Build all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/:id/actions", get(history))
        .route("/api/accounts/:id/stats", get(stats))
        .route("/api/accounts/:id/test-action", post(test_action))
        .route("/api/signals", post(ingest_signal))
        .route("/health", get(health))
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

/// GET /api/accounts/:id/actions, newest first.
async fn history(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let actions = state.store.history(&account_id, limit).await.map_err(internal)?;
    Ok(Json(json!({ "account_id": account_id, "actions": actions })))
}

/// GET /api/accounts/:id/stats
async fn stats(State(state): State<AppState>, Path(account_id): Path<String>) -> ApiResult {
    let stats = state.store.stats(&account_id).await.map_err(internal)?;
    Ok(Json(json!({ "account_id": account_id, "stats": stats })))
}

/// POST /api/signals: fan a market signal out to every account.
async fn ingest_signal(State(state): State<AppState>, Json(signal): Json<MarketSignal>) -> ApiResult {
    let outcomes = state.evaluator.handle_signal(&signal).await.map_err(internal)?;
    Ok(Json(json!({ "event_id": signal.event_id, "outcomes": outcomes })))
}

/// POST /api/accounts/:id/test-action: generate (and optionally screenshot) without persisting or posting.
async fn test_action(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(signal): Json<MarketSignal>,
) -> ApiResult {
    let config = state
        .accounts
        .get(&account_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown account {account_id}")))?;

    let action = Action::from_signal(&account_id, &config, &signal, state.evaluator.polymarket_web_url());

    let historical = if config.use_historical {
        state
            .store
            .recent_posts(&account_id, DRAFT_HISTORICAL_EXAMPLES as i64)
            .await
            .map_err(internal)?
    } else {
        Vec::new()
    };

    let (mut market, mut profile) = (None, None);
    if let Some(fetcher) = &state.fetcher {
        if let Some(trade) = &action.trade_event {
            market = fetcher
                .market_context(&trade.market_slug)
                .await
                .inspect_err(|e| warn!(error = %e, "market context fetch failed"))
                .ok()
                .flatten();
        }
        profile = fetcher
            .profile_context(&action.wallet_address)
            .await
            .inspect_err(|e| warn!(error = %e, "profile context fetch failed"))
            .ok()
            .flatten();
    }

    let ctx = GenerationContext::new(&action, &config, historical).with_fetched(market, profile);
    let generation = state
        .generator
        .generate(&ctx)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))?;

    let mut screenshot_path = None;
    let mut screenshot_error = None;
    if let Some(capturer) = &state.capturer {
        let mode = config.screenshot_mode;
        let identifier = match mode {
            ScreenshotMode::Market => action.trade_event.as_ref().map(|t| t.market_slug.clone()).unwrap_or_default(),
            _ => action.wallet_address.clone(),
        };
        match capturer.capture(mode, &identifier).await {
            Ok(path) => screenshot_path = path.map(|p| p.to_string_lossy().into_owned()),
            Err(e) => screenshot_error = Some(e.to_string()),
        }
    }

    Ok(Json(json!({
        "account_id": account_id,
        "trigger_matched": trigger::matches(&config, &signal),
        "market_url": action.market_url,
        "profile_url": action.profile_url,
        "generation": generation,
        "screenshot_path": screenshot_path,
        "screenshot_error": screenshot_error,
    })))
}

/// GET /health: database reachability.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match pool::health_check(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::accounts::StaticAccountConfigs;
    use crate::actions::generator::ContentGenerator;
    use crate::actions::store::{ActionStore, SqlActionStore};
    use crate::actions::trigger::TriggerEvaluator;
    use crate::actions::types::{ActionsConfig, TradeEvent, TriggerType, WalletProfile};
    use crate::db::pool::memory_pool;
    use crate::events::bus::EventBus;
    use crate::llm::mock::MockLlm;
    use std::sync::Arc;
    use std::time::Duration;

    async fn state(llm: MockLlm) -> AppState {
        let db = memory_pool().await;
        let store: Arc<dyn ActionStore> = Arc::new(SqlActionStore::new(db.clone()));
        let mut cfg = ActionsConfig::new(TriggerType::BigTrade);
        cfg.enabled = true;
        cfg.min_trade_size = 1000.0;
        let accounts = Arc::new(StaticAccountConfigs::new(vec![("whales".to_string(), cfg)]));
        let evaluator = Arc::new(TriggerEvaluator::new(
            store.clone(),
            accounts.clone(),
            Arc::new(EventBus::new(16)),
            "https://polymarket.com",
        ));
        AppState {
            db,
            store,
            accounts,
            evaluator,
            generator: Arc::new(ContentGenerator::new(Arc::new(llm), Duration::from_secs(5))),
            fetcher: None,
            capturer: None,
        }
    }

    fn signal(event_id: &str, size: f64) -> MarketSignal {
        MarketSignal {
            event_id: event_id.into(),
            wallet: WalletProfile {
                address: "0xw".into(),
                bet_count: 40,
                freshness: "active".into(),
                join_date: None,
            },
            trade: Some(TradeEvent {
                market_name: "Election".into(),
                market_slug: "election".into(),
                event_title: String::new(),
                side: "BUY".into(),
                outcome: "Yes".into(),
                price: 0.5,
                size,
            }),
        }
    }

    #[tokio::test]
    async fn ingest_queues_and_history_lists_it() {
        let state = state(MockLlm::new("x")).await;

        let Json(body) = ingest_signal(State(state.clone()), Json(signal("evt-1", 5000.0)))
            .await
            .unwrap();
        assert_eq!(body["outcomes"][0]["account_id"], "whales");
        assert_eq!(body["outcomes"][0]["outcome"], "queued");

        // Redelivery is a duplicate.
        let Json(body) = ingest_signal(State(state.clone()), Json(signal("evt-1", 5000.0)))
            .await
            .unwrap();
        assert_eq!(body["outcomes"][0]["outcome"], "duplicate");

        let Json(body) = history(
            State(state.clone()),
            Path("whales".into()),
            Query(HistoryQuery { limit: Some(10_000) }),
        )
        .await
        .unwrap();
        assert_eq!(body["actions"].as_array().unwrap().len(), 1);
        assert_eq!(body["actions"][0]["status"], "pending");

        let Json(body) = stats(State(state), Path("whales".into())).await.unwrap();
        assert_eq!(body["stats"]["total"], 1);
        assert_eq!(body["stats"]["pending"], 1);
    }

    #[tokio::test]
    async fn test_action_generates_without_persisting() {
        let state = state(MockLlm::new("Big YES buy on the election market.")).await;

        let Json(body) = test_action(State(state.clone()), Path("whales".into()), Json(signal("evt-2", 10.0)))
            .await
            .unwrap();
        assert_eq!(body["trigger_matched"], false);
        assert_eq!(body["generation"]["final_text"], "Big YES buy on the election market.");
        assert_eq!(body["market_url"], "https://polymarket.com/event/election");
        assert!(body["screenshot_path"].is_null());

        assert!(state.store.history("whales", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_action_for_unknown_account_is_not_found() {
        let state = state(MockLlm::new("x")).await;
        let (status, _) = test_action(State(state), Path("nobody".into()), Json(signal("e", 1.0)))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = state(MockLlm::new("x")).await;
        let (status, Json(body)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
