use crate::bot_manager::BotManager;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gridfleet_instrument::{StrategyParams, Symbol};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Thin control-plane surface over the [`BotManager`]'s existing API (§4.12): no strategy or
/// risk logic lives here, only request parsing and delegation.
pub fn router(bot_manager: Arc<BotManager>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .with_state(bot_manager)
}

#[derive(Serialize)]
struct StatusResponse {
    active_count: usize,
    active_symbols: Vec<Symbol>,
}

async fn status(State(bot_manager): State<Arc<BotManager>>) -> Json<StatusResponse> {
    let active_symbols = bot_manager.active_symbols();
    Json(StatusResponse {
        active_count: active_symbols.len(),
        active_symbols,
    })
}

#[derive(Deserialize)]
struct StartRequest {
    symbol: Symbol,
    params: StrategyParams,
}

async fn start(
    State(bot_manager): State<Arc<BotManager>>,
    Json(request): Json<StartRequest>,
) -> StatusCode {
    bot_manager.start_bot(request.symbol, request.params).await;
    StatusCode::ACCEPTED
}

#[derive(Deserialize)]
struct StopRequest {
    symbol: Symbol,
    manage_position: bool,
}

async fn stop(
    State(bot_manager): State<Arc<BotManager>>,
    Json(request): Json<StopRequest>,
) -> StatusCode {
    bot_manager
        .stop_bot(&request.symbol, request.manage_position)
        .await;
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot_manager::AgentTemplate;
    use crate::router::MarketDataRouter;
    use gridfleet_execution::simulated::SimulatedGateway;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn test_bot_manager() -> Arc<BotManager> {
        let (gateway, _trades) = SimulatedGateway::new(HashSet::new(), dec!(10000));
        let router = Arc::new(MarketDataRouter::new());
        let template = AgentTemplate {
            grid_width_pct: dec!(1.0),
            trade_mode: gridfleet_instrument::TradeMode::DualSide,
            risk_pct_per_trade: dec!(1.0),
            max_entries: 2,
            initial_capital: dec!(10000),
            state_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        };
        Arc::new(BotManager::new(router, Arc::new(gateway), template))
    }

    #[tokio::test]
    async fn status_reports_empty_active_symbols_initially() {
        let response = status(State(test_bot_manager())).await;
        assert!(response.0.active_symbols.is_empty());
        assert_eq!(response.0.active_count, 0);
    }

    #[tokio::test]
    async fn stop_unknown_symbol_is_accepted_and_a_noop() {
        let status_code = stop(
            State(test_bot_manager()),
            Json(StopRequest {
                symbol: Symbol::new("BTCUSDT"),
                manage_position: false,
            }),
        )
        .await;
        assert_eq!(status_code, StatusCode::ACCEPTED);
    }
}
