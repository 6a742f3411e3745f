use gridfleet::bot_manager::{AgentTemplate, BotManager};
use gridfleet::error::GridfleetError;
use gridfleet::http;
use gridfleet::logging;
use gridfleet::orchestrator::{HttpDiscoverySource, Orchestrator, RestKlineSource};
use gridfleet::router::MarketDataRouter;
use gridfleet_execution::live::LiveGateway;
use gridfleet_execution::simulated::SimulatedGateway;
use gridfleet_execution::ExchangeGateway;
use gridfleet_instrument::Symbol;
use gridfleet_strategy::{FleetConfig, RunMode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Seed universe for `SIMULATION` mode, which has no real exchange to ask `get_instruments`.
const SIMULATED_UNIVERSE: [&str; 5] = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"];

#[tokio::main]
async fn main() {
    let config = match FleetConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{}", GridfleetError::Configuration(error));
            std::process::exit(1);
        }
    };

    logging::init_logging(config.log_format);
    info!(mode = ?config.mode, "starting gridfleet");

    let (gateway, trades): (Arc<dyn ExchangeGateway>, _) = match config.mode {
        RunMode::Simulation => {
            let universe: HashSet<Symbol> = SIMULATED_UNIVERSE.iter().copied().map(Symbol::new).collect();
            let (gateway, trades) = SimulatedGateway::new(universe, config.initial_capital);
            (Arc::new(gateway), trades)
        }
        RunMode::Live => match LiveGateway::new(
            config.rest_base.clone(),
            config.ws_url.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
        ) {
            Ok((gateway, trades)) => (Arc::new(gateway), trades),
            Err(error) => {
                error!(%error, "failed to start live gateway");
                std::process::exit(1);
            }
        },
    };

    let market_data_router = Arc::new(MarketDataRouter::new());
    let template = AgentTemplate {
        grid_width_pct: config.grid_width_pct,
        trade_mode: config.trade_mode,
        risk_pct_per_trade: config.risk_pct_per_trade,
        max_entries: config.max_entries,
        initial_capital: config.initial_capital,
        state_dir: config.state_dir.clone(),
    };
    let bot_manager = Arc::new(BotManager::new(
        market_data_router.clone(),
        gateway.clone(),
        template,
    ));

    let discovery = Arc::new(HttpDiscoverySource::new(config.discovery_url.clone()));
    let kline_source = Arc::new(RestKlineSource::new(config.rest_base.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        gateway.clone(),
        bot_manager.clone(),
        discovery,
        kline_source,
    ));

    let router_task = {
        let market_data_router = market_data_router.clone();
        tokio::spawn(async move { market_data_router.run(trades).await })
    };
    let orchestrator_task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    let http_app = http::router(bot_manager.clone());
    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = match tokio::net::TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, addr = %http_addr, "failed to bind HTTP control plane");
            std::process::exit(1);
        }
    };
    info!(addr = %http_addr, "HTTP control plane listening");
    let http_task = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, http_app).await {
            error!(%error, "HTTP control plane server error");
        }
    });

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to install ctrl-c handler, shutting down anyway");
    }
    info!("shutdown signal received");

    bot_manager.save_all_states();
    bot_manager.stop_all().await;

    router_task.abort();
    orchestrator_task.abort();
    http_task.abort();

    info!("gridfleet stopped");
}
