use gridfleet_instrument::TradeMode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Gateway operating mode (§4.1): selected once at process start, never observable by upstream
/// components beyond this single flag.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub enum RunMode {
    #[default]
    Simulation,
    Live,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIVE" => Ok(RunMode::Live),
            "SIMULATION" => Ok(RunMode::Simulation),
            other => Err(format!("unrecognised MODE: {other}")),
        }
    }
}

/// Process-wide fleet configuration, loaded once from the environment at startup (§6, §4.11).
/// Every field is optional in the environment and falls back to the spec's documented default;
/// `RISK_PCT_PER_TRADE` is additionally hard-clamped to 3.0 regardless of what is configured.
#[derive(Clone, Debug, PartialEq)]
pub struct FleetConfig {
    pub mode: RunMode,
    pub api_key: String,
    pub api_secret: String,
    pub trade_mode: TradeMode,
    pub grid_width_pct: Decimal,
    pub supertrend_period: usize,
    pub supertrend_multiplier: Decimal,
    pub max_entries: u8,
    pub risk_pct_per_trade: Decimal,
    pub initial_capital: Decimal,
    pub leverage_multiplier: u32,
    pub taker_fee: Decimal,
    pub maker_fee: Decimal,
    pub discovery_url: String,
    /// Exchange REST base URL, used for order placement, instrument/balance queries and
    /// historical kline fetches (§4.1, §4.8). Not in the spec's documented env var list since
    /// it names no defaultable trading behaviour, but `LiveGateway` and the backtester's kline
    /// source have no other source for it.
    pub rest_base: String,
    /// Exchange websocket URL for the live trade stream (§4.1).
    pub ws_url: String,
    pub state_dir: String,
    pub log_format: LogFormat,
    pub http_port: u16,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Simulation,
            api_key: String::new(),
            api_secret: String::new(),
            trade_mode: TradeMode::DualSide,
            grid_width_pct: dec!(1.0),
            supertrend_period: 30,
            supertrend_multiplier: dec!(3.0),
            max_entries: 2,
            risk_pct_per_trade: dec!(1.0),
            initial_capital: dec!(10000.0),
            leverage_multiplier: 10,
            taker_fee: Decimal::ZERO,
            maker_fee: Decimal::ZERO,
            discovery_url: "http://localhost:8081/discovery".to_string(),
            rest_base: "https://api.exchange.invalid".to_string(),
            ws_url: "wss://stream.exchange.invalid".to_string(),
            state_dir: "./state".to_string(),
            log_format: LogFormat::Text,
            http_port: 8080,
        }
    }
}

impl FleetConfig {
    /// Reads every field from the process environment, warning and falling back to the default
    /// on a missing or malformed value (§7: "Configuration missing / invalid: warned on startup;
    /// defaults applied where sensible"). Missing API credentials while `MODE=LIVE` is the one
    /// case that is fatal rather than defaulted, per the same section.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let mode = parse_env_or("MODE", defaults.mode);
        let api_key = std::env::var("API_KEY").unwrap_or_default();
        let api_secret = std::env::var("API_SECRET").unwrap_or_default();

        if mode == RunMode::Live && (api_key.is_empty() || api_secret.is_empty()) {
            return Err("missing API_KEY/API_SECRET while MODE=LIVE".to_string());
        }

        let risk_pct_per_trade =
            parse_env_or("RISK_PCT_PER_TRADE", defaults.risk_pct_per_trade).min(dec!(3.0));

        Ok(Self {
            mode,
            api_key,
            api_secret,
            trade_mode: parse_env_or("TRADE_MODE", defaults.trade_mode),
            grid_width_pct: parse_env_or("GRID_WIDTH_PCT", defaults.grid_width_pct),
            supertrend_period: parse_env_or("SUPERTREND_PERIOD", defaults.supertrend_period),
            supertrend_multiplier: parse_env_or(
                "SUPERTREND_MULTIPLIER",
                defaults.supertrend_multiplier,
            ),
            max_entries: parse_env_or("MAX_ENTRIES", defaults.max_entries),
            risk_pct_per_trade,
            initial_capital: parse_env_or("INITIAL_CAPITAL", defaults.initial_capital),
            leverage_multiplier: parse_env_or(
                "LEVERAGE_MULTIPLIER",
                defaults.leverage_multiplier,
            ),
            taker_fee: parse_env_or("TAKER_FEE", defaults.taker_fee),
            maker_fee: parse_env_or("MAKER_FEE", defaults.maker_fee),
            discovery_url: std::env::var("DISCOVERY_URL").unwrap_or(defaults.discovery_url),
            rest_base: std::env::var("REST_BASE_URL").unwrap_or(defaults.rest_base),
            ws_url: std::env::var("WS_URL").unwrap_or(defaults.ws_url),
            state_dir: std::env::var("STATE_DIR").unwrap_or(defaults.state_dir),
            log_format: parse_env_or(
                "LOG_FORMAT",
                match defaults.log_format {
                    LogFormat::Text => "text".to_string(),
                    LogFormat::Json => "json".to_string(),
                },
            )
            .parse()
            .unwrap_or_default(),
            http_port: parse_env_or("HTTP_PORT", defaults.http_port),
        })
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("unrecognised LOG_FORMAT: {other}")),
        }
    }
}

/// Reads `key` from the environment and parses it as `T`, warning and falling back to `default`
/// if the variable is absent or fails to parse.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}
