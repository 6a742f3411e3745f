use thiserror::Error;

/// Top-level process error for the outermost error-handling boundary (§7): every in-process
/// component (Router, Portfolio, Executor, Orchestrator) handles its own `ExecutionError`s and
/// `StrategyError`s inline by logging and continuing, since a single symbol's failure must never
/// take down the rest of the fleet. Only startup, which has no fleet left to protect yet, bubbles
/// a fatal error all the way out to `main`.
#[derive(Debug, Error)]
pub enum GridfleetError {
    #[error("configuration: {0}")]
    Configuration(String),
}
