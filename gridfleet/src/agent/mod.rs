//! Per-symbol agent components: the Portfolio/Grid Manager ([`portfolio`]) and the Order
//! Executor ([`executor`]). The Signal Generator itself lives in `gridfleet-strategy`; the
//! per-agent task that drives it sits in [`portfolio::run_signal_loop`].

pub mod executor;
pub mod portfolio;
