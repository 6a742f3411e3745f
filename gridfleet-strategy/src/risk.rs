use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Hard ceiling on risk-per-trade regardless of configuration (§4.4.2, §6).
pub const MAX_RISK_PCT_PER_TRADE: Decimal = dec!(3.0);

/// Fixed-fractional position sizing (§4.4.2).
///
/// Returns `0` (skip the entry) when `balance_real <= 0` or `stop_distance_frac <= 0` - the
/// formula divides by both, and a bot with no equity or a misconfigured zero-width grid must
/// never size an order off it.
pub fn position_size(
    balance_real: Decimal,
    risk_pct_per_trade: Decimal,
    grid_width_pct: Decimal,
    entry_price: Decimal,
) -> Decimal {
    if balance_real <= Decimal::ZERO || grid_width_pct <= Decimal::ZERO || entry_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let risk_pct = risk_pct_per_trade.min(MAX_RISK_PCT_PER_TRADE);
    let risk_amount = balance_real * risk_pct / dec!(100);
    let stop_distance_frac = grid_width_pct / dec!(100);

    (risk_amount / stop_distance_frac) / entry_price
}
