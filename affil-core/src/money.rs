//! Integer money arithmetic. All amounts are minor units (cents, yen, ...);
//! all rates are basis points. Intermediates widen to i128, results truncate
//! toward zero and never go negative.

pub const BPS_DENOMINATOR: i64 = 10_000;

/// Applies a basis-point rate to an amount of minor units.
pub fn apply_bps(amount_minor: i64, rate_bps: i64) -> i64 {
    let result = (amount_minor as i128) * (rate_bps as i128) / (BPS_DENOMINATOR as i128);
    if result < 0 {
        0
    } else {
        result as i64
    }
}

/// Prorates a commission after a refund: the surviving fraction of the order
/// amount scales the commission. Never negative, and non-increasing as the
/// refunded total grows.
pub fn prorate(amount_minor: i64, order_minor: i64, refunded_minor: i64) -> i64 {
    if order_minor <= 0 {
        return 0;
    }
    let remaining = (order_minor - refunded_minor).max(0);
    let result = (amount_minor as i128) * (remaining as i128) / (order_minor as i128);
    if result < 0 {
        0
    } else {
        result as i64
    }
}
