//! Shared helpers for Decimal to f64 conversions.
//!
//! Monetary cost totals are stored and summed as `Decimal` (no float drift in
//! the budget ledger) and only converted to `f64` at the response boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dec_to_f64() {
        assert_eq!(dec_to_f64(Decimal::new(15, 4)), 0.0015);
        assert_eq!(dec_to_f64(Decimal::ZERO), 0.0);
    }
}
