//! Budget governor: degradation policy from the provider-cost ledger.
//!
//! Costs are summed from the append-only `api_usage` ledger over the current
//! UTC day and year-month; no incremental counters, so there is nothing to
//! drift. Callers evaluate once per pipeline run and reuse the result.

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::db::queries;
use crate::errors::AppError;

/// One billable (or free-tier) provider call, destined for the `api_usage`
/// ledger. Providers construct these; the pipeline persists them.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub provider: &'static str,
    pub endpoint: String,
    pub cost_usd: Decimal,
}

impl UsageEntry {
    pub fn new(provider: &'static str, endpoint: &str, cost_usd: Decimal) -> Self {
        Self {
            provider,
            endpoint: endpoint.to_string(),
            cost_usd,
        }
    }
}

/// Daily spend above which the route sampler widens its spacing (USD).
const DAILY_REDUCE_SAMPLING_USD: i64 = 12;

/// Monthly spend above which lower-priority analyses are suppressed (USD).
const MONTHLY_LOW_FREQUENCY_USD: i64 = 360;

/// Monthly spend above which the pipeline stops entirely (USD).
const MONTHLY_DISABLED_USD: i64 = 450;

/// Degradation policy derived from accumulated provider costs.
///
/// The flags are independent and additive: `reduce_sampling` widens sampler
/// spacing, `low_frequency` suppresses secondary analyses, `disabled` is a
/// hard circuit breaker, the pipeline must no-op for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetState {
    pub daily_total: Decimal,
    pub monthly_total: Decimal,
    pub reduce_sampling: bool,
    pub low_frequency: bool,
    pub disabled: bool,
}

impl BudgetState {
    /// Pure policy from cost totals.
    pub fn from_totals(daily_total: Decimal, monthly_total: Decimal) -> Self {
        Self {
            reduce_sampling: daily_total > Decimal::from(DAILY_REDUCE_SAMPLING_USD),
            low_frequency: monthly_total > Decimal::from(MONTHLY_LOW_FREQUENCY_USD),
            disabled: monthly_total > Decimal::from(MONTHLY_DISABLED_USD),
            daily_total,
            monthly_total,
        }
    }
}

/// Evaluate the current budget state from the cost ledger.
pub async fn evaluate_budget(pool: &PgPool) -> Result<BudgetState, AppError> {
    let (daily_total, monthly_total) = queries::usage_totals(pool).await?;
    Ok(BudgetState::from_totals(daily_total, monthly_total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_all_thresholds() {
        let state = BudgetState::from_totals(Decimal::from(5), Decimal::from(100));
        assert!(!state.reduce_sampling);
        assert!(!state.low_frequency);
        assert!(!state.disabled);
    }

    #[test]
    fn test_daily_over_twelve_reduces_sampling() {
        let state = BudgetState::from_totals(Decimal::from(13), Decimal::from(100));
        assert!(state.reduce_sampling);
        assert!(!state.low_frequency);
        assert!(!state.disabled);
    }

    #[test]
    fn test_daily_exactly_twelve_is_not_over() {
        let state = BudgetState::from_totals(Decimal::from(12), Decimal::from(100));
        assert!(!state.reduce_sampling);
    }

    #[test]
    fn test_monthly_over_360_low_frequency() {
        let state = BudgetState::from_totals(Decimal::from(1), Decimal::from(361));
        assert!(state.low_frequency);
        assert!(!state.disabled);
    }

    #[test]
    fn test_monthly_over_450_disables_regardless_of_daily() {
        let state = BudgetState::from_totals(Decimal::ZERO, Decimal::from(460));
        assert!(state.disabled);
        assert!(state.low_frequency);
        assert!(!state.reduce_sampling);
    }

    #[test]
    fn test_fractional_totals() {
        let state = BudgetState::from_totals(Decimal::new(1205, 2), Decimal::from(100));
        assert!(state.reduce_sampling, "12.05 > 12");
    }
}
