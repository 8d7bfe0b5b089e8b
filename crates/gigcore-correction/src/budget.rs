use chrono::{DateTime, Timelike, Utc};
use gigcore_core::constants::{
    CORRECTION_BUDGET_CATEGORY_PER_HOUR, CORRECTION_BUDGET_CITY_PER_HOUR,
    CORRECTION_BUDGET_GLOBAL_PER_HOUR, CORRECTION_BUDGET_ZONE_PER_HOUR,
};
use gigcore_core::error::CoreError;
use gigcore_store::{correction as correction_store, Store, Txn};

const GLOBAL_SCOPE_KEY: &str = "global";

/// One budget dimension to check/consume for a correction (§4.H). Every
/// correction checks `Global`; `City`/`Zone`/`Category` are added only when
/// the correction carries that field, so a zone-scoped correction counts
/// against both its zone's budget and the platform-wide one.
#[derive(Clone, Copy, Debug)]
pub enum BudgetDimension<'a> {
    Global,
    City(&'a str),
    Zone(&'a str),
    Category(&'a str),
}

impl<'a> BudgetDimension<'a> {
    fn scope(&self) -> &'static str {
        match self {
            BudgetDimension::Global => "global",
            BudgetDimension::City(_) => "city",
            BudgetDimension::Zone(_) => "zone",
            BudgetDimension::Category(_) => "category",
        }
    }

    fn scope_key(&self) -> &str {
        match self {
            BudgetDimension::Global => GLOBAL_SCOPE_KEY,
            BudgetDimension::City(k) | BudgetDimension::Zone(k) | BudgetDimension::Category(k) => k,
        }
    }

    fn limit(&self) -> i64 {
        match self {
            BudgetDimension::Global => CORRECTION_BUDGET_GLOBAL_PER_HOUR,
            BudgetDimension::City(_) => CORRECTION_BUDGET_CITY_PER_HOUR,
            BudgetDimension::Zone(_) => CORRECTION_BUDGET_ZONE_PER_HOUR,
            BudgetDimension::Category(_) => CORRECTION_BUDGET_CATEGORY_PER_HOUR,
        }
    }
}

/// Truncates to the start of the hour the budget windows are keyed on.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap()
}

/// The dimensions that apply to a correction carrying the given scope
/// fields: always `Global`, plus whichever of city/zone/category are set.
pub fn dimensions_for<'a>(
    city: Option<&'a str>,
    zone: Option<&'a str>,
    category: Option<&'a str>,
) -> Vec<BudgetDimension<'a>> {
    let mut dims = vec![BudgetDimension::Global];
    if let Some(c) = city {
        dims.push(BudgetDimension::City(c));
    }
    if let Some(z) = zone {
        dims.push(BudgetDimension::Zone(z));
    }
    if let Some(cat) = category {
        dims.push(BudgetDimension::Category(cat));
    }
    dims
}

/// Read-only (§4.H: "the budget check is read-only"). Returns
/// `CoreError::BudgetExhausted` if any applicable dimension is already at
/// its hourly limit.
pub async fn check(store: &Store, dims: &[BudgetDimension<'_>], window: DateTime<Utc>) -> Result<(), CoreError> {
    for dim in dims {
        let count = store.budget_count(dim.scope(), dim.scope_key(), window).await?;
        if count as i64 >= dim.limit() {
            return Err(CoreError::BudgetExhausted(format!(
                "{} budget exhausted for {}",
                dim.scope(),
                dim.scope_key()
            )));
        }
    }
    Ok(())
}

/// Atomically increments every applicable dimension's counter. Called only
/// after a correction has actually been applied, inside the same
/// transaction as the insert.
pub async fn consume(txn: &mut Txn, dims: &[BudgetDimension<'_>], window: DateTime<Utc>) -> Result<(), CoreError> {
    for dim in dims {
        correction_store::consume_budget(txn, dim.scope(), dim.scope_key(), window).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_start_truncates_to_the_hour() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 14, 37, 52).unwrap();
        let start = window_start(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 7, 26, 14, 0, 0).unwrap());
    }

    #[test]
    fn dimensions_always_include_global() {
        let dims = dimensions_for(None, None, None);
        assert_eq!(dims.len(), 1);
        assert!(matches!(dims[0], BudgetDimension::Global));
    }

    #[test]
    fn dimensions_add_each_present_scope() {
        let dims = dimensions_for(Some("austin"), Some("z1"), Some("cleaning"));
        assert_eq!(dims.len(), 4);
    }
}
