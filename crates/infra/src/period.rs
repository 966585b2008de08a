use chrono::NaiveDate;
use tracing::info;

use voipbill_usage::{PeriodSelector, PeriodWindow};

use crate::error::InfraResult;
use crate::ports::AccountingSystem;

/// Resolve the processed month; continue mode asks the accounting system
/// for the most recent order.
pub fn resolve_window<A: AccountingSystem + ?Sized>(
    accounting: &A,
    explicit_offset: Option<i32>,
    continue_mode: bool,
    today: NaiveDate,
) -> InfraResult<PeriodWindow> {
    let selector = if continue_mode {
        PeriodSelector::Continue {
            last_order: accounting.last_order_date()?,
        }
    } else {
        PeriodSelector::Offset(explicit_offset)
    };

    let window = PeriodWindow::resolve(selector, today)?;
    info!(
        month_offset = window.month_offset(),
        since = %window.since(),
        until = %window.until(),
        "processing period"
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use voipbill_core::{CustomerCode, DocumentCode};
    use voipbill_parties::CustomerRef;
    use voipbill_sales::{Order, OrderState};

    use crate::in_memory::InMemoryAccounting;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn order_issued(issued: NaiveDate) -> Order {
        Order {
            code: Some(DocumentCode::decode("OBP0001").unwrap()),
            customer: CustomerRef::existing(CustomerCode::decode("ACME").unwrap()),
            issue_date: issued,
            description: String::new(),
            line_items: Vec::new(),
            state: OrderState::Prepared,
            locked: false,
            total: Decimal::ZERO,
            external_ids: Vec::new(),
            cancelled: false,
        }
    }

    #[test]
    fn continue_mode_uses_last_order_three_months_back() {
        let accounting = InMemoryAccounting::new();
        accounting.insert_order(order_issued(date(2024, 3, 5)));

        let window = resolve_window(&accounting, Some(-7), true, date(2024, 6, 10)).unwrap();
        assert_eq!(window.month_offset(), -3);
        assert_eq!(window.since(), date(2024, 3, 1));
    }

    #[test]
    fn continue_mode_without_orders_defaults_to_last_month() {
        let accounting = InMemoryAccounting::new();
        let window = resolve_window(&accounting, None, true, date(2024, 6, 10)).unwrap();
        assert_eq!(window.month_offset(), -1);
        assert_eq!(window.until(), date(2024, 5, 31));
    }

    #[test]
    fn explicit_offset_skips_the_accounting_query() {
        let accounting = InMemoryAccounting::new();
        accounting.fail_queries(true);
        let window = resolve_window(&accounting, Some(2), false, date(2024, 6, 10)).unwrap();
        assert_eq!(window.month_offset(), -2);
        assert!(resolve_window(&accounting, None, true, date(2024, 6, 10)).is_err());
    }
}
