use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use voipbill_core::{
    CustomerCode, DocumentCode, DocumentKey, DocumentKind, DomainError, DomainResult,
    Fingerprinted, ProductCode,
};
use voipbill_sales::{LineItem, Order, service_description};

/// Why a customer group produced no invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// External code unknown to the billing provider's customer directory.
    NoCustomer,
    /// External code is not a usable accounting customer code.
    NotIpexCustomer,
    /// Customer is on the configured skip-list.
    #[serde(rename = "skipped_skiplist")]
    SkipList,
    /// Uninvoiced amount does not exceed the invoicing limit.
    BelowLimit,
    /// An invoice for the same span already exists.
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoCustomer => "no_customer",
            SkipReason::NotIpexCustomer => "not_ipex_customer",
            SkipReason::SkipList => "skipped_skiplist",
            SkipReason::BelowLimit => "below_limit",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoicing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePolicy {
    pub product: ProductCode,
    /// Minimum uninvoiced amount; must be strictly exceeded.
    pub limit: Decimal,
    pub skip_list: BTreeSet<CustomerCode>,
}

impl InvoicePolicy {
    /// Skip-list and threshold gate, in that order.
    pub fn gate(&self, customer: &CustomerCode, amount: Decimal) -> Result<(), SkipReason> {
        if self.skip_list.contains(customer) {
            return Err(SkipReason::SkipList);
        }
        if !exceeds_limit(amount, self.limit) {
            return Err(SkipReason::BelowLimit);
        }
        Ok(())
    }
}

/// Strict threshold: an amount equal to the limit is not invoiced.
pub fn exceeds_limit(amount: Decimal, limit: Decimal) -> bool {
    amount > limit
}

/// Sum of order totals, without rounding.
pub fn uninvoiced_amount(orders: &[Order]) -> Decimal {
    orders.iter().map(|o| o.total).sum()
}

/// Earliest and latest issue date across `orders`.
pub fn order_span(orders: &[Order]) -> Option<(NaiveDate, NaiveDate)> {
    let since = orders.iter().map(|o| o.issue_date).min()?;
    let until = orders.iter().map(|o| o.issue_date).max()?;
    Some((since, until))
}

/// Order row that is not usage and is left out of the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignItem {
    pub order: Option<DocumentCode>,
    pub code: Option<String>,
    pub name: String,
}

/// Invoice ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub key: DocumentKey,
    pub customer: CustomerCode,
    pub description: String,
    /// Tax point: end of the consolidated span.
    pub taxable_date: NaiveDate,
    pub line_items: Vec<LineItem>,
    /// Orders consumed by this invoice, in input order.
    pub source_orders: Vec<DocumentCode>,
}

impl InvoiceDraft {
    pub fn since(&self) -> NaiveDate {
        self.key.period_start
    }

    pub fn until(&self) -> NaiveDate {
        self.key.period_end
    }

    pub fn external_id(&self) -> String {
        self.key.external_id()
    }

    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(LineItem::amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceComposition {
    pub draft: InvoiceDraft,
    pub foreign_items: Vec<ForeignItem>,
}

/// Merge the usage rows of `orders` into one invoice draft.
///
/// Copied rows lose their order-specific id and code and are re-tagged with
/// the canonical product.
pub fn compose(
    customer: &CustomerCode,
    orders: &[Order],
    product: &ProductCode,
) -> DomainResult<InvoiceComposition> {
    let (since, until) = order_span(orders)
        .ok_or_else(|| DomainError::incomplete("cannot invoice an empty order group"))?;

    let mut line_items = Vec::new();
    let mut foreign_items = Vec::new();
    let mut source_orders = Vec::new();

    for order in orders {
        if order.customer_code() != Some(customer) {
            return Err(DomainError::ForeignOrder {
                order: order.code.as_ref().map(ToString::to_string).unwrap_or_default(),
                customer: customer.to_string(),
            });
        }

        for item in &order.line_items {
            if item.is_product(product) {
                line_items.push(LineItem {
                    id: None,
                    code: None,
                    product: Some(product.clone()),
                    ..item.clone()
                });
            } else {
                warn!(
                    customer = %customer,
                    order = ?order.code,
                    item = ?item.code,
                    name = %item.name,
                    "no usage item"
                );
                foreign_items.push(ForeignItem {
                    order: order.code.clone(),
                    code: item.code.clone(),
                    name: item.name.clone(),
                });
            }
        }

        if let Some(code) = &order.code {
            source_orders.push(code.clone());
        }
    }

    Ok(InvoiceComposition {
        draft: InvoiceDraft {
            key: DocumentKey::new(DocumentKind::Invoice, customer.clone(), since, until),
            customer: customer.clone(),
            description: service_description(since, until),
            taxable_date: until,
            line_items,
            source_orders,
        },
        foreign_items,
    })
}

/// Persisted invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub code: Option<DocumentCode>,
    pub customer: CustomerCode,
    pub issue_date: NaiveDate,
    pub description: String,
    pub line_items: Vec<LineItem>,
    pub total: Decimal,
    #[serde(default)]
    pub external_ids: Vec<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl Fingerprinted for Invoice {
    fn description(&self) -> &str {
        &self.description
    }

    fn external_ids(&self) -> &[String] {
        &self.external_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use voipbill_parties::CustomerRef;
    use voipbill_sales::OrderState;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn product() -> ProductCode {
        ProductCode::decode("IPEX_POSTPAID").unwrap()
    }

    fn customer() -> CustomerCode {
        CustomerCode::decode("ACME").unwrap()
    }

    fn row(code: &str, price: Decimal) -> LineItem {
        LineItem {
            id: Some(1),
            code: Some(code.to_string()),
            name: format!("row {code}"),
            unit_price: price,
            quantity: Decimal::ONE,
            product: None,
            labels: vec!["API_IPEX".to_string()],
        }
    }

    fn order(code: &str, issued: NaiveDate, rows: Vec<LineItem>) -> Order {
        let total = rows.iter().map(LineItem::amount).sum();
        Order {
            code: Some(DocumentCode::decode(code).unwrap()),
            customer: CustomerRef::existing(customer()),
            issue_date: issued,
            description: String::new(),
            line_items: rows,
            state: OrderState::Prepared,
            locked: false,
            total,
            external_ids: Vec::new(),
            cancelled: false,
        }
    }

    fn policy(limit: Decimal) -> InvoicePolicy {
        InvoicePolicy {
            product: product(),
            limit,
            skip_list: BTreeSet::new(),
        }
    }

    #[test]
    fn compose_merges_usage_rows_and_spans_issue_dates() {
        let orders = vec![
            order("OBP1", date(2024, 4, 2), vec![row("IPEX_POSTPAID", Decimal::new(120, 0))]),
            order(
                "OBP2",
                date(2024, 5, 3),
                vec![
                    row("IPEX_POSTPAID", Decimal::new(9050, 2)),
                    row("SHIPPING", Decimal::new(10, 0)),
                ],
            ),
        ];

        let composition = compose(&customer(), &orders, &product()).unwrap();
        let draft = &composition.draft;

        assert_eq!(draft.since(), date(2024, 4, 2));
        assert_eq!(draft.until(), date(2024, 5, 3));
        assert_eq!(draft.taxable_date, date(2024, 5, 3));
        assert_eq!(draft.line_items.len(), 2);
        assert!(draft.line_items.iter().all(|i| i.id.is_none() && i.code.is_none()));
        assert!(draft.line_items.iter().all(|i| i.product == Some(product())));
        assert_eq!(draft.total(), Decimal::new(21050, 2));
        assert_eq!(draft.source_orders.len(), 2);
        assert_eq!(
            draft.description,
            "Telephone services from 04. 02. 2024 to 05. 03. 2024"
        );

        assert_eq!(composition.foreign_items.len(), 1);
        assert_eq!(composition.foreign_items[0].code.as_deref(), Some("SHIPPING"));
    }

    #[test]
    fn compose_rejects_empty_group() {
        let err = compose(&customer(), &[], &product()).unwrap_err();
        match err {
            DomainError::Incomplete(msg) if msg.contains("empty order group") => {}
            _ => panic!("Expected Incomplete for empty group"),
        }
    }

    #[test]
    fn compose_rejects_orders_of_another_customer() {
        let mut foreign = order("OBP1", date(2024, 5, 1), Vec::new());
        foreign.customer = CustomerRef::existing(CustomerCode::decode("OTHER").unwrap());

        let err = compose(&customer(), &[foreign], &product()).unwrap_err();
        assert!(matches!(err, DomainError::ForeignOrder { .. }));
    }

    #[test]
    fn amount_equal_to_limit_is_not_invoiced() {
        let limit = Decimal::new(200, 0);
        assert!(!exceeds_limit(Decimal::new(20000, 2), limit));
        assert!(exceeds_limit(Decimal::new(20001, 2), limit));

        assert_eq!(
            policy(limit).gate(&customer(), Decimal::new(200, 0)),
            Err(SkipReason::BelowLimit)
        );
        assert_eq!(policy(limit).gate(&customer(), Decimal::new(20001, 2)), Ok(()));
    }

    #[test]
    fn skip_list_wins_over_amount() {
        let mut policy = policy(Decimal::ZERO);
        policy.skip_list.insert(customer());
        assert_eq!(
            policy.gate(&customer(), Decimal::new(1_000_000, 0)),
            Err(SkipReason::SkipList)
        );
    }

    #[test]
    fn skip_reasons_have_stable_names() {
        assert_eq!(SkipReason::SkipList.to_string(), "skipped_skiplist");
        assert_eq!(SkipReason::NotIpexCustomer.as_str(), "not_ipex_customer");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the uninvoiced amount is the exact sum of order totals
        /// and the gate passes iff that sum strictly exceeds the limit.
        #[test]
        fn threshold_is_strict_over_exact_sum(
            totals in prop::collection::vec(0i64..5_000_000, 1..12),
            limit_cents in 0i64..20_000_000,
        ) {
            let orders: Vec<Order> = totals
                .iter()
                .enumerate()
                .map(|(i, cents)| order(
                    &format!("OBP{i}"),
                    date(2024, 5, 1),
                    vec![row("IPEX_POSTPAID", Decimal::new(*cents, 2))],
                ))
                .collect();

            let expected: i64 = totals.iter().sum();
            let amount = uninvoiced_amount(&orders);
            prop_assert_eq!(amount, Decimal::new(expected, 2));

            let limit = Decimal::new(limit_cents, 2);
            let gate = policy(limit).gate(&customer(), amount);
            prop_assert_eq!(gate.is_ok(), expected > limit_cents);
        }
    }
}
