use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use voipbill_core::{
    CustomerCode, DocumentCode, DocumentKey, DocumentKind, DomainError, DomainResult,
    Fingerprinted, ProductCode, format_period_date, uncode,
};
use voipbill_parties::{Address, CustomerRef, PartyDraft};
use voipbill_usage::UsageRecord;

/// Label put on every usage line item.
pub const USAGE_LABEL: &str = "API_IPEX";

/// Order state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Waiting to be invoiced.
    Prepared,
    /// Consumed into an invoice.
    Done,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Prepared => "prepared",
            OrderState::Done => "done",
        }
    }
}

/// Document line: priced service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Accounting-system row id (present on persisted documents only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Row code as reported by the accounting system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    /// Price-list product the row is classified under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductCode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl LineItem {
    /// Single-unit usage row.
    pub fn usage(name: impl Into<String>, unit_price: Decimal, product: ProductCode) -> Self {
        Self {
            id: None,
            code: None,
            name: name.into(),
            unit_price,
            quantity: Decimal::ONE,
            product: Some(product),
            labels: vec![USAGE_LABEL.to_string()],
        }
    }

    pub fn amount(&self) -> Decimal {
        self.unit_price * self.quantity
    }

    /// Whether this row is classified under `product`.
    ///
    /// Persisted rows report the product through their row code.
    pub fn is_product(&self, product: &ProductCode) -> bool {
        if self.product.as_ref() == Some(product) {
            return true;
        }
        self.code
            .as_deref()
            .is_some_and(|code| uncode(code) == product.as_str())
    }
}

/// Human-readable service period; also the textual fingerprint of the period.
pub fn service_description(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "Telephone services from {} to {}",
        format_period_date(start),
        format_period_date(end)
    )
}

/// Persisted order, as read back from the accounting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub code: Option<DocumentCode>,
    pub customer: CustomerRef,
    pub issue_date: NaiveDate,
    pub description: String,
    pub line_items: Vec<LineItem>,
    pub state: OrderState,
    pub locked: bool,
    /// Document total as computed by the accounting system.
    pub total: Decimal,
    #[serde(default)]
    pub external_ids: Vec<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl Order {
    pub fn customer_code(&self) -> Option<&CustomerCode> {
        self.customer.code()
    }

    pub fn is_prepared(&self) -> bool {
        self.state == OrderState::Prepared && !self.cancelled
    }

    /// Rows classified under `product`.
    pub fn usage_items<'a>(&'a self, product: &'a ProductCode) -> impl Iterator<Item = &'a LineItem> + 'a {
        self.line_items.iter().filter(move |item| item.is_product(product))
    }

    /// An order takes part in invoicing when it is prepared and carries usage.
    pub fn has_usage(&self, product: &ProductCode) -> bool {
        self.usage_items(product).next().is_some()
    }

    /// `prepared -> done`; the caller must have unlocked the document.
    pub fn mark_done(&mut self) -> DomainResult<()> {
        if self.locked {
            return Err(DomainError::Locked("cannot change state of a locked order".to_string()));
        }
        if self.state == OrderState::Done {
            return Err(DomainError::StateTransition("order is already done".to_string()));
        }
        self.state = OrderState::Done;
        Ok(())
    }
}

impl Fingerprinted for Order {
    fn description(&self) -> &str {
        &self.description
    }

    fn external_ids(&self) -> &[String] {
        &self.external_ids
    }
}

/// Order-building policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPolicy {
    /// Canonical product the usage row is classified under.
    pub product: ProductCode,
    /// Persist an order without rows for zero-priced usage.
    pub create_empty_orders: bool,
}

/// Order ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub key: DocumentKey,
    pub customer: CustomerRef,
    pub issue_date: NaiveDate,
    pub description: String,
    pub line_items: Vec<LineItem>,
}

impl OrderDraft {
    /// Draft for one usage record covering `period`.
    ///
    /// Returns `None` for zero-priced usage unless empty orders are enabled,
    /// in which case the draft carries no rows.
    pub fn from_usage(
        record: &UsageRecord,
        customer: CustomerRef,
        period: (NaiveDate, NaiveDate),
        issue_date: NaiveDate,
        policy: &OrderPolicy,
    ) -> DomainResult<Option<Self>> {
        let (start, end) = period;
        if end < start {
            return Err(DomainError::invalid_period(format!(
                "period end {end} precedes start {start}"
            )));
        }

        let customer_code = CustomerCode::decode(&record.customer_external_code)?;
        let description = service_description(start, end);

        let line_items = if record.is_zero_priced() {
            if !policy.create_empty_orders {
                return Ok(None);
            }
            Vec::new()
        } else {
            vec![LineItem::usage(
                description.clone(),
                record.price,
                policy.product.clone(),
            )]
        };

        Ok(Some(Self {
            key: DocumentKey::new(DocumentKind::Order, customer_code, start, end),
            customer,
            issue_date,
            description,
            line_items,
        }))
    }

    pub fn external_id(&self) -> String {
        self.key.external_id()
    }

    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(LineItem::amount).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }
}

/// Inline party for a customer the address book does not know.
pub fn inline_customer(record: &UsageRecord) -> DomainResult<PartyDraft> {
    let name = if record.customer_name.trim().is_empty() {
        record.customer_external_code.clone()
    } else {
        record.customer_name.clone()
    };

    let provider_id = record
        .ipex_customer_id
        .map(|id| id.to_string())
        .unwrap_or_default();
    let note = format!("Ipex: {} {}", provider_id, record.note).trim().to_string();

    PartyDraft::new(
        name,
        Address {
            street: record.street.clone(),
            city: record.city.clone(),
            zip_code: record.zip_code.clone(),
        },
        note,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn policy(create_empty_orders: bool) -> OrderPolicy {
        OrderPolicy {
            product: ProductCode::decode("IPEX_POSTPAID").unwrap(),
            create_empty_orders,
        }
    }

    fn usage(code: &str, price: Decimal) -> UsageRecord {
        UsageRecord {
            customer_external_code: code.to_string(),
            ipex_customer_id: Some(42),
            customer_name: "Acme s.r.o.".to_string(),
            price,
            period_start: None,
            period_end: None,
            note: "postpaid".to_string(),
            street: "Main 1".to_string(),
            city: "Praha".to_string(),
            zip_code: "11000".to_string(),
        }
    }

    fn existing(code: &str) -> CustomerRef {
        CustomerRef::existing(CustomerCode::decode(code).unwrap())
    }

    fn may() -> (NaiveDate, NaiveDate) {
        (date(2024, 5, 1), date(2024, 5, 31))
    }

    #[test]
    fn priced_usage_produces_a_single_labelled_row() {
        let draft = OrderDraft::from_usage(
            &usage("ACME", Decimal::new(12345, 2)),
            existing("ACME"),
            may(),
            date(2024, 6, 2),
            &policy(false),
        )
        .unwrap()
        .unwrap();

        assert_eq!(draft.line_items.len(), 1);
        let item = &draft.line_items[0];
        assert_eq!(item.unit_price, Decimal::new(12345, 2));
        assert_eq!(item.labels, vec![USAGE_LABEL.to_string()]);
        assert_eq!(item.name, draft.description);
        assert_eq!(draft.total(), Decimal::new(12345, 2));
        assert_eq!(
            draft.description,
            "Telephone services from 05. 01. 2024 to 05. 31. 2024"
        );
        assert_eq!(
            draft.external_id(),
            "voipbill:order:ACME:2024-05-01:2024-05-31"
        );
    }

    #[test]
    fn zero_price_without_empty_orders_yields_nothing() {
        let draft = OrderDraft::from_usage(
            &usage("ACME", Decimal::ZERO),
            existing("ACME"),
            may(),
            date(2024, 6, 2),
            &policy(false),
        )
        .unwrap();
        assert!(draft.is_none());
    }

    #[test]
    fn zero_price_with_empty_orders_yields_an_empty_shell() {
        let draft = OrderDraft::from_usage(
            &usage("ACME", Decimal::ZERO),
            existing("ACME"),
            may(),
            date(2024, 6, 2),
            &policy(true),
        )
        .unwrap()
        .unwrap();
        assert!(draft.is_empty());
        assert_eq!(draft.total(), Decimal::ZERO);
    }

    #[test]
    fn negative_price_is_passed_through() {
        let draft = OrderDraft::from_usage(
            &usage("ACME", Decimal::new(-500, 2)),
            existing("ACME"),
            may(),
            date(2024, 6, 2),
            &policy(false),
        )
        .unwrap()
        .unwrap();
        assert_eq!(draft.total(), Decimal::new(-500, 2));
    }

    #[test]
    fn undecodable_customer_code_is_rejected() {
        let err = OrderDraft::from_usage(
            &usage("   ", Decimal::ONE),
            existing("ACME"),
            may(),
            date(2024, 6, 2),
            &policy(false),
        )
        .unwrap_err();
        match err {
            DomainError::InvalidCode(msg) if msg.contains("empty code") => {}
            _ => panic!("Expected InvalidCode for blank customer code"),
        }
    }

    #[test]
    fn inverted_period_is_rejected() {
        let err = OrderDraft::from_usage(
            &usage("ACME", Decimal::ONE),
            existing("ACME"),
            (date(2024, 5, 31), date(2024, 5, 1)),
            date(2024, 6, 2),
            &policy(false),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPeriod(_)));
    }

    #[test]
    fn inline_customer_copies_name_address_and_provider_id() {
        let draft = inline_customer(&usage("NEW", Decimal::ONE)).unwrap();
        assert_eq!(draft.name, "Acme s.r.o.");
        assert_eq!(draft.address.city, "Praha");
        assert_eq!(draft.note, "Ipex: 42 postpaid");

        let mut nameless = usage("NEW", Decimal::ONE);
        nameless.customer_name.clear();
        assert_eq!(inline_customer(&nameless).unwrap().name, "NEW");
    }

    #[test]
    fn persisted_rows_match_product_by_row_code() {
        let product = ProductCode::decode("IPEX_POSTPAID").unwrap();
        let row = LineItem {
            id: Some(9),
            code: Some("code:IPEX_POSTPAID".to_string()),
            name: "x".to_string(),
            unit_price: Decimal::ONE,
            quantity: Decimal::ONE,
            product: None,
            labels: Vec::new(),
        };
        assert!(row.is_product(&product));

        let other = LineItem {
            code: Some("SHIPPING".to_string()),
            ..row
        };
        assert!(!other.is_product(&product));
    }

    #[test]
    fn locked_or_done_orders_cannot_be_marked_done() {
        let mut order = Order {
            code: Some(DocumentCode::decode("OBP0001/2024").unwrap()),
            customer: existing("ACME"),
            issue_date: date(2024, 6, 2),
            description: service_description(may().0, may().1),
            line_items: Vec::new(),
            state: OrderState::Prepared,
            locked: true,
            total: Decimal::ZERO,
            external_ids: Vec::new(),
            cancelled: false,
        };

        let err = order.mark_done().unwrap_err();
        match err {
            DomainError::Locked(msg) if msg.contains("locked") => {}
            _ => panic!("Expected Locked for locked order"),
        }

        order.locked = false;
        order.mark_done().unwrap();
        assert_eq!(order.state, OrderState::Done);
        assert!(!order.is_prepared());
        assert!(matches!(order.mark_done(), Err(DomainError::StateTransition(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a draft's own description always matches its key's
        /// textual fingerprint, and its total equals the usage price.
        #[test]
        fn draft_description_is_its_own_fingerprint(
            start_day in 0i64..3_650,
            length in 0i64..62,
            cents in 1i64..10_000_000,
        ) {
            let start = date(2015, 1, 1) + chrono::Duration::days(start_day);
            let end = start + chrono::Duration::days(length);
            let price = Decimal::new(cents, 2);

            let draft = OrderDraft::from_usage(
                &usage("ACME", price),
                existing("ACME"),
                (start, end),
                end,
                &policy(false),
            ).unwrap().unwrap();

            prop_assert!(draft.key.matches_text(&draft.description));
            prop_assert_eq!(draft.total(), price);
        }
    }
}
