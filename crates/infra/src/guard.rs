//! Idempotency gate in front of document creation.
//!
//! Documents created by this tool carry a structured external id. Documents
//! created before that (or by hand) only carry the period in their description,
//! so the textual fingerprint is kept as an optional fallback. The fallback
//! misses documents whose description uses another date format.

use chrono::NaiveDate;
use tracing::debug;

use voipbill_core::{CustomerCode, DocumentCode, DocumentKey, DocumentKind, Fingerprinted};

use crate::error::InfraResult;
use crate::ports::{AccountingSystem, InvoiceQuery, OrderQuery};

/// How an existing document was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    ExternalId,
    Description,
}

/// Document already covering a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingDocument {
    pub code: Option<DocumentCode>,
    pub matched_by: MatchedBy,
}

pub struct DuplicateGuard<'a, A: ?Sized> {
    accounting: &'a A,
    textual_fallback: bool,
}

impl<'a, A: AccountingSystem + ?Sized> DuplicateGuard<'a, A> {
    pub fn new(accounting: &'a A, textual_fallback: bool) -> Self {
        Self {
            accounting,
            textual_fallback,
        }
    }

    fn matched_by<D: Fingerprinted>(&self, document: &D, key: &DocumentKey) -> Option<MatchedBy> {
        if document.has_external_id(key) {
            Some(MatchedBy::ExternalId)
        } else if self.textual_fallback && key.matches_text(document.description()) {
            Some(MatchedBy::Description)
        } else {
            None
        }
    }

    /// Existing order or invoice for `key`.
    ///
    /// Documents carrying the external id are looked up first, without a
    /// customer filter, so orders written for a customer missing from the
    /// address book are found too. The textual fallback then scans the
    /// customer's non-cancelled documents issued on or after the period start.
    pub fn find(&self, key: &DocumentKey) -> InfraResult<Option<ExistingDocument>> {
        let found = match key.kind {
            DocumentKind::Order => {
                let mut candidates = self.accounting.find_orders(&OrderQuery::by_external_id(key.external_id()))?;
                if candidates.is_empty() && self.textual_fallback {
                    let query = OrderQuery::for_customer(key.customer.clone()).issued_from(key.period_start);
                    candidates = self.accounting.find_orders(&query)?;
                }
                candidates
                    .into_iter()
                    .find_map(|o| {
                        self.matched_by(&o, key).map(|matched_by| ExistingDocument {
                            code: o.code.clone(),
                            matched_by,
                        })
                    })
            }
            DocumentKind::Invoice => {
                let mut candidates =
                    self.accounting.find_invoices(&InvoiceQuery::by_external_id(key.external_id()))?;
                if candidates.is_empty() && self.textual_fallback {
                    let query = InvoiceQuery::for_customer(key.customer.clone()).issued_from(key.period_start);
                    candidates = self.accounting.find_invoices(&query)?;
                }
                candidates
                    .into_iter()
                    .find_map(|i| {
                        self.matched_by(&i, key).map(|matched_by| ExistingDocument {
                            code: i.code.clone(),
                            matched_by,
                        })
                    })
            }
        };

        if let Some(existing) = &found {
            debug!(
                key = %key.external_id(),
                document = ?existing.code,
                matched_by = ?existing.matched_by,
                "document already exists"
            );
        }
        Ok(found)
    }

    pub fn order_exists(&self, customer: &CustomerCode, start: NaiveDate, end: NaiveDate) -> InfraResult<bool> {
        let key = DocumentKey::new(DocumentKind::Order, customer.clone(), start, end);
        Ok(self.find(&key)?.is_some())
    }

    pub fn invoice_exists(&self, customer: &CustomerCode, start: NaiveDate, end: NaiveDate) -> InfraResult<bool> {
        let key = DocumentKey::new(DocumentKind::Invoice, customer.clone(), start, end);
        Ok(self.find(&key)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use voipbill_parties::CustomerRef;
    use voipbill_sales::{Order, OrderState, service_description};

    use crate::error::InfraError;
    use crate::in_memory::InMemoryAccounting;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn acme() -> CustomerCode {
        CustomerCode::decode("ACME").unwrap()
    }

    fn legacy_order(description: String, issued: NaiveDate) -> Order {
        Order {
            code: Some(DocumentCode::decode("OBP9000").unwrap()),
            customer: CustomerRef::existing(acme()),
            issue_date: issued,
            description,
            line_items: Vec::new(),
            state: OrderState::Done,
            locked: true,
            total: Decimal::ZERO,
            external_ids: Vec::new(),
            cancelled: false,
        }
    }

    #[test]
    fn empty_candidate_set_is_not_a_match() {
        let accounting = InMemoryAccounting::new();
        let guard = DuplicateGuard::new(&accounting, true);
        assert!(!guard.order_exists(&acme(), date(2024, 5, 1), date(2024, 5, 31)).unwrap());
    }

    #[test]
    fn structured_key_matches_without_fallback() {
        let accounting = InMemoryAccounting::new();
        let mut order = legacy_order("anything".into(), date(2024, 6, 2));
        order.external_ids = vec!["voipbill:order:ACME:2024-05-01:2024-05-31".into()];
        accounting.insert_order(order);

        let guard = DuplicateGuard::new(&accounting, false);
        let key = DocumentKey::new(DocumentKind::Order, acme(), date(2024, 5, 1), date(2024, 5, 31));
        let found = guard.find(&key).unwrap().unwrap();
        assert_eq!(found.matched_by, MatchedBy::ExternalId);
    }

    #[test]
    fn structured_key_finds_orders_without_address_book_customer() {
        let accounting = InMemoryAccounting::new();
        let mut order = legacy_order("anything".into(), date(2024, 6, 2));
        order.customer = CustomerRef::inline(
            voipbill_parties::PartyDraft::new("New Co", voipbill_parties::Address::default(), "").unwrap(),
        );
        order.external_ids = vec!["voipbill:order:NEWCO:2024-05-01:2024-05-31".into()];
        accounting.insert_order(order);

        let guard = DuplicateGuard::new(&accounting, true);
        let newco = CustomerCode::decode("NEWCO").unwrap();
        assert!(guard.order_exists(&newco, date(2024, 5, 1), date(2024, 5, 31)).unwrap());
        assert!(!guard.order_exists(&newco, date(2024, 4, 1), date(2024, 4, 30)).unwrap());
    }

    #[test]
    fn description_fallback_is_optional() {
        let accounting = InMemoryAccounting::new();
        accounting.insert_order(legacy_order(
            service_description(date(2024, 5, 1), date(2024, 5, 31)),
            date(2024, 6, 2),
        ));

        let strict = DuplicateGuard::new(&accounting, false);
        assert!(!strict.order_exists(&acme(), date(2024, 5, 1), date(2024, 5, 31)).unwrap());

        let lenient = DuplicateGuard::new(&accounting, true);
        assert!(lenient.order_exists(&acme(), date(2024, 5, 1), date(2024, 5, 31)).unwrap());
        assert!(!lenient.order_exists(&acme(), date(2024, 4, 1), date(2024, 4, 30)).unwrap());
    }

    #[test]
    fn cancelled_and_earlier_documents_are_not_candidates() {
        let accounting = InMemoryAccounting::new();
        let mut cancelled = legacy_order(
            service_description(date(2024, 5, 1), date(2024, 5, 31)),
            date(2024, 6, 2),
        );
        cancelled.cancelled = true;
        accounting.insert_order(cancelled);
        accounting.insert_order(legacy_order(
            service_description(date(2024, 5, 1), date(2024, 5, 31)),
            date(2024, 4, 20),
        ));

        let guard = DuplicateGuard::new(&accounting, true);
        assert!(!guard.order_exists(&acme(), date(2024, 5, 1), date(2024, 5, 31)).unwrap());
    }

    #[test]
    fn transport_failure_is_an_error_not_an_empty_result() {
        let accounting = InMemoryAccounting::new();
        accounting.fail_queries(true);

        let guard = DuplicateGuard::new(&accounting, true);
        let err = guard
            .invoice_exists(&acme(), date(2024, 5, 1), date(2024, 5, 31))
            .unwrap_err();
        match err {
            InfraError::Transport(msg) if msg.contains("unreachable") => {}
            other => panic!("Expected Transport error, got {other:?}"),
        }
    }
}
