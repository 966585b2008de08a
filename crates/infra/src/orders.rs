//! Order pass: one draft order per usage record of the processed month.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use voipbill_audit::{AuditReporter, EntryId, Outcome, PassKind};
use voipbill_core::{CustomerCode, DocumentCode, DocumentKey, DocumentKind, RunId};
use voipbill_parties::CustomerRef;
use voipbill_sales::{OrderDraft, OrderPolicy, inline_customer};
use voipbill_usage::{PeriodWindow, UsageRecord};

use crate::calls_listing::{attachment_name, render_call_listing};
use crate::error::{InfraError, InfraResult};
use crate::guard::DuplicateGuard;
use crate::ports::{AccountingSystem, BillingKind, MailMessage, Mailer, PdfRenderer, UsageSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSettings {
    pub policy: OrderPolicy,
    /// Attach the call listing PDF to the created order.
    pub attach_call_log: bool,
    /// Mail the call listing PDF to the customer.
    pub mail_call_log: bool,
    pub textual_fallback: bool,
}

impl OrderSettings {
    fn wants_call_log(&self) -> bool {
        self.attach_call_log || self.mail_call_log
    }
}

/// Result of handling one usage record.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Created { code: DocumentCode, total: Decimal },
    /// An order for the same customer and period exists already.
    Duplicate { existing: Option<DocumentCode> },
    /// Nothing to persist (zero price, missing period).
    Skipped(String),
    /// The external code is not a usable accounting code.
    NotIpexCustomer(String),
    Failed(String),
}

pub struct OrderBuilder<A, U, M, P> {
    accounting: A,
    usage: U,
    mailer: M,
    pdf: P,
    settings: OrderSettings,
}

impl<A, U, M, P> OrderBuilder<A, U, M, P>
where
    A: AccountingSystem,
    U: UsageSource,
    M: Mailer,
    P: PdfRenderer,
{
    pub fn new(accounting: A, usage: U, mailer: M, pdf: P, settings: OrderSettings) -> Self {
        Self {
            accounting,
            usage,
            mailer,
            pdf,
            settings,
        }
    }

    /// Run the order pass for `window`.
    ///
    /// Fails only when the usage records cannot be fetched; per-record
    /// failures end up in the audit.
    pub fn process(&self, window: &PeriodWindow, today: NaiveDate, run_id: RunId) -> InfraResult<AuditReporter> {
        let mut audit = AuditReporter::new(PassKind::Orders, run_id);

        let records = self
            .usage
            .fetch_invoices(BillingKind::Postpaid, window.month_offset())?;
        let fetched = records.len();
        let filtered = window.filter(records);
        info!(
            fetched,
            kept = filtered.kept.len(),
            outside = filtered.outside,
            undated = filtered.undated.len(),
            "usage records fetched"
        );

        for record in &filtered.undated {
            audit.record_outcome(
                &record.customer_external_code,
                Outcome::Skipped,
                "usage record without period start",
            );
        }

        let count = filtered.kept.len();
        for (position, record) in filtered.kept.iter().enumerate() {
            debug!(position = position + 1, count, customer = %record.customer_external_code, "processing usage record");
            self.build(record, window, today, &mut audit);
        }

        Ok(audit)
    }

    /// Turn one usage record into a persisted order.
    ///
    /// Records exactly one outcome in `audit`.
    pub fn build(
        &self,
        record: &UsageRecord,
        window: &PeriodWindow,
        today: NaiveDate,
        audit: &mut AuditReporter,
    ) -> OrderOutcome {
        let raw = record.customer_external_code.as_str();

        let customer = match CustomerCode::decode(raw) {
            Ok(code) => code,
            Err(err) => {
                warn!(customer = raw, error = %err, "usage record without usable customer code");
                audit.record_outcome(raw, Outcome::NotIpexCustomer, err.to_string());
                return OrderOutcome::NotIpexCustomer(err.to_string());
            }
        };

        let Some(period) = window.record_period(record) else {
            audit.record_outcome(raw, Outcome::Skipped, "usage record without period start");
            return OrderOutcome::Skipped("missing period start".to_string());
        };

        if record.price.is_sign_negative() && !record.price.is_zero() {
            warn!(customer = raw, price = %record.price, "negative usage price passed through");
        }

        let key = DocumentKey::new(DocumentKind::Order, customer.clone(), period.0, period.1);
        let guard = DuplicateGuard::new(&self.accounting, self.settings.textual_fallback);
        match guard.find(&key) {
            Ok(Some(existing)) => {
                let id = audit.record_outcome(raw, Outcome::Duplicate, key.external_id());
                audit.record_document(id, existing.code.as_ref().map(|c| c.to_string()), None);
                return OrderOutcome::Duplicate {
                    existing: existing.code,
                };
            }
            Ok(None) => {}
            Err(err) => return self.failed(audit, raw, "duplicate check", err),
        }

        let customer_ref = match self.resolve_customer(&customer, record) {
            Ok(customer_ref) => customer_ref,
            Err(err) => return self.failed(audit, raw, "customer lookup", err),
        };

        let draft = match OrderDraft::from_usage(record, customer_ref, period, today, &self.settings.policy) {
            Ok(Some(draft)) => draft,
            Ok(None) => {
                debug!(customer = raw, "zero priced usage, no order");
                audit.record_outcome(raw, Outcome::Skipped, "zero price");
                return OrderOutcome::Skipped("zero price".to_string());
            }
            Err(err) => return self.failed(audit, raw, "order draft", err.into()),
        };

        let code = match self.accounting.create_order(&draft) {
            Ok(code) => code,
            Err(err) => return self.failed(audit, raw, "order creation", err),
        };

        let total = draft.total();
        info!(customer = raw, order = %code, amount = %total, name = %record.customer_name, "order created");

        let id = audit.record_outcome(raw, Outcome::Created, "");
        let url = self.accounting.document_url(DocumentKind::Order, &code);
        audit.record_document(id, Some(code.to_string()), Some(url));
        audit.record_amount(id, total);

        if self.settings.wants_call_log() {
            self.deliver_call_log(record, &draft, &code, today, audit, id);
        }

        OrderOutcome::Created { code, total }
    }

    fn failed(&self, audit: &mut AuditReporter, customer: &str, step: &str, err: InfraError) -> OrderOutcome {
        let detail = format!("{step}: {err}");
        audit.record_outcome(customer, Outcome::Failed, detail.clone());
        OrderOutcome::Failed(detail)
    }

    /// Attach by code when the address book knows the customer, inline otherwise.
    fn resolve_customer(&self, customer: &CustomerCode, record: &UsageRecord) -> InfraResult<CustomerRef> {
        if self.accounting.party_exists(customer)? {
            Ok(CustomerRef::existing(customer.clone()))
        } else {
            debug!(customer = %customer, "customer unknown to address book, inlining");
            Ok(CustomerRef::inline(inline_customer(record)?))
        }
    }

    fn deliver_call_log(
        &self,
        record: &UsageRecord,
        draft: &OrderDraft,
        code: &DocumentCode,
        today: NaiveDate,
        audit: &mut AuditReporter,
        id: EntryId,
    ) {
        let customer = record.customer_external_code.as_str();
        let Some(provider_id) = record.ipex_customer_id else {
            warn!(customer, "no provider customer id, call listing skipped");
            return;
        };

        let listing = match render_call_listing(&self.usage, &self.pdf, provider_id, 1, today) {
            Ok(listing) => listing,
            Err(err) => {
                warn!(customer, order = %code, error = %err, "call listing not rendered");
                if self.settings.attach_call_log {
                    audit.record_attachment(id, false);
                }
                return;
            }
        };
        let attachment = listing.attachment(attachment_name(&draft.description));

        if self.settings.attach_call_log {
            let attached = match self.accounting.attach(DocumentKind::Order, code, &attachment) {
                Ok(()) => true,
                Err(err) => {
                    warn!(customer, order = %code, error = %err, "call listing not attached");
                    false
                }
            };
            audit.record_attachment(id, attached);
        }

        if self.settings.mail_call_log {
            let recipient = match &draft.customer {
                CustomerRef::Existing { code: party } => match self.accounting.load_party(party) {
                    Ok(party) => party.notification_email().map(str::to_string),
                    Err(err) => {
                        warn!(customer, error = %err, "customer not loaded");
                        None
                    }
                },
                CustomerRef::Inline { .. } => None,
            };

            let Some(to) = recipient else {
                warn!(customer, "customer without email address, call listing not mailed");
                return;
            };

            let message = MailMessage {
                to,
                subject: format!("Listing {} for {}", draft.description, customer),
                body: format!("Calls listing {}", listing.range),
                attachments: vec![attachment],
            };
            let sent = match self.mailer.send(&message) {
                Ok(()) => true,
                Err(err) => {
                    warn!(customer, to = %message.to, error = %err, "call listing not mailed");
                    false
                }
            };
            audit.record_mail(id, sent);
        }
    }
}
