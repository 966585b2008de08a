//! Invoicing pass: consolidate each customer's prepared usage orders into
//! one invoice and move the consumed orders to `done`.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use voipbill_audit::{AuditReporter, EntryId, Outcome, PassKind};
use voipbill_core::{CustomerCode, DocumentCode, DocumentKind, RunId, uncode};
use voipbill_invoicing::{InvoicePolicy, SkipReason, compose, uninvoiced_amount};
use voipbill_parties::CustomerRef;
use voipbill_sales::{Order, OrderState};

use crate::calls_listing::{attachment_name, render_call_listing};
use crate::error::{InfraError, InfraResult};
use crate::guard::DuplicateGuard;
use crate::ports::{AccountingSystem, OrderQuery, PdfRenderer, UsageSource};

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSettings {
    pub policy: InvoicePolicy,
    /// Attach a freshly rendered call listing to the created invoice.
    pub attach_call_log: bool,
    pub textual_fallback: bool,
}

/// Mark-done result of one consumed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub order: DocumentCode,
    pub result: Result<(), String>,
}

/// Per-customer result of the invoicing pass.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    Created {
        code: DocumentCode,
        total: Decimal,
        completions: Vec<Completion>,
    },
    Skipped(SkipReason),
    Failed(String),
}

/// Keeps a locked order unlocked for the duration of a state change and
/// re-locks it on every exit path.
pub struct LockScope<'a, A: AccountingSystem + ?Sized> {
    accounting: &'a A,
    code: &'a DocumentCode,
    relock: bool,
}

impl<'a, A: AccountingSystem + ?Sized> LockScope<'a, A> {
    pub fn acquire(accounting: &'a A, code: &'a DocumentCode, locked: bool) -> InfraResult<Self> {
        if locked {
            accounting.unlock_order(code)?;
        }
        Ok(Self {
            accounting,
            code,
            relock: locked,
        })
    }
}

impl<A: AccountingSystem + ?Sized> Drop for LockScope<'_, A> {
    fn drop(&mut self) {
        if self.relock {
            if let Err(err) = self.accounting.lock_order(self.code) {
                warn!(order = %self.code, error = %err, "order not re-locked");
            }
        }
    }
}

/// Move one order to `done`, unlocking and re-locking around the change.
pub fn complete_order<A: AccountingSystem + ?Sized>(accounting: &A, order: &Order) -> InfraResult<()> {
    let code = order
        .code
        .as_ref()
        .ok_or_else(|| InfraError::not_found("order without code"))?;
    let _scope = LockScope::acquire(accounting, code, order.locked)?;
    accounting.set_order_state(code, OrderState::Done)
}

pub struct InvoiceAggregator<A, U, P> {
    accounting: A,
    usage: U,
    pdf: P,
    settings: InvoiceSettings,
}

/// Group key of an order: its customer code, or the inline name.
fn group_key(order: &Order) -> String {
    match &order.customer {
        CustomerRef::Existing { code } => code.to_string(),
        CustomerRef::Inline { draft } => draft.name.clone(),
    }
}

fn order_codes(orders: &[Order]) -> Vec<String> {
    orders
        .iter()
        .filter_map(|o| o.code.as_ref().map(|c| c.to_string()))
        .collect()
}

impl<A, U, P> InvoiceAggregator<A, U, P>
where
    A: AccountingSystem,
    U: UsageSource,
    P: PdfRenderer,
{
    pub fn new(accounting: A, usage: U, pdf: P, settings: InvoiceSettings) -> Self {
        Self {
            accounting,
            usage,
            pdf,
            settings,
        }
    }

    /// Run the invoicing pass over every prepared usage order.
    ///
    /// Fails only when the directory or the order list cannot be fetched.
    pub fn process(
        &self,
        today: NaiveDate,
        run_id: RunId,
    ) -> InfraResult<(AuditReporter, BTreeMap<String, InvoiceOutcome>)> {
        let mut audit = AuditReporter::new(PassKind::Invoices, run_id);

        let directory: HashMap<String, Option<u64>> = self
            .usage
            .fetch_customers()?
            .into_iter()
            .map(|c| (uncode(&c.external_code).to_string(), c.id))
            .collect();

        let product = &self.settings.policy.product;
        let mut groups: BTreeMap<String, Vec<Order>> = BTreeMap::new();
        for order in self.accounting.find_orders(&OrderQuery::default().prepared())? {
            if order.has_usage(product) {
                groups.entry(group_key(&order)).or_default().push(order);
            }
        }
        info!(customers = groups.len(), "prepared usage orders grouped");

        let outcomes = self.aggregate(groups, &directory, today, &mut audit);
        Ok((audit, outcomes))
    }

    /// Decide and create invoices per customer group.
    ///
    /// Records exactly one outcome per group.
    pub fn aggregate(
        &self,
        groups: BTreeMap<String, Vec<Order>>,
        directory: &HashMap<String, Option<u64>>,
        today: NaiveDate,
        audit: &mut AuditReporter,
    ) -> BTreeMap<String, InvoiceOutcome> {
        let mut outcomes = BTreeMap::new();
        for (customer, orders) in groups {
            let outcome = self.invoice_customer(&customer, &orders, directory, today, audit);
            outcomes.insert(customer, outcome);
        }
        outcomes
    }

    fn skip(
        &self,
        audit: &mut AuditReporter,
        customer: &str,
        orders: &[Order],
        reason: SkipReason,
        detail: String,
    ) -> InvoiceOutcome {
        let outcome = match reason {
            SkipReason::NoCustomer => Outcome::NoCustomer,
            SkipReason::NotIpexCustomer => Outcome::NotIpexCustomer,
            SkipReason::SkipList => Outcome::SkipList,
            SkipReason::BelowLimit => Outcome::BelowLimit,
            SkipReason::Duplicate => Outcome::Duplicate,
        };
        let id = audit.record_outcome(customer, outcome, detail);
        audit.record_orders(id, order_codes(orders));
        audit.record_amount(id, uninvoiced_amount(orders));
        InvoiceOutcome::Skipped(reason)
    }

    fn failed(&self, audit: &mut AuditReporter, customer: &str, orders: &[Order], step: &str, err: InfraError) -> InvoiceOutcome {
        let detail = format!("{step}: {err}");
        let id = audit.record_outcome(customer, Outcome::Failed, detail.clone());
        audit.record_orders(id, order_codes(orders));
        InvoiceOutcome::Failed(detail)
    }

    fn invoice_customer(
        &self,
        raw: &str,
        orders: &[Order],
        directory: &HashMap<String, Option<u64>>,
        today: NaiveDate,
        audit: &mut AuditReporter,
    ) -> InvoiceOutcome {
        let Some(provider_id) = directory.get(uncode(raw)).copied() else {
            warn!(customer = raw, "customer unknown to billing provider");
            return self.skip(audit, raw, orders, SkipReason::NoCustomer, String::new());
        };

        let customer = match CustomerCode::decode(raw) {
            Ok(code) if orders.iter().all(|o| o.customer_code() == Some(&code)) => code,
            Ok(_) => {
                return self.skip(
                    audit,
                    raw,
                    orders,
                    SkipReason::NotIpexCustomer,
                    "orders without address book customer".to_string(),
                );
            }
            Err(err) => {
                return self.skip(audit, raw, orders, SkipReason::NotIpexCustomer, err.to_string());
            }
        };

        let amount = uninvoiced_amount(orders);
        if let Err(reason) = self.settings.policy.gate(&customer, amount) {
            let detail = match reason {
                SkipReason::BelowLimit => format!("{amount} <= {}", self.settings.policy.limit),
                _ => String::new(),
            };
            info!(customer = raw, %amount, reason = %reason, "not invoiced");
            return self.skip(audit, raw, orders, reason, detail);
        }

        let composition = match compose(&customer, orders, &self.settings.policy.product) {
            Ok(composition) => composition,
            Err(err) => return self.failed(audit, raw, orders, "invoice composition", err.into()),
        };
        let draft = composition.draft;

        let guard = DuplicateGuard::new(&self.accounting, self.settings.textual_fallback);
        match guard.find(&draft.key) {
            Ok(Some(existing)) => {
                let detail = existing.code.map(|c| c.to_string()).unwrap_or_default();
                return self.skip(audit, raw, orders, SkipReason::Duplicate, detail);
            }
            Ok(None) => {}
            Err(err) => return self.failed(audit, raw, orders, "duplicate check", err),
        }

        let code = match self.accounting.create_invoice(&draft) {
            Ok(code) => code,
            Err(err) => return self.failed(audit, raw, orders, "invoice creation", err),
        };

        let total = draft.total();
        info!(customer = raw, invoice = %code, amount = %total, orders = orders.len(), "invoice created");

        let id = audit.record_outcome(raw, Outcome::Created, draft.description.clone());
        let url = self.accounting.document_url(DocumentKind::Invoice, &code);
        audit.record_document(id, Some(code.to_string()), Some(url));
        audit.record_amount(id, total);
        audit.record_orders(id, order_codes(orders));

        if self.settings.attach_call_log {
            self.attach_call_log(raw, provider_id, &code, &draft.description, orders.len(), today, audit, id);
        }

        let queued = self.accounting.queue_invoice_mail(&code);
        match &queued {
            Ok(()) => info!(customer = raw, invoice = %code, "invoice queued for mailing"),
            Err(err) => warn!(customer = raw, invoice = %code, error = %err, "invoice not queued for mailing"),
        }
        audit.record_mail(id, queued.is_ok());

        let mut completions = Vec::with_capacity(orders.len());
        for order in orders {
            let Some(order_code) = order.code.clone() else {
                continue;
            };
            let result = complete_order(&self.accounting, order).map_err(|e| e.to_string());
            match &result {
                Ok(()) => info!(customer = raw, order = %order_code, "order marked as done"),
                Err(err) => warn!(customer = raw, order = %order_code, error = %err, "order not marked as done"),
            }
            audit.record_completion(
                id,
                order_code.as_str(),
                result.is_ok(),
                result.as_ref().err().cloned().unwrap_or_default(),
            );
            completions.push(Completion {
                order: order_code,
                result,
            });
        }

        InvoiceOutcome::Created {
            code,
            total,
            completions,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_call_log(
        &self,
        customer: &str,
        provider_id: Option<u64>,
        invoice: &DocumentCode,
        description: &str,
        months: usize,
        today: NaiveDate,
        audit: &mut AuditReporter,
        id: EntryId,
    ) {
        let Some(provider_id) = provider_id else {
            warn!(customer, "no provider customer id, call listing skipped");
            return;
        };
        let months = u32::try_from(months).unwrap_or(u32::MAX);

        let attached = render_call_listing(&self.usage, &self.pdf, provider_id, months, today)
            .and_then(|listing| {
                let attachment = listing.attachment(attachment_name(description));
                self.accounting.attach(DocumentKind::Invoice, invoice, &attachment)
            });

        if let Err(err) = &attached {
            warn!(customer, invoice = %invoice, error = %err, "call listing not attached");
        }
        audit.record_attachment(id, attached.is_ok());
    }
}
