//! In-memory collaborators with failure injection.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use chrono::NaiveDate;

use voipbill_core::{CustomerCode, DocumentCode, DocumentKind};
use voipbill_invoicing::{Invoice, InvoiceDraft};
use voipbill_parties::Party;
use voipbill_sales::{Order, OrderDraft, OrderState};
use voipbill_usage::{CallDetail, ProviderCustomer, UsageRecord};

use crate::error::{InfraError, InfraResult};
use crate::ports::{
    AccountingSystem, Attachment, BillingKind, InvoiceQuery, MailMessage, Mailer, OrderQuery,
    PdfRenderer, UsageSource,
};

fn poisoned() -> InfraError {
    InfraError::transport("lock poisoned")
}

#[derive(Debug, Default)]
struct AccountingState {
    orders: Vec<Order>,
    invoices: Vec<Invoice>,
    parties: BTreeMap<CustomerCode, Party>,
    attachments: Vec<(DocumentKind, DocumentCode, Attachment)>,
    operations: Vec<String>,
    next_order: u64,
    next_invoice: u64,
    fail_queries: bool,
    fail_invoice_creation: bool,
    fail_mail_queue: bool,
    fail_order_creation: HashSet<CustomerCode>,
    fail_state_change: HashSet<DocumentCode>,
}

/// Accounting system kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAccounting {
    state: RwLock<AccountingState>,
}

impl InMemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_party(self, party: Party) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.parties.insert(party.code.clone(), party);
        }
        self
    }

    pub fn insert_order(&self, order: Order) {
        if let Ok(mut state) = self.state.write() {
            state.orders.push(order);
        }
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        if let Ok(mut state) = self.state.write() {
            state.invoices.push(invoice);
        }
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.read().map(|s| s.orders.clone()).unwrap_or_default()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.state.read().map(|s| s.invoices.clone()).unwrap_or_default()
    }

    pub fn order(&self, code: &DocumentCode) -> Option<Order> {
        self.orders().into_iter().find(|o| o.code.as_ref() == Some(code))
    }

    pub fn attachments(&self) -> Vec<(DocumentKind, DocumentCode, Attachment)> {
        self.state.read().map(|s| s.attachments.clone()).unwrap_or_default()
    }

    /// Mutating calls in the order they were made (`unlock OBP1`, `state OBP1 done`...).
    pub fn operations(&self) -> Vec<String> {
        self.state.read().map(|s| s.operations.clone()).unwrap_or_default()
    }

    /// Make every document query fail with a transport error.
    pub fn fail_queries(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_queries = fail;
        }
    }

    pub fn fail_invoice_creation(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_invoice_creation = fail;
        }
    }

    pub fn fail_mail_queue(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_mail_queue = fail;
        }
    }

    pub fn fail_order_creation_for(&self, customer: CustomerCode) {
        if let Ok(mut state) = self.state.write() {
            state.fail_order_creation.insert(customer);
        }
    }

    pub fn fail_state_change_for(&self, code: DocumentCode) {
        if let Ok(mut state) = self.state.write() {
            state.fail_state_change.insert(code);
        }
    }

    fn with_order<R>(
        &self,
        code: &DocumentCode,
        f: impl FnOnce(&mut Order, &mut Vec<String>) -> InfraResult<R>,
    ) -> InfraResult<R> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let AccountingState { orders, operations, .. } = &mut *state;
        let order = orders
            .iter_mut()
            .find(|o| o.code.as_ref() == Some(code))
            .ok_or_else(|| InfraError::not_found(format!("order {code}")))?;
        f(order, operations)
    }
}

impl AccountingSystem for InMemoryAccounting {
    fn find_orders(&self, query: &OrderQuery) -> InfraResult<Vec<Order>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.fail_queries {
            return Err(InfraError::transport("accounting system unreachable"));
        }
        let mut found: Vec<Order> = state.orders.iter().filter(|o| query.matches(o)).cloned().collect();
        found.sort_by_key(|o| o.issue_date);
        Ok(found)
    }

    fn find_invoices(&self, query: &InvoiceQuery) -> InfraResult<Vec<Invoice>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.fail_queries {
            return Err(InfraError::transport("accounting system unreachable"));
        }
        Ok(state.invoices.iter().filter(|i| query.matches(i)).cloned().collect())
    }

    fn last_order_date(&self) -> InfraResult<Option<NaiveDate>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.fail_queries {
            return Err(InfraError::transport("accounting system unreachable"));
        }
        Ok(state
            .orders
            .iter()
            .filter(|o| !o.cancelled)
            .map(|o| o.issue_date)
            .max())
    }

    fn create_order(&self, draft: &OrderDraft) -> InfraResult<DocumentCode> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.fail_order_creation.contains(&draft.key.customer) {
            return Err(InfraError::Status {
                status: 400,
                body: format!("order for {} refused", draft.key.customer),
            });
        }

        state.next_order += 1;
        let code = DocumentCode::decode(&format!("OBP{:04}", state.next_order))?;
        let order = Order {
            code: Some(code.clone()),
            customer: draft.customer.clone(),
            issue_date: draft.issue_date,
            description: draft.description.clone(),
            line_items: draft.line_items.clone(),
            state: OrderState::Prepared,
            locked: false,
            total: draft.total(),
            external_ids: vec![draft.external_id()],
            cancelled: false,
        };
        state.orders.push(order);
        state.operations.push(format!("create order {code}"));
        Ok(code)
    }

    fn create_invoice(&self, draft: &InvoiceDraft) -> InfraResult<DocumentCode> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.fail_invoice_creation {
            return Err(InfraError::Status {
                status: 500,
                body: "invoice refused".to_string(),
            });
        }

        state.next_invoice += 1;
        let code = DocumentCode::decode(&format!("VF{:04}", state.next_invoice))?;
        let invoice = Invoice {
            code: Some(code.clone()),
            customer: draft.customer.clone(),
            issue_date: draft.taxable_date,
            description: draft.description.clone(),
            line_items: draft.line_items.clone(),
            total: draft.total(),
            external_ids: vec![draft.external_id()],
            cancelled: false,
        };
        state.invoices.push(invoice);
        state.operations.push(format!("create invoice {code}"));
        Ok(code)
    }

    fn queue_invoice_mail(&self, code: &DocumentCode) -> InfraResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.fail_mail_queue {
            return Err(InfraError::rejected(format!("invoice {code} cannot be mailed")));
        }
        if !state.invoices.iter().any(|i| i.code.as_ref() == Some(code)) {
            return Err(InfraError::not_found(format!("invoice {code}")));
        }
        state.operations.push(format!("queue mail {code}"));
        Ok(())
    }

    fn set_order_state(&self, code: &DocumentCode, new_state: OrderState) -> InfraResult<()> {
        let fail = self
            .state
            .read()
            .map_err(|_| poisoned())?
            .fail_state_change
            .contains(code);

        self.with_order(code, |order, operations| {
            if fail {
                return Err(InfraError::Status {
                    status: 500,
                    body: format!("cannot update {code}"),
                });
            }
            if order.locked {
                return Err(InfraError::rejected(format!("order {code} is locked")));
            }
            order.state = new_state;
            operations.push(format!("state {code} {}", new_state.as_str()));
            Ok(())
        })
    }

    fn lock_order(&self, code: &DocumentCode) -> InfraResult<()> {
        self.with_order(code, |order, operations| {
            order.locked = true;
            operations.push(format!("lock {code}"));
            Ok(())
        })
    }

    fn unlock_order(&self, code: &DocumentCode) -> InfraResult<()> {
        self.with_order(code, |order, operations| {
            order.locked = false;
            operations.push(format!("unlock {code}"));
            Ok(())
        })
    }

    fn party_exists(&self, code: &CustomerCode) -> InfraResult<bool> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.parties.contains_key(code))
    }

    fn load_party(&self, code: &CustomerCode) -> InfraResult<Party> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .parties
            .get(code)
            .cloned()
            .ok_or_else(|| InfraError::not_found(format!("party {code}")))
    }

    fn attach(&self, kind: DocumentKind, code: &DocumentCode, attachment: &Attachment) -> InfraResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.attachments.push((kind, code.clone(), attachment.clone()));
        Ok(())
    }

    fn document_url(&self, kind: DocumentKind, code: &DocumentCode) -> String {
        format!("memory://{kind}/{code}")
    }
}

/// Billing provider kept in process memory.
///
/// Returns every stored record regardless of the requested offset, like a
/// provider that over-fetches.
#[derive(Debug, Default)]
pub struct InMemoryUsageSource {
    postpaid: Vec<UsageRecord>,
    prepaid: Vec<UsageRecord>,
    customers: Vec<ProviderCustomer>,
    calls: HashMap<u64, Vec<CallDetail>>,
    fail_invoices: bool,
    requests: RwLock<Vec<(BillingKind, i32)>>,
}

impl InMemoryUsageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, kind: BillingKind, record: UsageRecord) -> Self {
        match kind {
            BillingKind::Postpaid => self.postpaid.push(record),
            BillingKind::Prepaid => self.prepaid.push(record),
        }
        self
    }

    pub fn with_customer(mut self, customer: ProviderCustomer) -> Self {
        self.customers.push(customer);
        self
    }

    pub fn with_calls(mut self, customer_id: u64, calls: Vec<CallDetail>) -> Self {
        self.calls.insert(customer_id, calls);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_invoices = true;
        self
    }

    /// `(kind, month offset)` of every invoice fetch.
    pub fn requests(&self) -> Vec<(BillingKind, i32)> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl UsageSource for InMemoryUsageSource {
    fn fetch_invoices(&self, kind: BillingKind, month_offset: i32) -> InfraResult<Vec<UsageRecord>> {
        if let Ok(mut requests) = self.requests.write() {
            requests.push((kind, month_offset));
        }
        if self.fail_invoices {
            return Err(InfraError::Status {
                status: 503,
                body: "billing provider unavailable".to_string(),
            });
        }
        Ok(match kind {
            BillingKind::Postpaid => self.postpaid.clone(),
            BillingKind::Prepaid => self.prepaid.clone(),
        })
    }

    fn fetch_customers(&self) -> InfraResult<Vec<ProviderCustomer>> {
        Ok(self.customers.clone())
    }

    fn fetch_call_detail(&self, _since: NaiveDate, customer_id: u64) -> InfraResult<Vec<CallDetail>> {
        Ok(self.calls.get(&customer_id).cloned().unwrap_or_default())
    }
}

/// Mailer that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: RwLock<Vec<MailMessage>>,
    reject: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse delivery to `recipient`.
    pub fn rejecting(mut self, recipient: impl Into<String>) -> Self {
        self.reject.insert(recipient.into());
        self
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &MailMessage) -> InfraResult<()> {
        if self.reject.contains(&message.to) {
            return Err(InfraError::Mail(format!("{} rejected", message.to)));
        }
        self.sent.write().map_err(|_| poisoned())?.push(message.clone());
        Ok(())
    }
}

/// Renderer returning fixed bytes; counts renders.
#[derive(Debug)]
pub struct StaticPdfRenderer {
    bytes: Vec<u8>,
    renders: RwLock<Vec<String>>,
}

impl Default for StaticPdfRenderer {
    fn default() -> Self {
        Self {
            bytes: b"%PDF-1.4 listing".to_vec(),
            renders: RwLock::new(Vec::new()),
        }
    }
}

impl StaticPdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_count(&self) -> usize {
        self.renders.read().map(|r| r.len()).unwrap_or(0)
    }

    /// HTML of every render, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.renders.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl PdfRenderer for StaticPdfRenderer {
    fn render(&self, html: &str) -> InfraResult<Vec<u8>> {
        self.renders.write().map_err(|_| poisoned())?.push(html.to_string());
        Ok(self.bytes.clone())
    }
}
