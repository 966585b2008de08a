//! Collaborator contracts.
//!
//! Every call is synchronous and blocking; a run is one sequential batch.
//! Query methods return `Err` on transport failure, never a silent empty set.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use voipbill_core::{CustomerCode, DocumentCode, DocumentKind};
use voipbill_invoicing::{Invoice, InvoiceDraft};
use voipbill_parties::Party;
use voipbill_sales::{Order, OrderDraft, OrderState};
use voipbill_usage::{CallDetail, ProviderCustomer, UsageRecord};

use crate::error::InfraResult;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Billing-provider invoice section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingKind {
    Postpaid,
    Prepaid,
}

impl BillingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingKind::Postpaid => "postpaid",
            BillingKind::Prepaid => "prepaid",
        }
    }
}

/// Order lookup; cancelled orders are never returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub customer: Option<CustomerCode>,
    /// Inclusive lower bound on the issue date.
    pub issued_from: Option<NaiveDate>,
    /// Inclusive upper bound on the issue date.
    pub issued_to: Option<NaiveDate>,
    pub state: Option<OrderState>,
    /// Structured idempotency key the order must carry.
    pub external_id: Option<String>,
}

impl OrderQuery {
    pub fn for_customer(customer: CustomerCode) -> Self {
        Self {
            customer: Some(customer),
            ..Self::default()
        }
    }

    /// Orders carrying `external_id`, whoever the customer is.
    pub fn by_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }

    pub fn issued_from(mut self, date: NaiveDate) -> Self {
        self.issued_from = Some(date);
        self
    }

    pub fn prepared(mut self) -> Self {
        self.state = Some(OrderState::Prepared);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        !order.cancelled
            && self
                .customer
                .as_ref()
                .is_none_or(|c| order.customer_code() == Some(c))
            && self.issued_from.is_none_or(|d| order.issue_date >= d)
            && self.issued_to.is_none_or(|d| order.issue_date <= d)
            && self.state.is_none_or(|s| order.state == s)
            && self
                .external_id
                .as_ref()
                .is_none_or(|id| order.external_ids.iter().any(|e| e == id))
    }
}

/// Invoice lookup; cancelled invoices are never returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    pub customer: Option<CustomerCode>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
    pub external_id: Option<String>,
}

impl InvoiceQuery {
    pub fn for_customer(customer: CustomerCode) -> Self {
        Self {
            customer: Some(customer),
            ..Self::default()
        }
    }

    pub fn by_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }

    pub fn issued_from(mut self, date: NaiveDate) -> Self {
        self.issued_from = Some(date);
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        !invoice.cancelled
            && self.customer.as_ref().is_none_or(|c| invoice.customer == *c)
            && self.issued_from.is_none_or(|d| invoice.issue_date >= d)
            && self.issued_to.is_none_or(|d| invoice.issue_date <= d)
            && self
                .external_id
                .as_ref()
                .is_none_or(|id| invoice.external_ids.iter().any(|e| e == id))
    }
}

/// File attached to a document or a mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn pdf(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Accounting system (documents, address book, attachments).
pub trait AccountingSystem {
    /// Matching orders, ascending by issue date.
    fn find_orders(&self, query: &OrderQuery) -> InfraResult<Vec<Order>>;

    fn find_invoices(&self, query: &InvoiceQuery) -> InfraResult<Vec<Invoice>>;

    /// Issue date of the most recent non-cancelled order of the configured type.
    fn last_order_date(&self) -> InfraResult<Option<NaiveDate>>;

    /// Persist an order; returns the code the accounting system assigned.
    fn create_order(&self, draft: &OrderDraft) -> InfraResult<DocumentCode>;

    fn create_invoice(&self, draft: &InvoiceDraft) -> InfraResult<DocumentCode>;

    /// Hand a created invoice to the accounting system's own mail delivery.
    fn queue_invoice_mail(&self, code: &DocumentCode) -> InfraResult<()>;

    fn set_order_state(&self, code: &DocumentCode, state: OrderState) -> InfraResult<()>;

    fn lock_order(&self, code: &DocumentCode) -> InfraResult<()>;

    fn unlock_order(&self, code: &DocumentCode) -> InfraResult<()>;

    fn party_exists(&self, code: &CustomerCode) -> InfraResult<bool>;

    /// `NotFound` when the address book has no such party.
    fn load_party(&self, code: &CustomerCode) -> InfraResult<Party>;

    fn attach(&self, kind: DocumentKind, code: &DocumentCode, attachment: &Attachment) -> InfraResult<()>;

    /// Link to the document in the accounting system's UI.
    fn document_url(&self, kind: DocumentKind, code: &DocumentCode) -> String;
}

/// Billing provider.
pub trait UsageSource {
    fn fetch_invoices(&self, kind: BillingKind, month_offset: i32) -> InfraResult<Vec<UsageRecord>>;

    fn fetch_customers(&self) -> InfraResult<Vec<ProviderCustomer>>;

    /// Calls of one provider customer from `since` until now.
    fn fetch_call_detail(&self, since: NaiveDate, customer_id: u64) -> InfraResult<Vec<CallDetail>>;
}

pub trait Mailer {
    fn send(&self, message: &MailMessage) -> InfraResult<()>;
}

/// HTML to PDF.
pub trait PdfRenderer {
    fn render(&self, html: &str) -> InfraResult<Vec<u8>>;
}

macro_rules! forward_accounting {
    ($wrapper:ty) => {
        impl<T: AccountingSystem + ?Sized> AccountingSystem for $wrapper {
            fn find_orders(&self, query: &OrderQuery) -> InfraResult<Vec<Order>> {
                (**self).find_orders(query)
            }
            fn find_invoices(&self, query: &InvoiceQuery) -> InfraResult<Vec<Invoice>> {
                (**self).find_invoices(query)
            }
            fn last_order_date(&self) -> InfraResult<Option<NaiveDate>> {
                (**self).last_order_date()
            }
            fn create_order(&self, draft: &OrderDraft) -> InfraResult<DocumentCode> {
                (**self).create_order(draft)
            }
            fn create_invoice(&self, draft: &InvoiceDraft) -> InfraResult<DocumentCode> {
                (**self).create_invoice(draft)
            }
            fn queue_invoice_mail(&self, code: &DocumentCode) -> InfraResult<()> {
                (**self).queue_invoice_mail(code)
            }
            fn set_order_state(&self, code: &DocumentCode, state: OrderState) -> InfraResult<()> {
                (**self).set_order_state(code, state)
            }
            fn lock_order(&self, code: &DocumentCode) -> InfraResult<()> {
                (**self).lock_order(code)
            }
            fn unlock_order(&self, code: &DocumentCode) -> InfraResult<()> {
                (**self).unlock_order(code)
            }
            fn party_exists(&self, code: &CustomerCode) -> InfraResult<bool> {
                (**self).party_exists(code)
            }
            fn load_party(&self, code: &CustomerCode) -> InfraResult<Party> {
                (**self).load_party(code)
            }
            fn attach(&self, kind: DocumentKind, code: &DocumentCode, attachment: &Attachment) -> InfraResult<()> {
                (**self).attach(kind, code, attachment)
            }
            fn document_url(&self, kind: DocumentKind, code: &DocumentCode) -> String {
                (**self).document_url(kind, code)
            }
        }
    };
}

forward_accounting!(&T);
forward_accounting!(Arc<T>);

impl<T: UsageSource + ?Sized> UsageSource for &T {
    fn fetch_invoices(&self, kind: BillingKind, month_offset: i32) -> InfraResult<Vec<UsageRecord>> {
        (**self).fetch_invoices(kind, month_offset)
    }
    fn fetch_customers(&self) -> InfraResult<Vec<ProviderCustomer>> {
        (**self).fetch_customers()
    }
    fn fetch_call_detail(&self, since: NaiveDate, customer_id: u64) -> InfraResult<Vec<CallDetail>> {
        (**self).fetch_call_detail(since, customer_id)
    }
}

impl<T: UsageSource + ?Sized> UsageSource for Arc<T> {
    fn fetch_invoices(&self, kind: BillingKind, month_offset: i32) -> InfraResult<Vec<UsageRecord>> {
        (**self).fetch_invoices(kind, month_offset)
    }
    fn fetch_customers(&self) -> InfraResult<Vec<ProviderCustomer>> {
        (**self).fetch_customers()
    }
    fn fetch_call_detail(&self, since: NaiveDate, customer_id: u64) -> InfraResult<Vec<CallDetail>> {
        (**self).fetch_call_detail(since, customer_id)
    }
}

impl<T: Mailer + ?Sized> Mailer for &T {
    fn send(&self, message: &MailMessage) -> InfraResult<()> {
        (**self).send(message)
    }
}

impl<T: Mailer + ?Sized> Mailer for Arc<T> {
    fn send(&self, message: &MailMessage) -> InfraResult<()> {
        (**self).send(message)
    }
}

impl<T: PdfRenderer + ?Sized> PdfRenderer for &T {
    fn render(&self, html: &str) -> InfraResult<Vec<u8>> {
        (**self).render(html)
    }
}

impl<T: PdfRenderer + ?Sized> PdfRenderer for Arc<T> {
    fn render(&self, html: &str) -> InfraResult<Vec<u8>> {
        (**self).render(html)
    }
}
