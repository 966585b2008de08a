//! Invoicing domain module.
//!
//! Consolidates one customer's prepared usage orders into a single invoice
//! draft, deterministically (no IO, no HTTP).

pub mod invoice;

pub use invoice::{
    ForeignItem, Invoice, InvoiceComposition, InvoiceDraft, InvoicePolicy, SkipReason, compose,
    exceeds_limit, order_span, uninvoiced_amount,
};
