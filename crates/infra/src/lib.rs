//! Infrastructure layer: collaborator ports, their HTTP/SMTP/PDF adapters,
//! and the reconciliation passes that drive them.

pub mod abraflexi;
pub mod calls_listing;
pub mod error;
pub mod guard;
pub mod in_memory;
pub mod invoices;
pub mod ipex;
pub mod mail;
pub mod orders;
pub mod pdf;
pub mod period;
pub mod ports;
pub mod prepaid;


pub use abraflexi::{AbraFlexiClient, AbraFlexiConfig};
pub use error::{InfraError, InfraResult};
pub use guard::{DuplicateGuard, ExistingDocument, MatchedBy};
pub use in_memory::{InMemoryAccounting, InMemoryUsageSource, RecordingMailer, StaticPdfRenderer};
pub use invoices::{Completion, InvoiceAggregator, InvoiceOutcome, InvoiceSettings, LockScope, complete_order};
pub use ipex::{IpexClient, IpexConfig};
pub use mail::{SmtpConfig, SmtpMailer};
pub use orders::{OrderBuilder, OrderOutcome, OrderSettings};
pub use pdf::CommandPdfRenderer;
pub use period::resolve_window;
pub use ports::{
    AccountingSystem, Attachment, BillingKind, InvoiceQuery, MailMessage, Mailer, OrderQuery, PdfRenderer,
    UsageSource,
};
pub use prepaid::PrepaidListings;
