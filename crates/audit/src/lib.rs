//! Run auditing: per-customer outcomes, pass summaries and the two report
//! shapes written at the end of a run.

pub mod reporter;
pub mod summary;

pub use reporter::{AuditReporter, CompletionStatus, CustomerEntry, EntryId, OrderCompletion};
pub use summary::{
    AuditSummary, ExternalReport, Outcome, PassKind, ReportStatus, to_external_format,
};
