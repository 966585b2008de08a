//! Billing-provider usage domain.
//!
//! Usage records, call listings and the period window a run processes,
//! implemented purely as deterministic logic (no IO, no HTTP).

pub mod period;
pub mod provider;
pub mod record;

pub use period::{
    DEFAULT_MONTH_OFFSET, PeriodFilter, PeriodSelector, PeriodWindow, continue_offset,
    normalize_offset,
};
pub use record::{CallDetail, ProviderCustomer, UsageRecord, calls_total};
