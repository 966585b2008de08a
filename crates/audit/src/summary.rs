//! Outcome classification, pass counters and the compact external report.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processing pass a summary belongs to. Passes are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    Orders,
    Invoices,
    Prepaid,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Orders => "orders",
            PassKind::Invoices => "invoices",
            PassKind::Prepaid => "prepaid",
        }
    }

    /// Noun used in the one-line report message.
    fn document_noun(&self) -> &'static str {
        match self {
            PassKind::Orders => "orders",
            PassKind::Invoices => "invoices",
            PassKind::Prepaid => "listings",
        }
    }
}

impl core::fmt::Display for PassKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of handling one customer (or one usage record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Skipped,
    Duplicate,
    BelowLimit,
    #[serde(rename = "skipped_skiplist")]
    SkipList,
    NoCustomer,
    NotIpexCustomer,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Skipped => "skipped",
            Outcome::Duplicate => "duplicate",
            Outcome::BelowLimit => "below_limit",
            Outcome::SkipList => "skipped_skiplist",
            Outcome::NoCustomer => "no_customer",
            Outcome::NotIpexCustomer => "not_ipex_customer",
            Outcome::Failed => "failed",
        }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub processed_count: u64,
    pub created_count: u64,
    pub skipped_count: u64,
    pub duplicate_count: u64,
    pub below_limit_count: u64,
    pub skip_list_count: u64,
    pub no_customer_count: u64,
    pub not_ipex_customer_count: u64,
    pub failed_count: u64,
    /// Order state transitions after invoicing.
    pub completed_orders: u64,
    pub failed_completions: u64,
    pub mails_sent: u64,
    pub mails_failed: u64,
    /// Sum of created document amounts.
    pub created_amount: Decimal,
    /// Amount left uninvoiced (below limit, skip-list, duplicate).
    pub deferred_amount: Decimal,
}

impl AuditSummary {
    pub fn count(&mut self, outcome: Outcome) {
        self.processed_count += 1;
        match outcome {
            Outcome::Created => self.created_count += 1,
            Outcome::Skipped => self.skipped_count += 1,
            Outcome::Duplicate => self.duplicate_count += 1,
            Outcome::BelowLimit => self.below_limit_count += 1,
            Outcome::SkipList => self.skip_list_count += 1,
            Outcome::NoCustomer => self.no_customer_count += 1,
            Outcome::NotIpexCustomer => self.not_ipex_customer_count += 1,
            Outcome::Failed => self.failed_count += 1,
        }
    }

    pub fn add_amount(&mut self, outcome: Outcome, amount: Decimal) {
        match outcome {
            Outcome::Created => self.created_amount += amount,
            Outcome::BelowLimit | Outcome::SkipList | Outcome::Duplicate => {
                self.deferred_amount += amount
            }
            _ => {}
        }
    }

    /// Customers whose code could not be resolved either way.
    pub fn unresolved_count(&self) -> u64 {
        self.no_customer_count + self.not_ipex_customer_count
    }

    fn needs_attention(&self) -> bool {
        self.duplicate_count > 0
            || self.skipped_count > 0
            || self.skip_list_count > 0
            || self.failed_count > 0
            || self.failed_completions > 0
            || self.mails_failed > 0
    }
}

/// Overall status of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Warning,
    Error,
}

/// Compact report consumed by external schedulers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReport {
    pub status: ReportStatus,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub message: String,
    pub artifacts: Vec<String>,
    pub metrics: BTreeMap<String, Value>,
}

fn amount_value(amount: Decimal) -> Value {
    Value::String(amount.normalize().to_string())
}

/// Derive the external report of one pass.
pub fn to_external_format(
    summary: &AuditSummary,
    pass: PassKind,
    exit_code: i32,
    artifacts: &[String],
) -> ExternalReport {
    let status = if exit_code != 0 {
        ReportStatus::Error
    } else if summary.needs_attention() {
        ReportStatus::Warning
    } else {
        ReportStatus::Success
    };

    let message = format!(
        "{}: processed {}, created {} {}, duplicate {}, skipped {}, below limit {}, skip-list {}, no customer {}, failed {}",
        pass,
        summary.processed_count,
        summary.created_count,
        pass.document_noun(),
        summary.duplicate_count,
        summary.skipped_count,
        summary.below_limit_count,
        summary.skip_list_count,
        summary.unresolved_count(),
        summary.failed_count,
    );

    let mut metrics = BTreeMap::new();
    let counts = [
        ("processed", summary.processed_count),
        ("created", summary.created_count),
        ("skipped", summary.skipped_count),
        ("duplicate", summary.duplicate_count),
        ("below_limit", summary.below_limit_count),
        ("skipped_skiplist", summary.skip_list_count),
        ("no_customer", summary.no_customer_count),
        ("not_ipex_customer", summary.not_ipex_customer_count),
        ("failed", summary.failed_count),
        ("orders_completed", summary.completed_orders),
        ("orders_completion_failed", summary.failed_completions),
        ("mails_sent", summary.mails_sent),
        ("mails_failed", summary.mails_failed),
    ];
    for (name, value) in counts {
        metrics.insert(name.to_string(), Value::from(value));
    }
    metrics.insert("created_amount".to_string(), amount_value(summary.created_amount));
    metrics.insert("deferred_amount".to_string(), amount_value(summary.deferred_amount));
    metrics.insert("exit_code".to_string(), Value::from(exit_code));

    ExternalReport {
        status,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        message,
        artifacts: artifacts.to_vec(),
        metrics,
    }
}
