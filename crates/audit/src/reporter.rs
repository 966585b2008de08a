//! Per-pass audit accumulator and the detailed report.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use voipbill_core::RunId;

use crate::summary::{AuditSummary, ExternalReport, Outcome, PassKind, to_external_format};

/// Key of the summary block inside the detailed report.
pub const AUDIT_KEY: &str = "_audit";

/// Handle to a recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Error,
}

/// Result of moving one consumed order to `done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletion {
    pub order: String,
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// One customer's line in the detailed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEntry {
    #[serde(skip)]
    pub customer: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Code of the created (or matched) document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    /// Orders the outcome applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completions: Vec<OrderCompletion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls_count: Option<usize>,
}

impl CustomerEntry {
    fn new(customer: &str, outcome: Outcome, detail: String) -> Self {
        Self {
            customer: customer.to_string(),
            outcome,
            detail,
            document: None,
            url: None,
            amount: None,
            orders: Vec::new(),
            completions: Vec::new(),
            mail: None,
            attached: None,
            period: None,
            total_amount: None,
            calls_count: None,
        }
    }
}

/// Accumulates the outcomes of one pass.
#[derive(Debug, Clone)]
pub struct AuditReporter {
    pass: PassKind,
    run_id: RunId,
    started_at: DateTime<Utc>,
    entries: Vec<CustomerEntry>,
    summary: AuditSummary,
    artifacts: Vec<String>,
}

impl AuditReporter {
    pub fn new(pass: PassKind, run_id: RunId) -> Self {
        Self {
            pass,
            run_id,
            started_at: Utc::now(),
            entries: Vec::new(),
            summary: AuditSummary::default(),
            artifacts: Vec::new(),
        }
    }

    pub fn pass(&self) -> PassKind {
        self.pass
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Classify one customer. Call exactly once per classification branch.
    pub fn record_outcome(
        &mut self,
        customer: &str,
        outcome: Outcome,
        detail: impl Into<String>,
    ) -> EntryId {
        let detail = detail.into();
        match outcome {
            Outcome::Failed => warn!(pass = %self.pass, customer, %outcome, %detail, "outcome"),
            Outcome::Created => info!(pass = %self.pass, customer, %outcome, "outcome"),
            _ => debug!(pass = %self.pass, customer, %outcome, %detail, "outcome"),
        }

        self.summary.count(outcome);
        self.entries.push(CustomerEntry::new(customer, outcome, detail));
        EntryId(self.entries.len() - 1)
    }

    pub fn entry(&self, id: EntryId) -> Option<&CustomerEntry> {
        self.entries.get(id.0)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut CustomerEntry> {
        self.entries.get_mut(id.0)
    }

    pub fn entries(&self) -> &[CustomerEntry] {
        &self.entries
    }

    /// Amount the entry's outcome concerns; feeds the monetary totals.
    pub fn record_amount(&mut self, id: EntryId, amount: Decimal) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.amount = Some(amount);
            self.summary.add_amount(entry.outcome, amount);
        }
    }

    /// Document the entry produced; its URL becomes a report artifact.
    pub fn record_document(&mut self, id: EntryId, code: Option<String>, url: Option<String>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.document = code;
            if let Some(url) = &url {
                self.artifacts.push(url.clone());
            }
            entry.url = url;
        }
    }

    pub fn record_orders(&mut self, id: EntryId, orders: Vec<String>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.orders = orders;
        }
    }

    /// Outcome of marking one consumed order `done`.
    pub fn record_completion(&mut self, id: EntryId, order: &str, ok: bool, detail: impl Into<String>) {
        let status = if ok {
            self.summary.completed_orders += 1;
            CompletionStatus::Success
        } else {
            self.summary.failed_completions += 1;
            CompletionStatus::Error
        };

        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.completions.push(OrderCompletion {
                order: order.to_string(),
                status,
                detail: detail.into(),
            });
        }
    }

    pub fn record_mail(&mut self, id: EntryId, sent: bool) {
        if sent {
            self.summary.mails_sent += 1;
        } else {
            self.summary.mails_failed += 1;
        }
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.mail = Some(sent);
        }
    }

    pub fn record_attachment(&mut self, id: EntryId, attached: bool) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.attached = Some(attached);
        }
    }

    pub fn summary(&self) -> &AuditSummary {
        &self.summary
    }

    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    pub fn external_report(&self, exit_code: i32) -> ExternalReport {
        to_external_format(&self.summary, self.pass, exit_code, &self.artifacts)
    }

    /// Per-customer entries keyed by customer plus the `_audit` block.
    ///
    /// A customer seen more than once gets `#2`, `#3`... suffixed keys.
    pub fn detailed_report(&self) -> Value {
        let mut report = Map::new();

        for entry in &self.entries {
            let mut key = entry.customer.clone();
            let mut seen = 1;
            while report.contains_key(&key) {
                seen += 1;
                key = format!("{}#{}", entry.customer, seen);
            }
            let value = serde_json::to_value(entry).unwrap_or(Value::Null);
            report.insert(key, value);
        }

        let audit = serde_json::json!({
            "pass": self.pass,
            "runId": self.run_id,
            "startedAt": self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "finishedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "summary": self.summary,
            "artifacts": self.artifacts,
        });
        report.insert(AUDIT_KEY.to_string(), audit);

        Value::Object(report)
    }
}
