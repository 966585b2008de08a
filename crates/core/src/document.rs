//! Accounting document kinds and their idempotency keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::id::CustomerCode;

/// Namespace of external identifiers written by this tool.
pub const EXTERNAL_ID_NAMESPACE: &str = "voipbill";

/// Kind of accounting document this tool creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Order,
    Invoice,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Order => "order",
            DocumentKind::Invoice => "invoice",
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable date as embedded into document descriptions.
///
/// The pattern is fixed: documents created by earlier runs are matched by it.
pub fn format_period_date(date: NaiveDate) -> String {
    date.format("%m. %d. %Y").to_string()
}

/// Structured idempotency key: one document per kind, customer and period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub kind: DocumentKind,
    pub customer: CustomerCode,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl DocumentKey {
    pub fn new(
        kind: DocumentKind,
        customer: CustomerCode,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Self {
        Self {
            kind,
            customer,
            period_start,
            period_end,
        }
    }

    /// External identifier stored on the document when it is created.
    pub fn external_id(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            EXTERNAL_ID_NAMESPACE,
            self.kind,
            self.customer,
            self.period_start.format("%Y-%m-%d"),
            self.period_end.format("%Y-%m-%d"),
        )
    }

    /// Textual fingerprint: the description mentions both period bounds.
    pub fn matches_text(&self, description: &str) -> bool {
        description.contains(&format_period_date(self.period_start))
            && description.contains(&format_period_date(self.period_end))
    }
}

/// A persisted document that can be checked against a [`DocumentKey`].
pub trait Fingerprinted {
    fn description(&self) -> &str;

    fn external_ids(&self) -> &[String];

    fn has_external_id(&self, key: &DocumentKey) -> bool {
        let wanted = key.external_id();
        self.external_ids().iter().any(|id| *id == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DocumentKey {
        DocumentKey::new(
            DocumentKind::Order,
            CustomerCode::decode("ACME").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
    }

    #[test]
    fn external_id_is_stable() {
        assert_eq!(
            key().external_id(),
            "voipbill:order:ACME:2024-05-01:2024-05-31"
        );
    }

    #[test]
    fn text_match_requires_both_bounds() {
        let key = key();
        assert!(key.matches_text("Telephone services from 05. 01. 2024 to 05. 31. 2024"));
        assert!(!key.matches_text("Telephone services from 05. 01. 2024"));
        assert!(!key.matches_text(""));
    }
}
