//! Usage records, provider customers and call-detail rows.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::provider::{lenient_count, lenient_id, optional_datetime, yes_flag};

/// One billing-provider-reported chargeable period for a customer.
///
/// Immutable once fetched; lives for one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Customer code shared with the accounting system.
    #[serde(rename = "externId")]
    pub customer_external_code: String,
    /// Provider-internal customer id (needed for call listings).
    #[serde(rename = "customerId", default, deserialize_with = "lenient_id")]
    pub ipex_customer_id: Option<u64>,
    #[serde(rename = "customerName", default)]
    pub customer_name: String,
    pub price: Decimal,
    #[serde(rename = "dateStart", default, with = "optional_datetime")]
    pub period_start: Option<DateTime<FixedOffset>>,
    #[serde(rename = "dateEnd", default, with = "optional_datetime")]
    pub period_end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "zipCode", default)]
    pub zip_code: String,
}

impl UsageRecord {
    /// Start date in the record's own offset (the provider's local calendar).
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.period_start.map(|d| d.date_naive())
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.period_end.map(|d| d.date_naive())
    }

    pub fn is_zero_priced(&self) -> bool {
        self.price.is_zero()
    }
}

/// Entry of the billing provider's customer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCustomer {
    #[serde(rename = "externId")]
    pub external_code: String,
    #[serde(rename = "customerId", default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

/// One row of a customer's call listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDetail {
    #[serde(rename = "cislo_int", default)]
    pub internal_number: String,
    #[serde(rename = "cislo_ext", default)]
    pub external_number: String,
    #[serde(rename = "destinace", default)]
    pub destination: String,
    /// Timestamp exactly as the provider formats it.
    #[serde(rename = "datetime", default)]
    pub when: String,
    #[serde(rename = "odchozi", default, deserialize_with = "yes_flag")]
    pub outgoing: bool,
    #[serde(rename = "placeny", default, deserialize_with = "yes_flag")]
    pub paid: bool,
    #[serde(rename = "stav", default)]
    pub state: String,
    #[serde(rename = "delka", default, deserialize_with = "lenient_count")]
    pub duration_secs: u64,
    #[serde(rename = "cena", default)]
    pub price: Decimal,
    #[serde(rename = "sazba_dph", default)]
    pub vat_rate: Decimal,
}

/// Answer state the provider reports for connected calls.
const ANSWERED_STATE: &str = "Zodpovězeno";

impl CallDetail {
    pub fn is_answered(&self) -> bool {
        self.state == ANSWERED_STATE
    }
}

/// Sum of call prices (no rounding).
pub fn calls_total(calls: &[CallDetail]) -> Decimal {
    calls.iter().map(|c| c.price).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn usage_record_decodes_provider_payload() {
        let raw = serde_json::json!({
            "externId": "ACME",
            "customerId": "4711",
            "customerName": "Acme s.r.o.",
            "price": "123.45",
            "dateStart": "2024-05-01T00:00:00+02:00",
            "dateEnd": "2024-05-31T23:59:59+02:00",
            "note": "postpaid",
            "street": "Main 1",
            "city": "Praha",
            "zipCode": "11000"
        });

        let record: UsageRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.customer_external_code, "ACME");
        assert_eq!(record.ipex_customer_id, Some(4711));
        assert_eq!(record.price, dec("123.45"));
        assert_eq!(record.start_date(), NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(record.end_date(), NaiveDate::from_ymd_opt(2024, 5, 31));
    }

    #[test]
    fn missing_dates_decode_as_none() {
        let raw = serde_json::json!({
            "externId": "ACME",
            "price": 0,
            "dateStart": ""
        });

        let record: UsageRecord = serde_json::from_value(raw).unwrap();
        assert!(record.start_date().is_none());
        assert!(record.end_date().is_none());
        assert!(record.is_zero_priced());
    }

    #[test]
    fn call_detail_flags_and_total() {
        let rows = serde_json::json!([
            {"cislo_int": "100", "cislo_ext": "777123456", "destinace": "CZ mobile",
             "datetime": "2024-05-02 10:00:00", "odchozi": "Y", "placeny": "N",
             "stav": "Zodpovězeno", "delka": "65", "cena": "1.50", "sazba_dph": "21"},
            {"cislo_int": "100", "cislo_ext": "222", "odchozi": "N", "placeny": "Y",
             "stav": "Nezvednuto", "delka": 0, "cena": 0.25}
        ]);

        let calls: Vec<CallDetail> = serde_json::from_value(rows).unwrap();
        assert!(calls[0].outgoing);
        assert!(!calls[0].paid);
        assert!(calls[0].is_answered());
        assert_eq!(calls[0].duration_secs, 65);
        assert!(!calls[1].is_answered());
        assert_eq!(calls_total(&calls), dec("1.75"));
    }
}
