//! Billing provider adapter: IPEX B2B REST API over blocking HTTP.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use voipbill_usage::{CallDetail, ProviderCustomer, UsageRecord};

use crate::error::{InfraError, InfraResult};
use crate::ports::{BillingKind, UsageSource};

#[derive(Debug, Clone)]
pub struct IpexConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub timeout: Duration,
}

pub struct IpexClient {
    http: Client,
    base: Url,
    login: String,
    password: String,
}

impl IpexClient {
    pub fn new(config: IpexConfig) -> InfraResult<Self> {
        let mut base = Url::parse(&config.url).map_err(|e| InfraError::Config(format!("IPEX_URL: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(InfraError::Config("IPEX_URL cannot be a base".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InfraError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base,
            login: config.login,
            password: config.password,
        })
    }

    fn endpoint(&self, path: &str) -> InfraResult<Url> {
        self.base
            .join(path)
            .map_err(|e| InfraError::Config(format!("{path}: {e}")))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> InfraResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, ?query, "billing provider request");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.login, Some(&self.password))
            .query(query)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(InfraError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }
}

impl UsageSource for IpexClient {
    fn fetch_invoices(&self, kind: BillingKind, month_offset: i32) -> InfraResult<Vec<UsageRecord>> {
        let path = format!("invoices/{}", kind.as_str());
        self.get(&path, &[("monthOffset", month_offset.to_string())])
    }

    fn fetch_customers(&self) -> InfraResult<Vec<ProviderCustomer>> {
        self.get("customers", &[])
    }

    fn fetch_call_detail(&self, since: NaiveDate, customer_id: u64) -> InfraResult<Vec<CallDetail>> {
        let from = since.and_time(NaiveTime::MIN).and_utc().to_rfc3339();
        self.get(
            "calls",
            &[("dateFrom", from), ("customerId", customer_id.to_string())],
        )
    }
}
