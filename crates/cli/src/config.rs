//! Process configuration: optional dotenv file, then the environment.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;

use voipbill_core::{CustomerCode, ProductCode};
use voipbill_infra::{AbraFlexiConfig, InvoiceSettings, IpexConfig, OrderSettings, SmtpConfig};
use voipbill_invoicing::InvoicePolicy;
use voipbill_sales::OrderPolicy;

/// Shape of the JSON report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Per-customer entries plus the `_audit` block.
    Detailed,
    /// Compact status/message/metrics shape for schedulers.
    Summary,
}

/// Flat configuration; keys are the upper-case environment names.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ipex_url: String,
    pub ipex_login: String,
    pub ipex_password: String,

    pub abraflexi_url: String,
    pub abraflexi_login: String,
    pub abraflexi_password: String,
    pub abraflexi_company: String,
    #[serde(default = "default_order_type")]
    pub abraflexi_ordertype: String,
    #[serde(default = "default_doc_type")]
    pub abraflexi_doctype: String,
    #[serde(default = "default_product")]
    pub abraflexi_product: String,
    #[serde(default = "default_operation_type")]
    pub abraflexi_operation_type: String,
    #[serde(default = "default_minimal_invoicing")]
    pub abraflexi_minimal_invoicing: Decimal,
    #[serde(default = "enabled")]
    pub abraflexi_create_empty_orders: bool,
    /// Comma separated customer codes.
    #[serde(default)]
    pub abraflexi_skiplist: String,

    #[serde(default = "enabled")]
    pub attach_call_log: bool,
    #[serde(default = "enabled")]
    pub mail_call_log: bool,
    #[serde(default = "enabled")]
    pub textual_fingerprint_fallback: bool,

    #[serde(default = "default_month_offset")]
    pub month_offset: i32,
    #[serde(default = "default_result_file")]
    pub result_file: String,
    #[serde(default = "default_report_format")]
    pub report_format: ReportFormat,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub app_debug: bool,

    #[serde(default = "default_pdf_command")]
    pub pdf_command: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn enabled() -> bool {
    true
}

fn default_order_type() -> String {
    "OBP_VOIP".to_string()
}

fn default_doc_type() -> String {
    "FAKTURA".to_string()
}

fn default_product() -> String {
    "IPEX_POSTPAID".to_string()
}

fn default_operation_type() -> String {
    "TRŽBA SLUŽBY INT".to_string()
}

fn default_minimal_invoicing() -> Decimal {
    Decimal::new(200, 0)
}

fn default_month_offset() -> i32 {
    -1
}

fn default_result_file() -> String {
    "-".to_string()
}

fn default_report_format() -> ReportFormat {
    ReportFormat::Detailed
}

fn default_pdf_command() -> String {
    "wkhtmltopdf --quiet - -".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "noreply@localhost".to_string()
}

fn default_http_timeout() -> u64 {
    60
}

impl AppConfig {
    /// Load `env_file` (or `.env` when present), then read the environment.
    pub fn load(env_file: Option<&Path>) -> anyhow::Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("cannot load environment file {}", path.display()))?;
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }

        Self::from_source(config::Environment::default()).context("invalid configuration")
    }

    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn product(&self) -> anyhow::Result<ProductCode> {
        ProductCode::decode(&self.abraflexi_product).context("ABRAFLEXI_PRODUCT")
    }

    pub fn skip_list(&self) -> anyhow::Result<BTreeSet<CustomerCode>> {
        self.abraflexi_skiplist
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| CustomerCode::decode(c).with_context(|| format!("ABRAFLEXI_SKIPLIST entry '{c}'")))
            .collect()
    }

    pub fn order_settings(&self) -> anyhow::Result<OrderSettings> {
        Ok(OrderSettings {
            policy: OrderPolicy {
                product: self.product()?,
                create_empty_orders: self.abraflexi_create_empty_orders,
            },
            attach_call_log: self.attach_call_log,
            mail_call_log: self.mail_call_log,
            textual_fallback: self.textual_fingerprint_fallback,
        })
    }

    pub fn invoice_settings(&self) -> anyhow::Result<InvoiceSettings> {
        Ok(InvoiceSettings {
            policy: InvoicePolicy {
                product: self.product()?,
                limit: self.abraflexi_minimal_invoicing,
                skip_list: self.skip_list()?,
            },
            attach_call_log: self.attach_call_log,
            textual_fallback: self.textual_fingerprint_fallback,
        })
    }

    pub fn ipex_config(&self) -> IpexConfig {
        IpexConfig {
            url: self.ipex_url.clone(),
            login: self.ipex_login.clone(),
            password: self.ipex_password.clone(),
            timeout: self.timeout(),
        }
    }

    pub fn abraflexi_config(&self) -> AbraFlexiConfig {
        AbraFlexiConfig {
            url: self.abraflexi_url.clone(),
            login: self.abraflexi_login.clone(),
            password: self.abraflexi_password.clone(),
            company: self.abraflexi_company.clone(),
            order_type: self.abraflexi_ordertype.clone(),
            invoice_type: self.abraflexi_doctype.clone(),
            operation_type: self.abraflexi_operation_type.clone(),
            timeout: self.timeout(),
        }
    }

    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            from: self.smtp_from.clone(),
            timeout: self.timeout(),
        }
    }
}
