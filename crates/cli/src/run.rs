//! Composition root shared by the three entry points.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use serde_json::{Value, json};
use tracing::{debug, error, info};

use voipbill_audit::reporter::AUDIT_KEY;
use voipbill_audit::{AuditReporter, PassKind};
use voipbill_core::RunId;
use voipbill_infra::{
    AbraFlexiClient, CommandPdfRenderer, InvoiceAggregator, IpexClient, OrderBuilder, PrepaidListings, SmtpMailer,
    resolve_window,
};

use crate::args::CommonArgs;
use crate::config::{AppConfig, ReportFormat};
use crate::output;

/// Load configuration, run one pass, write its report.
///
/// Per-record failures are part of the report; only configuration errors,
/// a failed initial fetch or an unwritable report give a non-zero exit.
pub fn run(pass: PassKind, args: CommonArgs) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(args.environment.as_deref())?;
    voipbill_observability::init(config.app_debug);

    if args.date_from.is_some() || args.date_to.is_some() {
        debug!(
            date_from = ?args.date_from,
            date_to = ?args.date_to,
            "date range options are ignored; the period follows the month offset"
        );
    }

    let run_id = RunId::new();
    let today = Local::now().date_naive();
    info!(%run_id, %pass, %today, "run started");

    let format = args.format.unwrap_or(config.report_format);
    let destination = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.result_file));

    let (report, exit_code) = match execute(pass, &config, &args, today, run_id) {
        Ok(audit) => {
            let summary = audit.summary();
            info!(
                %run_id,
                processed = summary.processed_count,
                created = summary.created_count,
                failed = summary.failed_count,
                "run finished"
            );
            (report_for(&audit, format, 0), 0)
        }
        Err(err) => {
            error!(%run_id, error = %format!("{err:#}"), "run aborted");
            (aborted_report(pass, run_id, format, &err), 1)
        }
    };

    output::write_report(&destination, &report, config.debug)?;

    Ok(if exit_code == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn execute(
    pass: PassKind,
    config: &AppConfig,
    args: &CommonArgs,
    today: NaiveDate,
    run_id: RunId,
) -> anyhow::Result<AuditReporter> {
    let accounting = AbraFlexiClient::new(config.abraflexi_config())?;
    let usage = IpexClient::new(config.ipex_config())?;
    let pdf = CommandPdfRenderer::new(&config.pdf_command)?;

    let audit = match pass {
        PassKind::Orders => {
            let mailer = SmtpMailer::new(config.smtp_config())?;
            let window = resolve_window(&accounting, args.month_offset, args.continue_mode, today)?;
            OrderBuilder::new(accounting, usage, mailer, pdf, config.order_settings()?).process(&window, today, run_id)?
        }
        PassKind::Invoices => {
            let aggregator = InvoiceAggregator::new(accounting, usage, pdf, config.invoice_settings()?);
            let (audit, _) = aggregator.process(today, run_id)?;
            audit
        }
        PassKind::Prepaid => {
            let mailer = SmtpMailer::new(config.smtp_config())?;
            let offset = args.month_offset.unwrap_or(config.month_offset);
            PrepaidListings::new(accounting, usage, mailer, pdf, offset).process(today, run_id)?
        }
    };

    Ok(audit)
}

/// Report of a completed pass in the requested shape.
pub fn report_for(audit: &AuditReporter, format: ReportFormat, exit_code: i32) -> Value {
    match format {
        ReportFormat::Detailed => audit.detailed_report(),
        ReportFormat::Summary => serde_json::to_value(audit.external_report(exit_code)).unwrap_or(Value::Null),
    }
}

/// Report of a pass that stopped before processing any customer.
pub fn aborted_report(pass: PassKind, run_id: RunId, format: ReportFormat, err: &anyhow::Error) -> Value {
    let audit = AuditReporter::new(pass, run_id);
    let message = format!("{err:#}");

    match format {
        ReportFormat::Detailed => {
            let mut report = audit.detailed_report();
            if let Some(block) = report.get_mut(AUDIT_KEY).and_then(Value::as_object_mut) {
                block.insert("error".to_string(), Value::String(message));
            }
            report
        }
        ReportFormat::Summary => {
            let mut report = report_for(&audit, format, 1);
            report["message"] = json!(format!("{pass}: {message}"));
            report
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voipbill_audit::Outcome;

    fn audit_with_one_order() -> AuditReporter {
        let mut audit = AuditReporter::new(PassKind::Orders, RunId::new());
        audit.record_outcome("ACME", Outcome::Created, "order OBP0001 created");
        audit
    }

    #[test]
    fn detailed_report_is_keyed_by_customer() {
        let report = report_for(&audit_with_one_order(), ReportFormat::Detailed, 0);
        assert_eq!(report["ACME"]["outcome"], "created");
        assert!(report.get("_audit").is_some());
    }

    #[test]
    fn summary_report_has_status_and_metrics() {
        let report = report_for(&audit_with_one_order(), ReportFormat::Summary, 0);
        assert_eq!(report["status"], "success");
        assert!(report["message"].as_str().unwrap().starts_with("orders:"));
        assert!(report.get("metrics").is_some());
    }

    #[test]
    fn aborted_summary_is_an_error() {
        let err = anyhow::anyhow!("usage source unreachable");
        let report = aborted_report(PassKind::Invoices, RunId::new(), ReportFormat::Summary, &err);

        assert_eq!(report["status"], "error");
        assert_eq!(report["message"], "invoices: usage source unreachable");
    }

    #[test]
    fn aborted_detailed_report_carries_the_error() {
        let err = anyhow::anyhow!("usage source unreachable");
        let report = aborted_report(PassKind::Prepaid, RunId::new(), ReportFormat::Detailed, &err);

        assert_eq!(report["_audit"]["error"], "usage source unreachable");
    }
}
