//! Prepaid pass: mail last month's call listing to every prepaid customer.

use chrono::NaiveDate;
use tracing::{info, warn};

use voipbill_audit::{AuditReporter, EntryId, Outcome, PassKind};
use voipbill_core::{CustomerCode, RunId};
use voipbill_usage::UsageRecord;

use crate::calls_listing::{CallListing, render_call_listing};
use crate::error::InfraResult;
use crate::ports::{AccountingSystem, Attachment, BillingKind, MailMessage, Mailer, PdfRenderer, UsageSource};

pub struct PrepaidListings<A, U, M, P> {
    accounting: A,
    usage: U,
    mailer: M,
    pdf: P,
    month_offset: i32,
}

impl<A, U, M, P> PrepaidListings<A, U, M, P>
where
    A: AccountingSystem,
    U: UsageSource,
    M: Mailer,
    P: PdfRenderer,
{
    pub fn new(accounting: A, usage: U, mailer: M, pdf: P, month_offset: i32) -> Self {
        Self {
            accounting,
            usage,
            mailer,
            pdf,
            month_offset,
        }
    }

    pub fn process(&self, today: NaiveDate, run_id: RunId) -> InfraResult<AuditReporter> {
        let mut audit = AuditReporter::new(PassKind::Prepaid, run_id);
        let records = self
            .usage
            .fetch_invoices(BillingKind::Prepaid, self.month_offset)?;
        info!(records = records.len(), month_offset = self.month_offset, "prepaid records fetched");

        for record in &records {
            self.deliver(record, today, &mut audit);
        }
        Ok(audit)
    }

    fn unknown(&self, audit: &mut AuditReporter, record: &UsageRecord, outcome: Outcome, detail: String) {
        warn!(customer = %record.customer_external_code, name = %record.customer_name, "prepaid customer without address book record");
        let id = audit.record_outcome(&record.customer_external_code, outcome, detail);
        if let Some(entry) = audit.entry_mut(id) {
            entry.mail = Some(false);
            entry.calls_count = Some(0);
        }
    }

    fn failed(&self, audit: &mut AuditReporter, customer: &str, detail: String, listing: Option<&CallListing>) -> EntryId {
        let id = audit.record_outcome(customer, Outcome::Failed, detail);
        if let Some(entry) = audit.entry_mut(id) {
            entry.mail = Some(false);
            entry.calls_count = Some(listing.map_or(0, |l| l.calls_count));
            entry.period = listing.map(|l| l.range.clone());
            entry.total_amount = listing.map(|l| l.total);
        }
        id
    }

    /// Records exactly one outcome per record.
    fn deliver(&self, record: &UsageRecord, today: NaiveDate, audit: &mut AuditReporter) {
        let raw = record.customer_external_code.as_str();

        let customer = match CustomerCode::decode(raw) {
            Ok(code) => code,
            Err(err) => return self.unknown(audit, record, Outcome::NotIpexCustomer, err.to_string()),
        };

        let party = match self.accounting.party_exists(&customer) {
            Ok(true) => match self.accounting.load_party(&customer) {
                Ok(party) => party,
                Err(err) => {
                    self.failed(audit, raw, format!("customer lookup: {err}"), None);
                    return;
                }
            },
            Ok(false) => return self.unknown(audit, record, Outcome::NoCustomer, String::new()),
            Err(err) => {
                self.failed(audit, raw, format!("customer lookup: {err}"), None);
                return;
            }
        };

        let Some(provider_id) = record.ipex_customer_id else {
            self.failed(audit, raw, "no provider customer id".to_string(), None);
            return;
        };

        let listing = match render_call_listing(&self.usage, &self.pdf, provider_id, 1, today) {
            Ok(listing) => listing,
            Err(err) => {
                self.failed(audit, raw, format!("call listing: {err}"), None);
                return;
            }
        };

        let Some(to) = party.notification_email() else {
            warn!(customer = raw, "customer without email address, call listing not mailed");
            let id = audit.record_outcome(raw, Outcome::Skipped, "customer without email address");
            audit.record_mail(id, false);
            Self::fill(audit, id, &listing);
            return;
        };

        let since = today
            .checked_sub_months(chrono::Months::new(1))
            .unwrap_or(today);
        let message = MailMessage {
            to: to.to_string(),
            subject: format!("Prepaid calls listing {}", listing.range),
            body: "Prepaid calls for last month".to_string(),
            attachments: vec![Attachment::pdf(
                format!("{provider_id}_Calls_{}_{}.pdf", since.format("%Y-%m-%d"), today.format("%Y-%m-%d")),
                listing.pdf.clone(),
            )],
        };

        match self.mailer.send(&message) {
            Ok(()) => {
                info!(customer = raw, to, calls = listing.calls_count, "prepaid listing mailed");
                let id = audit.record_outcome(raw, Outcome::Created, "");
                audit.record_mail(id, true);
                Self::fill(audit, id, &listing);
            }
            Err(err) => {
                warn!(customer = raw, to, error = %err, "prepaid listing not mailed");
                let id = self.failed(audit, raw, format!("mail: {err}"), Some(&listing));
                audit.record_mail(id, false);
            }
        }
    }

    fn fill(audit: &mut AuditReporter, id: EntryId, listing: &CallListing) {
        if let Some(entry) = audit.entry_mut(id) {
            entry.period = Some(listing.range.clone());
            entry.total_amount = Some(listing.total);
            entry.calls_count = Some(listing.calls_count);
        }
    }
}
