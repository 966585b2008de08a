//! Call listing document: HTML table rendered to PDF.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use voipbill_usage::{CallDetail, calls_total};

use crate::error::InfraResult;
use crate::ports::{Attachment, PdfRenderer, UsageSource};

const PERIODS: [(&str, u64); 4] = [("day", 86_400), ("hour", 3_600), ("minute", 60), ("second", 1)];

/// Human-readable duration: `1 hour, 2 minutes and 5 seconds`.
pub fn secs_to_str(mut secs: u64) -> String {
    let mut parts = Vec::new();
    for (name, unit) in PERIODS {
        let count = secs / unit;
        if count == 0 {
            continue;
        }
        parts.push(if count == 1 {
            format!("{count} {name}")
        } else {
            format!("{count} {name}s")
        });
        secs %= unit;
    }

    match parts.pop() {
        None => "0 seconds".to_string(),
        Some(last) if parts.is_empty() => last,
        Some(last) => format!("{} and {}", parts.join(", "), last),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const HEADER: [&str; 10] = [
    "Calling number",
    "Called number",
    "Destination",
    "When",
    "Direction",
    "Paid",
    "State",
    "Duration",
    "Price",
    "VAT rate",
];

/// `m/d/Y - m/d/Y` range shown above the table.
pub fn listing_range(since: NaiveDate, until: NaiveDate) -> String {
    format!("{} - {}", since.format("%m/%d/%Y"), until.format("%m/%d/%Y"))
}

/// Complete HTML document of a call listing.
pub fn render_html(range: &str, calls: &[CallDetail]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Calls listing</title></head>\n<body>\n",
    );
    html.push_str("<h2>Calls listing</h2>\n");
    html.push_str(&format!("<p>{}</p>\n", escape(range)));
    html.push_str("<table style=\"font-size: small\">\n<tr>");
    for column in HEADER {
        html.push_str(&format!("<th>{column}</th>"));
    }
    html.push_str("</tr>\n");

    for call in calls {
        let cells = [
            escape(&call.internal_number),
            escape(&call.external_number),
            escape(&call.destination),
            escape(&call.when),
            (if call.outgoing { "Outgoing" } else { "Incoming" }).to_string(),
            (if call.paid { "Yes" } else { "No" }).to_string(),
            (if call.is_answered() { "Answered" } else { "Not answered" }).to_string(),
            secs_to_str(call.duration_secs),
            call.price.to_string(),
            call.vat_rate.to_string(),
        ];
        html.push_str("<tr>");
        for cell in cells {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</table>\n</body></html>\n");
    html
}

/// PDF file name for a document description.
///
/// Spaces become `_`, `:` and `/` become `-`, other punctuation is dropped.
pub fn attachment_name(description: &str) -> String {
    let stem: String = description
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            ':' | '/' => Some('-'),
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .collect();
    let stem = if stem.is_empty() { "calls".to_string() } else { stem };
    format!("{stem}.pdf")
}

/// Rendered listing of one customer's calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallListing {
    pub range: String,
    pub calls_count: usize,
    pub total: Decimal,
    pub pdf: Vec<u8>,
}

impl CallListing {
    pub fn attachment(&self, file_name: impl Into<String>) -> Attachment {
        Attachment::pdf(file_name, self.pdf.clone())
    }
}

/// Fetch the calls of the last `months` months up to `today` and render them.
pub fn render_call_listing<U, P>(
    usage: &U,
    pdf: &P,
    customer_id: u64,
    months: u32,
    today: NaiveDate,
) -> InfraResult<CallListing>
where
    U: UsageSource + ?Sized,
    P: PdfRenderer + ?Sized,
{
    let since = today
        .checked_sub_months(Months::new(months.max(1)))
        .unwrap_or(today);
    let calls = usage.fetch_call_detail(since, customer_id)?;
    let range = listing_range(since, today);
    let html = render_html(&range, &calls);

    Ok(CallListing {
        calls_count: calls.len(),
        total: calls_total(&calls),
        pdf: pdf.render(&html)?,
        range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(external: &str, answered: bool, secs: u64, price: Decimal) -> CallDetail {
        CallDetail {
            internal_number: "100".into(),
            external_number: external.into(),
            destination: "CZ <mobile>".into(),
            when: "2024-05-02 10:00:00".into(),
            outgoing: true,
            paid: false,
            state: if answered { "Zodpovězeno".into() } else { "Nezvednuto".into() },
            duration_secs: secs,
            price,
            vat_rate: Decimal::new(21, 0),
        }
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(secs_to_str(0), "0 seconds");
        assert_eq!(secs_to_str(1), "1 second");
        assert_eq!(secs_to_str(65), "1 minute and 5 seconds");
        assert_eq!(secs_to_str(3_725), "1 hour, 2 minutes and 5 seconds");
        assert_eq!(secs_to_str(86_400 * 2 + 60), "2 days and 1 minute");
    }

    #[test]
    fn html_escapes_provider_text_and_labels_flags() {
        let html = render_html("05/01/2024 - 06/01/2024", &[call("777", true, 65, Decimal::ONE)]);
        assert!(html.contains("CZ &lt;mobile&gt;"));
        assert!(html.contains("<td>Outgoing</td>"));
        assert!(html.contains("<td>Answered</td>"));
        assert!(html.contains("<td>1 minute and 5 seconds</td>"));
        assert!(html.contains("<p>05/01/2024 - 06/01/2024</p>"));
    }

    #[test]
    fn attachment_names_are_filesystem_safe() {
        assert_eq!(
            attachment_name("Telephone services from 05. 01. 2024 to 05. 31. 2024"),
            "Telephone_services_from_05._01._2024_to_05._31._2024.pdf"
        );
        assert_eq!(attachment_name("a:b/c?"), "a-b-c.pdf");
        assert_eq!(attachment_name("  "), "calls.pdf");
    }

    #[test]
    fn listing_counts_and_totals_calls() {
        use crate::in_memory::{InMemoryUsageSource, StaticPdfRenderer};

        let usage = InMemoryUsageSource::new().with_calls(
            7,
            vec![
                call("1", true, 10, Decimal::new(150, 2)),
                call("2", false, 0, Decimal::new(25, 2)),
            ],
        );
        let pdf = StaticPdfRenderer::new();
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        let listing = render_call_listing(&usage, &pdf, 7, 1, today).unwrap();
        assert_eq!(listing.calls_count, 2);
        assert_eq!(listing.total, Decimal::new(175, 2));
        assert_eq!(listing.range, "05/15/2024 - 06/15/2024");
        assert_eq!(pdf.render_count(), 1);
    }
}
