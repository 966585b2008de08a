//! Accounting system adapter: AbraFlexi REST API over blocking HTTP.
//!
//! Documents are exchanged in the `winstrom` JSON envelope. Codes are sent
//! as `code:` references, structured idempotency keys as `ext:` identifiers.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::debug;

use voipbill_core::{CustomerCode, DocumentCode, DocumentKind, ProductCode};
use voipbill_invoicing::{Invoice, InvoiceDraft};
use voipbill_parties::{Address, CustomerRef, Party, PartyDraft};
use voipbill_sales::{LineItem, Order, OrderDraft, OrderState};
use voipbill_usage::provider::lenient_id;

use crate::error::{InfraError, InfraResult};
use crate::ports::{AccountingSystem, Attachment, InvoiceQuery, OrderQuery};

const ORDERS: &str = "objednavka-prijata";
const INVOICES: &str = "faktura-vydana";
const ADDRESS_BOOK: &str = "adresar";

const STATE_PREPARED: &str = "stavDoklObch.pripraveno";
const STATE_DONE: &str = "stavDoklObch.hotovo";
const LOCK_OPEN: &str = "zamek.otevreno";
const MAIL_HOLD: &str = "stavMail.neodesilat";
const MAIL_QUEUED: &str = "stavMail.odeslat";
const EXT_PREFIX: &str = "ext:";

const DOCUMENT_COLUMNS: &str = "custom:kod,firma,nazFirmy,datVyst,popis,stavUzivK,zamekK,sumCelkem,storno,external-ids,\
polozkyDokladu(id,kod,nazev,cenaMj,mnozMj,cenik,stitky)";

#[derive(Debug, Clone)]
pub struct AbraFlexiConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub company: String,
    /// Order document type (`code:` prefix optional).
    pub order_type: String,
    /// Invoice document type (`code:` prefix optional).
    pub invoice_type: String,
    /// Accounting operation type of invoices (`typUcOp`).
    pub operation_type: String,
    pub timeout: Duration,
}

pub struct AbraFlexiClient {
    http: Client,
    config: AbraFlexiConfig,
}

fn code_ref(raw: &str) -> String {
    format!("code:{}", voipbill_core::uncode(raw))
}

fn state_value(state: OrderState) -> &'static str {
    match state {
        OrderState::Prepared => STATE_PREPARED,
        OrderState::Done => STATE_DONE,
    }
}

/// Filter literal; quotes cannot be escaped in the filter syntax.
fn literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', ""))
}

fn flexi_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Dates come back as `2024-06-02+02:00`.
fn parse_flexi_date(raw: &str) -> Option<NaiveDate> {
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn flexi_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        Some(Value::Number(n)) => n.to_string().parse().unwrap_or_default(),
        _ => Decimal::ZERO,
    })
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<u64>,
    #[serde(default)]
    kod: Option<String>,
    #[serde(default)]
    nazev: String,
    #[serde(rename = "cenaMj", default, deserialize_with = "decimal_or_zero")]
    unit_price: Decimal,
    #[serde(rename = "mnozMj", default, deserialize_with = "decimal_or_zero")]
    quantity: Decimal,
    #[serde(default)]
    cenik: Option<String>,
    #[serde(default)]
    stitky: Option<String>,
}

impl WireItem {
    fn into_line_item(self) -> LineItem {
        let quantity = if self.quantity.is_zero() { Decimal::ONE } else { self.quantity };
        LineItem {
            id: self.id,
            code: self.kod.filter(|k| !k.is_empty()),
            name: self.nazev,
            unit_price: self.unit_price,
            quantity,
            product: self
                .cenik
                .as_deref()
                .filter(|c| !c.is_empty())
                .and_then(|c| ProductCode::decode(c).ok()),
            labels: self
                .stitky
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(default)]
    kod: Option<String>,
    #[serde(default)]
    firma: Option<String>,
    #[serde(rename = "nazFirmy", default)]
    customer_name: String,
    #[serde(rename = "datVyst", default)]
    issue_date: String,
    #[serde(default)]
    popis: String,
    #[serde(rename = "stavUzivK", default)]
    state: String,
    #[serde(rename = "zamekK", default)]
    lock: String,
    #[serde(rename = "sumCelkem", default, deserialize_with = "decimal_or_zero")]
    total: Decimal,
    #[serde(default, deserialize_with = "flexi_bool")]
    storno: bool,
    #[serde(rename = "external-ids", default)]
    external_ids: Vec<String>,
    #[serde(rename = "polozkyDokladu", default)]
    items: Vec<WireItem>,
}

impl WireDocument {
    fn code(&self) -> Option<DocumentCode> {
        self.kod.as_deref().and_then(|k| DocumentCode::decode(k).ok())
    }

    fn customer_code(&self) -> Option<CustomerCode> {
        self.firma
            .as_deref()
            .filter(|f| !f.is_empty())
            .and_then(|f| CustomerCode::decode(f).ok())
    }

    fn external_ids(&self) -> Vec<String> {
        self.external_ids
            .iter()
            .map(|id| id.strip_prefix(EXT_PREFIX).unwrap_or(id).to_string())
            .collect()
    }

    fn issue_date(&self) -> InfraResult<NaiveDate> {
        parse_flexi_date(&self.issue_date)
            .ok_or_else(|| InfraError::decode(format!("document {:?}: bad issue date '{}'", self.kod, self.issue_date)))
    }

    fn into_order(self) -> InfraResult<Order> {
        let issue_date = self.issue_date()?;
        let customer = match self.customer_code() {
            Some(code) => CustomerRef::existing(code),
            None => {
                let name = if self.customer_name.is_empty() {
                    "unknown".to_string()
                } else {
                    self.customer_name.clone()
                };
                CustomerRef::inline(PartyDraft::new(name, Address::default(), "")?)
            }
        };

        Ok(Order {
            code: self.code(),
            customer,
            issue_date,
            state: if self.state == STATE_DONE {
                OrderState::Done
            } else {
                OrderState::Prepared
            },
            locked: !self.lock.is_empty() && self.lock != LOCK_OPEN,
            total: self.total,
            external_ids: self.external_ids(),
            cancelled: self.storno,
            description: self.popis,
            line_items: self.items.into_iter().map(WireItem::into_line_item).collect(),
        })
    }

    fn into_invoice(self) -> InfraResult<Invoice> {
        let issue_date = self.issue_date()?;
        let customer = self
            .customer_code()
            .ok_or_else(|| InfraError::decode(format!("invoice {:?} without customer", self.kod)))?;

        Ok(Invoice {
            code: self.code(),
            customer,
            issue_date,
            total: self.total,
            external_ids: self.external_ids(),
            cancelled: self.storno,
            description: self.popis,
            line_items: self.items.into_iter().map(WireItem::into_line_item).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireParty {
    kod: String,
    #[serde(default)]
    nazev: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    ulice: String,
    #[serde(default)]
    mesto: String,
    #[serde(default)]
    psc: String,
}

/// Records of `evidence` inside a `winstrom` envelope.
fn records<T: for<'de> Deserialize<'de>>(body: Value, evidence: &str) -> InfraResult<Vec<T>> {
    match body.get("winstrom").and_then(|w| w.get(evidence)) {
        Some(rows) => Ok(serde_json::from_value(rows.clone())?),
        None => Ok(Vec::new()),
    }
}

/// First error message of a rejected write.
fn rejection_message(body: &Value) -> Option<String> {
    body.pointer("/winstrom/results")?
        .as_array()?
        .iter()
        .filter_map(|r| r.get("errors")?.as_array()?.first()?.get("message")?.as_str())
        .map(str::to_string)
        .next()
}

fn line_payload(item: &LineItem) -> Value {
    let mut row = json!({
        "nazev": item.name,
        "cenaMj": item.unit_price.to_string(),
        "mnozMj": item.quantity.to_string(),
    });
    if let Some(product) = &item.product {
        row["cenik"] = Value::String(product.as_reference());
    }
    if !item.labels.is_empty() {
        row["stitky"] = Value::String(item.labels.join(","));
    }
    row
}

fn order_payload(draft: &OrderDraft, order_type: &str) -> Value {
    let mut order = json!({
        "id": [format!("{EXT_PREFIX}{}", draft.external_id())],
        "typDokl": code_ref(order_type),
        "stavUzivK": STATE_PREPARED,
        "zaokrNaSumK": "zaokrNa.zadne",
        "zaokrNaDphK": "zaokrNa.zadne",
        "datVyst": flexi_date(draft.issue_date),
        "popis": draft.description,
        "polozkyDokladu": draft.line_items.iter().map(line_payload).collect::<Vec<_>>(),
    });

    match &draft.customer {
        CustomerRef::Existing { code } => {
            order["firma"] = Value::String(code.as_reference());
        }
        CustomerRef::Inline { draft: party } => {
            order["nazFirmy"] = Value::String(party.name.clone());
            order["ulice"] = Value::String(party.address.street.clone());
            order["mesto"] = Value::String(party.address.city.clone());
            order["psc"] = Value::String(party.address.zip_code.clone());
            order["poznam"] = Value::String(party.note.clone());
        }
    }
    order
}

/// Invoices are held from mailing until the call listing is attached.
fn invoice_payload(draft: &InvoiceDraft, invoice_type: &str, operation_type: &str) -> Value {
    json!({
        "id": [format!("{EXT_PREFIX}{}", draft.external_id())],
        "typDokl": code_ref(invoice_type),
        "typUcOp": code_ref(operation_type),
        "stavMailK": MAIL_HOLD,
        "firma": draft.customer.as_reference(),
        "popis": draft.description,
        "duzpPuv": flexi_date(draft.taxable_date),
        "polozkyDokladu": draft.line_items.iter().map(line_payload).collect::<Vec<_>>(),
    })
}

fn order_filter(query: &OrderQuery, order_type: &str) -> String {
    let mut conditions = vec![
        format!("typDokl = {}", literal(&code_ref(order_type))),
        "storno = false".to_string(),
    ];
    if let Some(customer) = &query.customer {
        conditions.push(format!("firma = {}", literal(&customer.as_reference())));
    }
    if let Some(from) = query.issued_from {
        conditions.push(format!("datVyst >= {}", literal(&flexi_date(from))));
    }
    if let Some(to) = query.issued_to {
        conditions.push(format!("datVyst <= {}", literal(&flexi_date(to))));
    }
    if let Some(state) = query.state {
        conditions.push(format!("stavUzivK = {}", literal(state_value(state))));
    }
    format!("({})", conditions.join(" and "))
}

fn invoice_filter(query: &InvoiceQuery, invoice_type: &str) -> String {
    let mut conditions = vec![
        format!("typDokl = {}", literal(&code_ref(invoice_type))),
        "storno = false".to_string(),
    ];
    if let Some(customer) = &query.customer {
        conditions.push(format!("firma = {}", literal(&customer.as_reference())));
    }
    if let Some(from) = query.issued_from {
        conditions.push(format!("datVyst >= {}", literal(&flexi_date(from))));
    }
    if let Some(to) = query.issued_to {
        conditions.push(format!("datVyst <= {}", literal(&flexi_date(to))));
    }
    format!("({})", conditions.join(" and "))
}

impl AbraFlexiClient {
    pub fn new(config: AbraFlexiConfig) -> InfraResult<Self> {
        Url::parse(&config.url).map_err(|e| InfraError::Config(format!("ABRAFLEXI_URL: {e}")))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InfraError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// `{url}/c/{company}/{segments...}`
    fn url(&self, segments: &[&str]) -> InfraResult<Url> {
        let mut url = Url::parse(&self.config.url).map_err(|e| InfraError::Config(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| InfraError::Config("ABRAFLEXI_URL cannot be a base".to_string()))?;
            path.pop_if_empty().push("c").push(&self.config.company);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn json_url(&self, evidence: &str, tail: &str) -> InfraResult<Url> {
        self.url(&[evidence, &format!("{tail}.json")])
    }

    fn check(response: Response) -> InfraResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        if status.as_u16() == 400 {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| rejection_message(&v))
                .unwrap_or(body);
            return Err(InfraError::rejected(message));
        }
        Err(InfraError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn get(&self, url: Url, query: &[(&str, &str)]) -> InfraResult<Value> {
        debug!(%url, "accounting query");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.login, Some(&self.config.password))
            .query(query)
            .send()?;
        Ok(Self::check(response)?.json()?)
    }

    /// POST one record into `evidence`; returns the write result.
    fn write(&self, evidence: &str, record: Value) -> InfraResult<Value> {
        let url = self.url(&[&format!("{evidence}.json")])?;
        let body = json!({ "winstrom": { evidence: [record] } });
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.login, Some(&self.config.password))
            .query(&[("code-in-response", "true")])
            .json(&body)
            .send()?;
        Ok(Self::check(response)?.json()?)
    }

    fn created_code(result: &Value) -> InfraResult<DocumentCode> {
        let code = result
            .pointer("/winstrom/results/0/code")
            .and_then(Value::as_str)
            .ok_or_else(|| InfraError::decode("write result without code"))?;
        Ok(DocumentCode::decode(code)?)
    }

    /// Records addressed by an `ext:` identifier; an unknown id is an empty result.
    fn by_external_id(&self, evidence: &str, external_id: &str) -> InfraResult<Vec<WireDocument>> {
        let url = self.json_url(evidence, &format!("{EXT_PREFIX}{external_id}"))?;
        match self.get(url, &[("detail", DOCUMENT_COLUMNS)]) {
            Err(InfraError::Status { status: 404, .. }) => Ok(Vec::new()),
            other => records(other?, evidence),
        }
    }

    fn order_action(&self, code: &DocumentCode, action: &str) -> InfraResult<()> {
        self.write(ORDERS, json!({ "id": code.as_reference(), "@action": action }))?;
        Ok(())
    }
}

impl AccountingSystem for AbraFlexiClient {
    fn find_orders(&self, query: &OrderQuery) -> InfraResult<Vec<Order>> {
        if let Some(external_id) = &query.external_id {
            let orders = self
                .by_external_id(ORDERS, external_id)?
                .into_iter()
                .map(WireDocument::into_order)
                .collect::<InfraResult<Vec<_>>>()?;
            return Ok(orders.into_iter().filter(|o| query.matches(o)).collect());
        }

        let url = self.json_url(ORDERS, &order_filter(query, &self.config.order_type))?;
        let body = self.get(
            url,
            &[("detail", DOCUMENT_COLUMNS), ("order", "datVyst@A"), ("limit", "0")],
        )?;
        records::<WireDocument>(body, ORDERS)?
            .into_iter()
            .map(WireDocument::into_order)
            .collect()
    }

    fn find_invoices(&self, query: &InvoiceQuery) -> InfraResult<Vec<Invoice>> {
        if let Some(external_id) = &query.external_id {
            let invoices = self
                .by_external_id(INVOICES, external_id)?
                .into_iter()
                .map(WireDocument::into_invoice)
                .collect::<InfraResult<Vec<_>>>()?;
            return Ok(invoices.into_iter().filter(|i| query.matches(i)).collect());
        }

        let url = self.json_url(INVOICES, &invoice_filter(query, &self.config.invoice_type))?;
        let body = self.get(url, &[("detail", DOCUMENT_COLUMNS), ("limit", "0")])?;
        records::<WireDocument>(body, INVOICES)?
            .into_iter()
            .map(WireDocument::into_invoice)
            .collect()
    }

    fn last_order_date(&self) -> InfraResult<Option<NaiveDate>> {
        let url = self.json_url(ORDERS, &order_filter(&OrderQuery::default(), &self.config.order_type))?;
        let body = self.get(
            url,
            &[("detail", "custom:kod,datVyst"), ("order", "datVyst@D"), ("limit", "1")],
        )?;
        Ok(records::<WireDocument>(body, ORDERS)?
            .first()
            .and_then(|d| parse_flexi_date(&d.issue_date)))
    }

    fn create_order(&self, draft: &OrderDraft) -> InfraResult<DocumentCode> {
        let result = self.write(ORDERS, order_payload(draft, &self.config.order_type))?;
        Self::created_code(&result)
    }

    fn create_invoice(&self, draft: &InvoiceDraft) -> InfraResult<DocumentCode> {
        let result = self.write(INVOICES, invoice_payload(draft, &self.config.invoice_type, &self.config.operation_type))?;
        Self::created_code(&result)
    }

    fn queue_invoice_mail(&self, code: &DocumentCode) -> InfraResult<()> {
        self.write(
            INVOICES,
            json!({
                "id": code.as_reference(),
                "typDokl": code_ref(&self.config.invoice_type),
                "stavMailK": MAIL_QUEUED,
            }),
        )?;
        Ok(())
    }

    fn set_order_state(&self, code: &DocumentCode, state: OrderState) -> InfraResult<()> {
        self.write(
            ORDERS,
            json!({
                "id": code.as_reference(),
                "typDokl": code_ref(&self.config.order_type),
                "stavUzivK": state_value(state),
            }),
        )?;
        Ok(())
    }

    fn lock_order(&self, code: &DocumentCode) -> InfraResult<()> {
        self.order_action(code, "lock")
    }

    fn unlock_order(&self, code: &DocumentCode) -> InfraResult<()> {
        self.order_action(code, "unlock")
    }

    fn party_exists(&self, code: &CustomerCode) -> InfraResult<bool> {
        match self.load_party(code) {
            Ok(_) => Ok(true),
            Err(InfraError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn load_party(&self, code: &CustomerCode) -> InfraResult<Party> {
        let url = self.json_url(ADDRESS_BOOK, &code.as_reference())?;
        let body = match self.get(url, &[("detail", "custom:kod,nazev,email,ulice,mesto,psc")]) {
            Err(InfraError::Status { status: 404, .. }) => {
                return Err(InfraError::not_found(format!("party {code}")));
            }
            other => other?,
        };

        let party = records::<WireParty>(body, ADDRESS_BOOK)?
            .into_iter()
            .next()
            .ok_or_else(|| InfraError::not_found(format!("party {code}")))?;

        Ok(Party {
            code: CustomerCode::decode(&party.kod)?,
            name: party.nazev,
            email: party.email.filter(|e| !e.trim().is_empty()),
            address: Address {
                street: party.ulice,
                city: party.mesto,
                zip_code: party.psc,
            },
        })
    }

    fn attach(&self, kind: DocumentKind, code: &DocumentCode, attachment: &Attachment) -> InfraResult<()> {
        let evidence = match kind {
            DocumentKind::Order => ORDERS,
            DocumentKind::Invoice => INVOICES,
        };
        let url = self.url(&[
            evidence,
            &code.as_reference(),
            "prilohy",
            "new",
            &attachment.file_name,
        ])?;
        let response = self
            .http
            .put(url)
            .basic_auth(&self.config.login, Some(&self.config.password))
            .header(reqwest::header::CONTENT_TYPE, attachment.content_type.as_str())
            .body(attachment.content.clone())
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn document_url(&self, kind: DocumentKind, code: &DocumentCode) -> String {
        let evidence = match kind {
            DocumentKind::Order => ORDERS,
            DocumentKind::Invoice => INVOICES,
        };
        self.url(&[evidence, &code.as_reference()])
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}/c/{}/{}/{}", self.config.url, self.config.company, evidence, code.as_reference()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voipbill_core::{DocumentKey, DocumentKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn client() -> AbraFlexiClient {
        AbraFlexiClient::new(AbraFlexiConfig {
            url: "https://erp.example.test:5434".into(),
            login: "api".into(),
            password: "secret".into(),
            company: "demo_s_r_o_".into(),
            order_type: "code:OBP_VOIP".into(),
            invoice_type: "FAKTURA".into(),
            operation_type: "TRŽBA SLUŽBY INT".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn order_filter_combines_conditions() {
        let query = OrderQuery::for_customer(CustomerCode::decode("ACME").unwrap())
            .issued_from(date(2024, 5, 1))
            .prepared();
        assert_eq!(
            order_filter(&query, "OBP_VOIP"),
            "(typDokl = 'code:OBP_VOIP' and storno = false and firma = 'code:ACME' \
             and datVyst >= '2024-05-01' and stavUzivK = 'stavDoklObch.pripraveno')"
        );
    }

    #[test]
    fn urls_are_company_scoped() {
        let client = client();
        let url = client.json_url(ORDERS, "(storno = false)").unwrap();
        assert!(url.as_str().starts_with("https://erp.example.test:5434/c/demo_s_r_o_/objednavka-prijata/"));
        assert!(url.as_str().ends_with(".json"));
        assert_eq!(
            client.document_url(DocumentKind::Invoice, &DocumentCode::decode("VF1-0001/2024").unwrap()),
            "https://erp.example.test:5434/c/demo_s_r_o_/faktura-vydana/code:VF1-0001%2F2024"
        );
    }

    #[test]
    fn external_id_lookup_addresses_the_record() {
        let url = client()
            .json_url(ORDERS, &format!("{EXT_PREFIX}voipbill:order:NEWCO:2024-05-01:2024-05-31"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://erp.example.test:5434/c/demo_s_r_o_/objednavka-prijata/ext:voipbill:order:NEWCO:2024-05-01:2024-05-31.json"
        );
    }

    #[test]
    fn decodes_order_rows() {
        let body = json!({
            "winstrom": {
                "@version": "1.0",
                "objednavka-prijata": [{
                    "kod": "OBP0007/2024",
                    "firma": "code:ACME",
                    "firma@showAs": "ACME: Acme s.r.o.",
                    "datVyst": "2024-06-02+02:00",
                    "popis": "Telephone services from 05. 01. 2024 to 05. 31. 2024",
                    "stavUzivK": "stavDoklObch.pripraveno",
                    "zamekK": "zamek.zamceno",
                    "sumCelkem": "145.20",
                    "storno": "false",
                    "external-ids": ["ext:voipbill:order:ACME:2024-05-01:2024-05-31"],
                    "polozkyDokladu": [
                        {"id": "31", "kod": "IPEX_POSTPAID", "nazev": "Telephone services", "cenaMj": "120.0", "mnozMj": "1.0"}
                    ]
                }]
            }
        });

        let orders: Vec<Order> = records::<WireDocument>(body, ORDERS)
            .unwrap()
            .into_iter()
            .map(|d| d.into_order().unwrap())
            .collect();
        let order = &orders[0];

        assert_eq!(order.issue_date, date(2024, 6, 2));
        assert!(order.locked);
        assert!(order.is_prepared());
        assert_eq!(order.total, Decimal::new(14520, 2));
        assert_eq!(order.customer_code().unwrap().as_str(), "ACME");
        assert_eq!(order.line_items[0].id, Some(31));
        assert!(order.line_items[0].is_product(&ProductCode::decode("IPEX_POSTPAID").unwrap()));

        let key = DocumentKey::new(
            DocumentKind::Order,
            CustomerCode::decode("ACME").unwrap(),
            date(2024, 5, 1),
            date(2024, 5, 31),
        );
        use voipbill_core::Fingerprinted;
        assert!(order.has_external_id(&key));
    }

    #[test]
    fn inline_customer_is_written_as_address_fields() {
        let draft = OrderDraft {
            key: DocumentKey::new(
                DocumentKind::Order,
                CustomerCode::decode("NEW").unwrap(),
                date(2024, 5, 1),
                date(2024, 5, 31),
            ),
            customer: CustomerRef::inline(
                PartyDraft::new(
                    "New Co",
                    Address {
                        street: "Main 1".into(),
                        city: "Brno".into(),
                        zip_code: "60200".into(),
                    },
                    "Ipex: 9",
                )
                .unwrap(),
            ),
            issue_date: date(2024, 6, 2),
            description: "Telephone services".into(),
            line_items: vec![LineItem::usage(
                "Telephone services",
                Decimal::new(99, 0),
                ProductCode::decode("IPEX_POSTPAID").unwrap(),
            )],
        };

        let payload = order_payload(&draft, "OBP_VOIP");
        assert!(payload.get("firma").is_none());
        assert_eq!(payload["nazFirmy"], "New Co");
        assert_eq!(payload["poznam"], "Ipex: 9");
        assert_eq!(payload["typDokl"], "code:OBP_VOIP");
        assert_eq!(payload["id"][0], "ext:voipbill:order:NEW:2024-05-01:2024-05-31");
        assert_eq!(payload["polozkyDokladu"][0]["cenik"], "code:IPEX_POSTPAID");
        assert_eq!(payload["polozkyDokladu"][0]["stitky"], "API_IPEX");
    }

    #[test]
    fn invoice_is_created_held_from_mailing_with_operation_type() {
        let draft = InvoiceDraft {
            key: DocumentKey::new(
                DocumentKind::Invoice,
                CustomerCode::decode("ACME").unwrap(),
                date(2024, 4, 2),
                date(2024, 5, 2),
            ),
            customer: CustomerCode::decode("ACME").unwrap(),
            description: "Telephone services".into(),
            taxable_date: date(2024, 5, 2),
            line_items: Vec::new(),
            source_orders: Vec::new(),
        };

        let payload = invoice_payload(&draft, "FAKTURA", "TRŽBA SLUŽBY INT");
        assert_eq!(payload["typUcOp"], "code:TRŽBA SLUŽBY INT");
        assert_eq!(payload["stavMailK"], MAIL_HOLD);
        assert_eq!(payload["firma"], "code:ACME");
        assert_eq!(payload["duzpPuv"], "2024-05-02");
    }

    #[test]
    fn rejection_message_is_extracted() {
        let body = json!({
            "winstrom": {
                "success": "false",
                "results": [{"errors": [{"message": "Doklad je uzamčen"}]}]
            }
        });
        assert_eq!(rejection_message(&body).as_deref(), Some("Doklad je uzamčen"));
    }
}
