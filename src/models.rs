use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use phonenumber::country::Id as CountryId;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

use crate::errors::AppError;

/// Country code sent on every signer phone. The provider only serves Brazil.
pub const SIGNER_COUNTRY_CODE: &str = "55";

// ============ Consult status ============

/// Lifecycle status of a consult, as decided by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConsultStatus {
    WaitingConsent,
    ConsentApproved,
    WaitingConsult,
    WaitingCreditAnalysis,
    Success,
    Failed,
    Rejected,
    /// Any value outside the known set; the raw value is kept for echoing.
    Unknown(String),
}

impl ConsultStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConsultStatus::WaitingConsent => "WAITING_CONSENT",
            ConsultStatus::ConsentApproved => "CONSENT_APPROVED",
            ConsultStatus::WaitingConsult => "WAITING_CONSULT",
            ConsultStatus::WaitingCreditAnalysis => "WAITING_CREDIT_ANALYSIS",
            ConsultStatus::Success => "SUCCESS",
            ConsultStatus::Failed => "FAILED",
            ConsultStatus::Rejected => "REJECTED",
            ConsultStatus::Unknown(raw) => raw,
        }
    }

    /// Human-readable meaning of the status. Total over every value.
    pub fn translate(&self) -> &'static str {
        match self {
            ConsultStatus::WaitingConsent => "waiting for the borrower to grant consent",
            ConsultStatus::ConsentApproved => "consent approved by the borrower",
            ConsultStatus::WaitingConsult => "consent approved, waiting for the margin consult",
            ConsultStatus::WaitingCreditAnalysis => "waiting for credit analysis",
            ConsultStatus::Success => "consult finished, margin available",
            ConsultStatus::Failed => "consult failed at the provider",
            ConsultStatus::Rejected => "consult rejected",
            ConsultStatus::Unknown(_) => "unknown status",
        }
    }
}

impl From<String> for ConsultStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "WAITING_CONSENT" => ConsultStatus::WaitingConsent,
            "CONSENT_APPROVED" => ConsultStatus::ConsentApproved,
            "WAITING_CONSULT" => ConsultStatus::WaitingConsult,
            "WAITING_CREDIT_ANALYSIS" => ConsultStatus::WaitingCreditAnalysis,
            "SUCCESS" => ConsultStatus::Success,
            "FAILED" => ConsultStatus::Failed,
            "REJECTED" => ConsultStatus::Rejected,
            _ => ConsultStatus::Unknown(raw),
        }
    }
}

impl From<&str> for ConsultStatus {
    fn from(raw: &str) -> Self {
        ConsultStatus::from(raw.to_string())
    }
}

impl From<ConsultStatus> for String {
    fn from(status: ConsultStatus) -> Self {
        status.as_str().to_string()
    }
}

impl Default for ConsultStatus {
    fn default() -> Self {
        ConsultStatus::Unknown(String::new())
    }
}

impl fmt::Display for ConsultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Inbound requests ============

/// Body of `POST /clt/consult`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultRequest {
    #[serde(default, alias = "documentNumber")]
    pub document_number: String,
    pub gender: Option<String>,
    #[serde(alias = "birthDate")]
    pub birth_date: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "phoneNumber")]
    pub phone_number: Option<String>,
    #[serde(alias = "areaCode")]
    pub area_code: Option<String>,
}

impl ConsultRequest {
    /// Builds the provider payload, normalizing the document number and
    /// splitting the signer phone when no area code was given.
    pub fn into_payload(self) -> Result<ConsultPayload, AppError> {
        let document_number = normalize_document(&self.document_number);
        if document_number.is_empty() {
            return Err(AppError::Validation(
                "document_number is required".to_string(),
            ));
        }

        let (area_code, phone_number) = match (self.area_code, self.phone_number) {
            (Some(area), phone) if !area.trim().is_empty() => (
                Some(digits_only(&area)),
                phone.map(|p| digits_only(&p)),
            ),
            (_, Some(phone)) => match split_br_phone(&phone) {
                Some((area, number)) => (Some(area), Some(number)),
                None => (None, Some(digits_only(&phone))),
            },
            (_, None) => (None, None),
        };

        Ok(ConsultPayload {
            borrower_document_number: document_number,
            gender: self.gender,
            birth_date: self.birth_date,
            signer_name: self.name,
            signer_email: self.email,
            signer_phone: SignerPhone {
                phone_number,
                country_code: SIGNER_COUNTRY_CODE.to_string(),
                area_code,
            },
        })
    }
}

/// Body of `POST /clt/consult/find` and `POST /clt/consult/margem`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupRequest {
    #[serde(default, alias = "documentNumber")]
    pub document_number: String,
    /// RFC 3339 timestamp, or a bare `YYYY-MM-DD` meaning the start of that day.
    #[serde(default, alias = "startDate", deserialize_with = "de_window_start")]
    pub start_date: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp, or a bare `YYYY-MM-DD` meaning the end of that day.
    #[serde(default, alias = "endDate", deserialize_with = "de_window_end")]
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Body of `POST /clt/consult/authorize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(alias = "consultId")]
    pub consult_id: Option<String>,
}

// ============ Outbound payloads ============

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultPayload {
    pub borrower_document_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_email: Option<String>,
    pub signer_phone: SignerPhone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerPhone {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
}

// ============ Provider records ============

/// One page of a provider listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A consult as returned by the consult listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultRecord {
    #[serde(default, deserialize_with = "de_record_id")]
    pub id: Option<String>,
    #[serde(default, alias = "borrowerDocumentNumber")]
    pub document_number: Option<String>,
    #[serde(default)]
    pub status: ConsultStatus,
    #[serde(default, deserialize_with = "de_margin")]
    pub available_margin_value: Option<f64>,
}

/// An operation as returned by the operation listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    #[serde(default)]
    pub consult_id: Option<String>,
    #[serde(default)]
    pub status: ConsultStatus,
    #[serde(default)]
    pub borrower: Option<OperationBorrower>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBorrower {
    #[serde(default)]
    pub document_number: Option<String>,
}

/// Record ids arrive as strings or numbers; anything else reads as missing.
fn de_record_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_window_start<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    de_window_bound(deserializer, NaiveTime::MIN)
}

fn de_window_end<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    de_window_bound(deserializer, end_of_day)
}

fn de_window_bound<'de, D>(
    deserializer: D,
    date_only_time: NaiveTime,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_window_bound(raw, date_only_time)
        .map(Some)
        .ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid date '{}', expected RFC 3339 or YYYY-MM-DD",
                raw
            ))
        })
}

fn parse_window_bound(raw: &str, date_only_time: NaiveTime) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(date_only_time).and_utc())
        })
}

/// Margin values arrive either as JSON numbers or as decimal strings.
fn de_margin<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    })
}

// ============ Search filter ============

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;

/// Query sent to a provider listing endpoint. Built fresh for every search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilter {
    pub document_number: String,
    pub page: u32,
    pub limit: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub provedor: String,
}

impl SearchFilter {
    /// Filter over the last `lookback_days` days ending now.
    pub fn new(document_number: &str, provedor: &str, lookback_days: i64) -> Self {
        let end = Utc::now();
        Self {
            document_number: normalize_document(document_number),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            start: end - Duration::days(lookback_days),
            end,
            provedor: provedor.to_string(),
        }
    }

    /// Overrides the window bounds that were supplied; the other bound keeps
    /// its default.
    pub fn with_window(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        if let Some(start) = start {
            self.start = start;
        }
        if let Some(end) = end {
            self.end = end;
        }
        self
    }

    pub fn with_pagination(mut self, page: Option<u32>, limit: Option<u32>) -> Self {
        if let Some(page) = page.filter(|p| *p > 0) {
            self.page = page;
        }
        if let Some(limit) = limit.filter(|l| *l > 0) {
            self.limit = limit;
        }
        self
    }

    /// Query parameters in the form the consult listing endpoint expects.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search", self.document_number.clone()),
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("provedor", self.provedor.clone()),
            ("startDate", self.start.to_rfc3339()),
            ("endDate", self.end.to_rfc3339()),
        ]
    }
}

// ============ Responses ============

/// A consult recovered from an existing provider record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReusedConsult {
    pub consult_id: String,
    pub status: ConsultStatus,
    pub reused: bool,
}

/// Result of create-or-reuse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConsultOutcome {
    /// Fresh creation; the provider body is returned as-is.
    Created(Value),
    Reused(ReusedConsult),
}

impl ConsultOutcome {
    pub fn is_reused(&self) -> bool {
        matches!(self, ConsultOutcome::Reused(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
    pub consult_id: String,
    pub status: ConsultStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginResult {
    pub consult_id: String,
    pub status: ConsultStatus,
    pub status_translated: String,
    pub available_margin_value: Option<f64>,
}

// ============ Normalization ============

fn non_digits() -> &'static Regex {
    static NON_DIGITS: OnceLock<Regex> = OnceLock::new();
    NON_DIGITS.get_or_init(|| Regex::new(r"\D").unwrap())
}

fn digits_only(raw: &str) -> String {
    non_digits().replace_all(raw, "").into_owned()
}

/// Strips CPF formatting ("111.444.777-35" -> "11144477735").
pub fn normalize_document(raw: &str) -> String {
    digits_only(raw)
}

/// Splits a Brazilian phone into `(area_code, subscriber_number)`.
///
/// Accepts national ("11987654321"), formatted ("(11) 98765-4321") and E.164
/// ("+5511987654321") input. Returns `None` for anything that is not a valid
/// Brazilian number.
pub fn split_br_phone(raw: &str) -> Option<(String, String)> {
    if raw.trim().is_empty() {
        return None;
    }

    let number = match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) => number,
        Err(e) => {
            tracing::debug!("Failed to parse BR phone '{}': {:?}", raw, e);
            return None;
        }
    };

    if number.code().value() != 55 || !phonenumber::is_valid(&number) {
        tracing::debug!("Not a valid BR phone: {}", raw);
        return None;
    }

    let national = number.national().value().to_string();
    if national.len() < 10 {
        return None;
    }
    let (area, subscriber) = national.split_at(2);
    Some((area.to_string(), subscriber.to_string()))
}
