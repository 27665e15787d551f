use crate::payments::error::PaymentError;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Payment rails a transaction can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    Card,
    Qr,
    PayPal,
    Crypto,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Card,
        PaymentMethod::Qr,
        PaymentMethod::PayPal,
        PaymentMethod::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Qr => "QR",
            PaymentMethod::PayPal => "PAYPAL",
            PaymentMethod::Crypto => "CRYPTO",
        }
    }

    /// Numeric code used by the subscription API and table
    pub fn subscription_code(&self) -> i16 {
        match self {
            PaymentMethod::Card => 0,
            PaymentMethod::PayPal => 1,
            PaymentMethod::Crypto => 2,
            PaymentMethod::Qr => 3,
        }
    }

    pub fn from_subscription_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PaymentMethod::Card),
            1 => Some(PaymentMethod::PayPal),
            2 => Some(PaymentMethod::Crypto),
            3 => Some(PaymentMethod::Qr),
            _ => None,
        }
    }

    /// Methods whose instrument is a card forwarded to the bank gateway
    pub fn uses_bank_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Card | PaymentMethod::Qr)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "qr" | "qr_code" | "qrcode" | "ips" => Ok(PaymentMethod::Qr),
            "paypal" => Ok(PaymentMethod::PayPal),
            "crypto" => Ok(PaymentMethod::Crypto),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported payment method: {}", value),
                field: Some("paymentMethod".to_string()),
            }),
        }
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Lifecycle of a transaction. Codes are shared with the rails and the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Successful,
    InProgress,
    Failed,
    Error,
}

impl TransactionStatus {
    pub fn code(&self) -> i16 {
        match self {
            TransactionStatus::Successful => 0,
            TransactionStatus::InProgress => 1,
            TransactionStatus::Failed => 2,
            TransactionStatus::Error => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TransactionStatus::Successful),
            1 => Some(TransactionStatus::InProgress),
            2 => Some(TransactionStatus::Failed),
            3 => Some(TransactionStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Successful => "SUCCESSFUL",
            TransactionStatus::InProgress => "IN_PROGRESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::InProgress)
    }

    pub fn valid_transitions(&self) -> &'static [TransactionStatus] {
        match self {
            TransactionStatus::InProgress => &[
                TransactionStatus::Successful,
                TransactionStatus::Failed,
                TransactionStatus::Error,
            ],
            _ => &[],
        }
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "successful" | "success" => Ok(TransactionStatus::Successful),
            "inprogress" => Ok(TransactionStatus::InProgress),
            "failed" | "fail" => Ok(TransactionStatus::Failed),
            "error" => Ok(TransactionStatus::Error),
            _ => Err(PaymentError::ValidationError {
                message: format!("unknown transaction status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

impl Serialize for TransactionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

struct TransactionStatusVisitor;

impl<'de> Visitor<'de> for TransactionStatusVisitor {
    type Value = TransactionStatus;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a status code 0-3 or a status name")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        TransactionStatus::from_code(value)
            .ok_or_else(|| E::custom(format!("unknown status code {}", value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        let code = i64::try_from(value).map_err(|_| E::custom("status code out of range"))?;
        self.visit_i64(code)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for TransactionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TransactionStatusVisitor)
    }
}

/// Purchase request sent by a webshop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebShopPaymentRequest {
    pub merchant_id: i64,
    pub merchant_password: String,
    pub merchant_order_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    pub merchant_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_deadline: Option<DateTime<Utc>>,
}

/// Redirect target handed back to the webshop after a rail accepted the payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentStartResponse {
    #[serde(rename = "paymentURL")]
    pub payment_url: String,
    #[serde(rename = "tokenId")]
    pub token_id: Uuid,
    pub token: String,
    #[serde(rename = "tokenExp")]
    pub token_exp: DateTime<Utc>,
    #[serde(rename = "qrRef", default, skip_serializing_if = "Option::is_none")]
    pub qr_ref: Option<u64>,
}

/// Card instrument submitted by the card page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetailsRequest {
    pub card_number: String,
    pub merchant_order_id: Uuid,
    #[serde(deserialize_with = "deserialize_expiry")]
    pub exp_date: DateTime<Utc>,
    #[serde(default)]
    pub card_verification_code: Option<u32>,
}

/// Request the orchestrator forwards to the bank gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankPaymentRequest {
    pub exp_date: DateTime<Utc>,
    pub card_number: String,
    pub currency: String,
    pub amount: f64,
    pub merchant_id: i64,
    pub merchant_order_id: Uuid,
    pub transaction_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Final status reported by a rail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(default)]
    pub acquirer_order_id: Option<Uuid>,
    #[serde(default)]
    pub acquirer_timestamp: Option<DateTime<Utc>>,
    pub merchant_order_id: Uuid,
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
}

/// Outcome pushed to the webshop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebshopNotification {
    pub url: String,
    pub merchant_order_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusRequest {
    pub merchant_order_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionStatusResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body returned by the NBS IPS QR upload API
#[derive(Debug, Clone, Deserialize)]
pub struct NbsUploadResponse {
    pub s: NbsStatus,
    #[serde(default)]
    pub t: String,
    #[serde(default)]
    pub n: NbsPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbsStatus {
    pub code: i64,
    #[serde(default)]
    pub desc: String,
}

/// Decoded IPS fields. `RO` carries the payment reference (our qrRef).
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(non_snake_case)]
pub struct NbsPayload {
    #[serde(default)]
    pub K: String,
    #[serde(default)]
    pub V: String,
    #[serde(default)]
    pub C: String,
    #[serde(default)]
    pub R: String,
    #[serde(default)]
    pub N: String,
    #[serde(default)]
    pub I: String,
    #[serde(default)]
    pub P: String,
    #[serde(default)]
    pub SF: String,
    #[serde(default)]
    pub S: String,
    #[serde(default)]
    pub RO: String,
}

/// Parse a card expiry given either as RFC 3339 or as `MM/YY`.
///
/// `MM/YY` maps to the first day of that month, 00:00 UTC, in year 2000+YY.
pub fn parse_expiry_date(value: &str) -> Result<DateTime<Utc>, PaymentError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let invalid = |reason: &str| PaymentError::ValidationError {
        message: format!("invalid expiry date '{}': {}", value, reason),
        field: Some("expDate".to_string()),
    };

    let (month, year) = value
        .split_once('/')
        .ok_or_else(|| invalid("expected MM/YY"))?;
    let month: u32 = month
        .trim()
        .parse()
        .map_err(|_| invalid("month is not a number"))?;
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| invalid("year is not a number"))?;
    if !(1..=12).contains(&month) {
        return Err(invalid("month must be 1-12"));
    }
    if !(0..=99).contains(&year) {
        return Err(invalid("year must be two digits"));
    }

    NaiveDate::from_ymd_opt(2000 + year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| invalid("date out of range"))
}

fn deserialize_expiry<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_expiry_date(&raw).map_err(de::Error::custom)
}

/// QR payment reference derived from a UTC instant at millisecond resolution:
/// the digits of `YYYYMMDDhhmmss` followed by three digits of milliseconds.
pub fn generate_qr_ref(now: DateTime<Utc>) -> u64 {
    let seconds_part = now.year() as u64 * 10_000_000_000
        + now.month() as u64 * 100_000_000
        + now.day() as u64 * 1_000_000
        + now.hour() as u64 * 10_000
        + now.minute() as u64 * 100
        + now.second() as u64;
    let millis = (now.timestamp_subsec_millis() % 1000) as u64;
    seconds_part * 1000 + millis
}
