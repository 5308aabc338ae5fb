//! Borrower Records
//!
//! Defines the typed `BorrowerRecord` accepted by the dispatch orchestrator and
//! the canonicalization step that turns a loose ingestion row (a CSV-derived
//! JSON object with either canonical or legacy column names) into one record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const PHONE: &[&str] = &["phone", "Mobile_No", "phone_no"];
const FIRST_NAME: &[&str] = &["first_name", "F_Name"];
const LAST_NAME: &[&str] = &["last_name", "L_Name"];
const CURRENT_BALANCE: &[&str] = &["current_balance", "Current_balance", "balance_to_pay"];
const INSTALLMENT_AMOUNT: &[&str] = &["installment_amount", "Installment_Amount", "installment"];
const LAST_PAYMENT_DATE: &[&str] = &["last_payment_date", "Date_of_last_payment", "last_date"];
const CHANNEL_PREFERENCE: &[&str] = &["channel_preference", "Channel_Preference"];
const START_DATE: &[&str] = &["start_date", "Disbursal_Date"];

/// Reasons a borrower row cannot become a `BorrowerRecord`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BorrowerError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid phone number '{0}': must be exactly 10 digits")]
    InvalidPhone(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("borrower row must be a JSON object")]
    NotAnObject,
}

/// The borrower's preferred contact medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPreference {
    Voice,
    Whatsapp,
    Other,
}

impl ChannelPreference {
    /// Resolves free-form text; anything unrecognised becomes `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "voice" => Self::Voice,
            "whatsapp" => Self::Whatsapp,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ChannelPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelPreference::Voice => write!(f, "voice"),
            ChannelPreference::Whatsapp => write!(f, "whatsapp"),
            ChannelPreference::Other => write!(f, "other"),
        }
    }
}

/// A validated borrower, immutable once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowerRecord {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub current_balance: f64,
    pub installment_amount: f64,
    pub last_payment_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    pub channel_preference: ChannelPreference,
}

/// The JSON blob handed to the calling agent through the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub balance_to_pay: f64,
    pub installment: f64,
    pub start_date: String,
    pub last_date: String,
    pub channel_preference: ChannelPreference,
}

/// Returns true when `phone` is exactly ten ASCII digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit())
}

impl BorrowerRecord {
    /// Canonicalizes a loose ingestion row into a typed record.
    ///
    /// Canonical field names always win over legacy aliases, so a row carrying
    /// both `first_name` and `F_Name` resolves to `first_name`.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, BorrowerError> {
        let phone = lookup(fields, PHONE)
            .map(normalize_phone)
            .ok_or(BorrowerError::MissingField("phone"))?;
        let first_name =
            lookup_text(fields, FIRST_NAME).ok_or(BorrowerError::MissingField("first_name"))?;
        let current_balance = lookup(fields, CURRENT_BALANCE)
            .ok_or(BorrowerError::MissingField("current_balance"))
            .and_then(|v| amount("current_balance", v))?;
        let installment_amount = lookup(fields, INSTALLMENT_AMOUNT)
            .ok_or(BorrowerError::MissingField("installment_amount"))
            .and_then(|v| amount("installment_amount", v))?;
        let channel_preference = lookup_text(fields, CHANNEL_PREFERENCE)
            .map(|raw| ChannelPreference::parse(&raw))
            .ok_or(BorrowerError::MissingField("channel_preference"))?;

        let record = Self {
            phone,
            first_name,
            last_name: lookup_text(fields, LAST_NAME).unwrap_or_default(),
            current_balance,
            installment_amount,
            last_payment_date: lookup_text(fields, LAST_PAYMENT_DATE).unwrap_or_default(),
            start_date: lookup_text(fields, START_DATE).filter(|s| !s.is_empty()),
            channel_preference,
        };
        record.validate()?;
        Ok(record)
    }

    /// Same as [`BorrowerRecord::from_fields`] for an arbitrary JSON value.
    pub fn from_value(value: &Value) -> Result<Self, BorrowerError> {
        value
            .as_object()
            .ok_or(BorrowerError::NotAnObject)
            .and_then(Self::from_fields)
    }

    /// Checks the invariants a record must hold before a dispatch may start.
    pub fn validate(&self) -> Result<(), BorrowerError> {
        if !is_valid_phone(&self.phone) {
            return Err(BorrowerError::InvalidPhone(self.phone.clone()));
        }
        if self.first_name.trim().is_empty() {
            return Err(BorrowerError::MissingField("first_name"));
        }
        check_amount("current_balance", self.current_balance)?;
        check_amount("installment_amount", self.installment_amount)?;
        Ok(())
    }

    /// The phone prefixed with the dialing country code, e.g. `+919876543210`.
    pub fn formatted_phone(&self, country_code: &str) -> String {
        format!("{}{}", country_code, self.phone)
    }

    /// Builds the metadata snapshot sent to the provider's agent.
    pub fn provider_metadata(&self, country_code: &str) -> ProviderMetadata {
        ProviderMetadata {
            phone: self.formatted_phone(country_code),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            balance_to_pay: self.current_balance,
            installment: self.installment_amount,
            start_date: self.start_date.clone().unwrap_or_default(),
            last_date: self.last_payment_date.clone(),
            channel_preference: self.channel_preference,
        }
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| !value.is_null())
}

fn lookup_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    lookup(fields, names).and_then(|value| match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Spreadsheet exports turn `9876543210` into `9876543210.0`; undo that.
fn normalize_phone(value: &Value) -> String {
    let raw = match value {
        Value::Number(n) => match n.as_u64() {
            Some(digits) => digits.to_string(),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| format!("{f:.0}"))
                .unwrap_or_else(|| n.to_string()),
        },
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    raw.strip_suffix(".0").map(str::to_string).unwrap_or(raw)
}

fn amount(field: &'static str, value: &Value) -> Result<f64, BorrowerError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let amount = parsed.ok_or_else(|| BorrowerError::InvalidValue {
        field,
        reason: format!("'{value}' is not a number"),
    })?;
    check_amount(field, amount)?;
    Ok(amount)
}

fn check_amount(field: &'static str, amount: f64) -> Result<(), BorrowerError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(BorrowerError::InvalidValue {
            field,
            reason: format!("{amount} must be a non-negative number"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_legacy_csv_row_is_canonicalized() {
        let fields = row(json!({
            "Mobile_No": 9876543210u64,
            "F_Name": "Asha",
            "L_Name": "Rao",
            "Current_balance": 15000.0,
            "Installment_Amount": "1200",
            "Date_of_last_payment": "2024-03-01",
            "Disbursal_Date": "2023-01-15",
            "Channel_Preference": "Voice"
        }));

        let record = BorrowerRecord::from_fields(&fields).unwrap();

        assert_eq!(record.phone, "9876543210");
        assert_eq!(record.first_name, "Asha");
        assert_eq!(record.last_name, "Rao");
        assert_eq!(record.current_balance, 15000.0);
        assert_eq!(record.installment_amount, 1200.0);
        assert_eq!(record.last_payment_date, "2024-03-01");
        assert_eq!(record.start_date.as_deref(), Some("2023-01-15"));
        assert_eq!(record.channel_preference, ChannelPreference::Voice);
    }

    #[test]
    fn test_canonical_names_take_precedence_over_aliases() {
        let fields = row(json!({
            "phone": "9876543210",
            "Mobile_No": "1111111111",
            "first_name": "Canonical",
            "F_Name": "Legacy",
            "current_balance": 10,
            "Current_balance": 99,
            "installment_amount": 1,
            "channel_preference": "voice",
            "Channel_Preference": "whatsapp"
        }));

        let record = BorrowerRecord::from_fields(&fields).unwrap();

        assert_eq!(record.phone, "9876543210");
        assert_eq!(record.first_name, "Canonical");
        assert_eq!(record.current_balance, 10.0);
        assert_eq!(record.channel_preference, ChannelPreference::Voice);
    }

    #[test]
    fn test_null_canonical_falls_back_to_alias() {
        let fields = row(json!({
            "phone": null,
            "Mobile_No": "9876543210",
            "F_Name": "Asha",
            "Current_balance": 1,
            "Installment_Amount": 1,
            "Channel_Preference": "voice"
        }));

        let record = BorrowerRecord::from_fields(&fields).unwrap();
        assert_eq!(record.phone, "9876543210");
    }

    #[test]
    fn test_spreadsheet_float_phone_is_normalized() {
        let fields = row(json!({
            "Mobile_No": "9876543210.0",
            "F_Name": "Asha",
            "Current_balance": 1,
            "Installment_Amount": 1,
            "Channel_Preference": "voice"
        }));

        assert_eq!(BorrowerRecord::from_fields(&fields).unwrap().phone, "9876543210");
    }

    #[test]
    fn test_fractional_numeric_phone_is_not_rounded() {
        let fields = row(json!({
            "Mobile_No": 9876543210.7,
            "F_Name": "Asha",
            "Current_balance": 1,
            "Installment_Amount": 1,
            "Channel_Preference": "voice"
        }));

        assert_eq!(
            BorrowerRecord::from_fields(&fields).unwrap_err(),
            BorrowerError::InvalidPhone("9876543210.7".to_string())
        );

        let fields = row(json!({
            "Mobile_No": 9876543210.0,
            "F_Name": "Asha",
            "Current_balance": 1,
            "Installment_Amount": 1,
            "Channel_Preference": "voice"
        }));
        assert_eq!(BorrowerRecord::from_fields(&fields).unwrap().phone, "9876543210");
    }

    #[test]
    fn test_missing_required_field() {
        let fields = row(json!({
            "Mobile_No": "9876543210",
            "F_Name": "Asha",
            "Installment_Amount": 1,
            "Channel_Preference": "voice"
        }));

        assert_eq!(
            BorrowerRecord::from_fields(&fields).unwrap_err(),
            BorrowerError::MissingField("current_balance")
        );
    }

    #[test]
    fn test_invalid_phone_is_rejected() {
        for phone in ["12345", "98765432101", "98765abcde", ""] {
            let fields = row(json!({
                "phone": phone,
                "first_name": "Asha",
                "current_balance": 1,
                "installment_amount": 1,
                "channel_preference": "voice"
            }));
            assert!(matches!(
                BorrowerRecord::from_fields(&fields),
                Err(BorrowerError::InvalidPhone(_))
            ));
        }
    }

    #[test]
    fn test_negative_and_non_numeric_amounts_are_rejected() {
        let negative = row(json!({
            "phone": "9876543210",
            "first_name": "Asha",
            "current_balance": -5,
            "installment_amount": 1,
            "channel_preference": "voice"
        }));
        assert!(matches!(
            BorrowerRecord::from_fields(&negative),
            Err(BorrowerError::InvalidValue { field: "current_balance", .. })
        ));

        let garbage = row(json!({
            "phone": "9876543210",
            "first_name": "Asha",
            "current_balance": 5,
            "installment_amount": "twelve",
            "channel_preference": "voice"
        }));
        assert!(matches!(
            BorrowerRecord::from_fields(&garbage),
            Err(BorrowerError::InvalidValue { field: "installment_amount", .. })
        ));
    }

    #[test]
    fn test_non_object_row() {
        assert_eq!(
            BorrowerRecord::from_value(&json!(["9876543210"])).unwrap_err(),
            BorrowerError::NotAnObject
        );
    }

    #[test]
    fn test_channel_preference_parse() {
        assert_eq!(ChannelPreference::parse(" VOICE "), ChannelPreference::Voice);
        assert_eq!(ChannelPreference::parse("WhatsApp"), ChannelPreference::Whatsapp);
        assert_eq!(ChannelPreference::parse("sms"), ChannelPreference::Other);
        assert_eq!(ChannelPreference::Whatsapp.to_string(), "whatsapp");
    }

    #[test]
    fn test_provider_metadata_uses_country_code() {
        let record = BorrowerRecord {
            phone: "9876543210".into(),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            current_balance: 15000.0,
            installment_amount: 1200.0,
            last_payment_date: "2024-03-01".into(),
            start_date: None,
            channel_preference: ChannelPreference::Voice,
        };

        let metadata = record.provider_metadata("+91");

        assert_eq!(metadata.phone, "+919876543210");
        assert_eq!(metadata.balance_to_pay, 15000.0);
        assert_eq!(metadata.installment, 1200.0);
        assert_eq!(metadata.start_date, "");
        assert_eq!(metadata.last_date, "2024-03-01");

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["channel_preference"], "voice");
    }
}
