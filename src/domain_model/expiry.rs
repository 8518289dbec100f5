use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Expiry as issuers send it: epoch seconds or a datetime string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiryValue {
    EpochSeconds(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpiryParseError {
    #[error("unrecognized datetime: {0:?}")]
    Unrecognized(String),
    #[error("epoch seconds out of range: {0}")]
    OutOfRange(f64),
}

impl ExpiryValue {
    pub fn normalize(&self) -> Result<DateTime<Utc>, ExpiryParseError> {
        match self {
            ExpiryValue::EpochSeconds(secs) => {
                let millis = (secs * 1000.0).round();
                if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
                    return Err(ExpiryParseError::OutOfRange(*secs));
                }
                DateTime::from_timestamp_millis(millis as i64)
                    .ok_or(ExpiryParseError::OutOfRange(*secs))
            }
            ExpiryValue::Text(text) => parse_datetime(text),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, ExpiryValue::Text(text) if text.trim().is_empty())
    }
}

impl From<i64> for ExpiryValue {
    fn from(secs: i64) -> Self {
        ExpiryValue::EpochSeconds(secs as f64)
    }
}

impl From<&str> for ExpiryValue {
    fn from(text: &str) -> Self {
        ExpiryValue::Text(text.to_owned())
    }
}

impl From<String> for ExpiryValue {
    fn from(text: String) -> Self {
        ExpiryValue::Text(text)
    }
}

impl From<DateTime<Utc>> for ExpiryValue {
    fn from(at: DateTime<Utc>) -> Self {
        ExpiryValue::Text(canonical_iso(&at))
    }
}

/// Parses the datetime shapes seen from issuers. Strings without an offset are UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ExpiryParseError> {
    let text = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(at) = DateTime::parse_from_str(text, format) {
            return Ok(at.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(ExpiryParseError::Unrecognized(raw.to_owned()))
}

/// The persisted form: `2023-11-14T22:13:20.000Z`.
pub fn canonical_iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
