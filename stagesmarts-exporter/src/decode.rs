//! Decoders for the value encodings used by the PDU API.
//!
//! The device does not use JSON scalars the usual way:
//!
//! - booleans are the strings `"true"` and `"false"`
//! - numbers are decimal strings such as `"230.5"`
//! - channel identities are integer strings such as `"3"`
//! - almost every field is wrapped in a one-element array
//!
//! Each encoding is a `deserialize_with` function ([`bool_string`],
//! [`f64_string`], [`u8_string`]), picked by the field it annotates. The
//! singleton wrapper is a separate combinator, [`singleton`], layered over
//! any element type.
//!
//! Deserializer errors only carry a message, so the decoders raise a
//! [`DecodeErrorKind`] through `Error::custom` and [`decode`] recovers the
//! kind from that message together with the field path.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

const MALFORMED_NUMBER: &str = "malformed number: ";
const ARITY_PREFIX: &str = "expected list with single value, got ";
const ARITY_SUFFIX: &str = " values";

/// What went wrong while decoding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The payload is not valid JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected boolean encoding, expected \"true\" or \"false\"")]
    UnexpectedBooleanEncoding,

    #[error("unexpected numeric encoding, expected a number in a string")]
    UnexpectedNumericEncoding,

    #[error("malformed number: {0}")]
    MalformedNumber(String),

    #[error("malformed channel identity")]
    MalformedIdentity,

    #[error("expected list with single value, got {observed} values")]
    SingletonArityViolation { observed: usize },

    /// A node holds the wrong JSON type or lacks a required key.
    #[error("{0}")]
    UnexpectedShape(String),
}

impl DecodeErrorKind {
    /// Recover the kind from a deserializer error message.
    ///
    /// Messages not raised by the decoders of this module come from serde
    /// itself (wrong JSON type, missing key) and map to `UnexpectedShape`.
    fn from_message(message: &str) -> Self {
        let unit = [
            Self::UnexpectedBooleanEncoding,
            Self::UnexpectedNumericEncoding,
            Self::MalformedIdentity,
        ];
        if let Some(kind) = unit.into_iter().find(|kind| kind.to_string() == message) {
            return kind;
        }

        if let Some(text) = message.strip_prefix(MALFORMED_NUMBER) {
            return Self::MalformedNumber(text.to_string());
        }

        let observed = message
            .strip_prefix(ARITY_PREFIX)
            .and_then(|rest| rest.strip_suffix(ARITY_SUFFIX))
            .and_then(|count| count.parse().ok());
        match observed {
            Some(observed) => Self::SingletonArityViolation { observed },
            None => Self::UnexpectedShape(message.to_string()),
        }
    }
}

/// A decode failure together with the path of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode `{field}`: {kind}")]
pub struct DecodeError {
    /// Path such as `smartPDU.breakers[0].eStopStatus`, `.` for the
    /// document itself.
    pub field: String,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn invalid_json(error: serde_json::Error) -> Self {
        Self {
            field: String::new(),
            kind: DecodeErrorKind::InvalidJson(error.to_string()),
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for DecodeError {
    fn from(error: serde_path_to_error::Error<serde_json::Error>) -> Self {
        // Errors raised while walking a `Value` carry no line/column suffix
        Self {
            field: error.path().to_string(),
            kind: DecodeErrorKind::from_message(&error.inner().to_string()),
        }
    }
}

/// Decode `value` as `T`, reporting the path of the first failure.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, DecodeError> {
    Ok(serde_path_to_error::deserialize(value)?)
}

/// A boolean sent as the string `"true"` or `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BooleanReading(pub bool);

impl BooleanReading {
    /// Gauge value of the reading: `1.0` for true, `0.0` for false.
    pub fn as_f64(self) -> f64 {
        if self.0 { 1.0 } else { 0.0 }
    }
}

impl<'de> Deserialize<'de> for BooleanReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool_string(deserializer).map(Self)
    }
}

/// A floating point number sent as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericReading(pub f64);

impl NumericReading {
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for NumericReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64_string(deserializer).map(Self)
    }
}

/// `"true"` / `"false"`, case-sensitive.
pub fn bool_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)?.as_str() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(D::Error::custom(DecodeErrorKind::UnexpectedBooleanEncoding)),
    }
}

/// A finite decimal number in a string. JSON number literals are rejected.
pub fn f64_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::String(text) = Value::deserialize(deserializer)? else {
        return Err(D::Error::custom(DecodeErrorKind::UnexpectedNumericEncoding));
    };

    // `f64::from_str` also takes "inf" and "NaN", the device never sends those
    let plain_decimal = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));

    match text.parse::<f64>() {
        Ok(number) if plain_decimal && number.is_finite() => Ok(number),
        _ => Err(D::Error::custom(DecodeErrorKind::MalformedNumber(text))),
    }
}

/// A non-negative integer in a string, as used by channel identities.
pub fn u8_string<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer)?
        .as_str()
        .filter(|text| !text.starts_with('+'))
        .and_then(|text| text.parse::<u8>().ok())
        .ok_or_else(|| D::Error::custom(DecodeErrorKind::MalformedIdentity))
}

/// Unwrap a one-element array.
///
/// Every element is decoded before the arity is checked, so a malformed
/// element is reported even when the array is too long. `null` counts as an
/// empty array.
pub fn singleton<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default();

    <[T; 1]>::try_from(items)
        .map(|[single]| single)
        .map_err(|items| {
            D::Error::custom(DecodeErrorKind::SingletonArityViolation {
                observed: items.len(),
            })
        })
}

/// [`singleton`] for `Option` fields marked `#[serde(default)]`, so that an
/// absent key stays `None`.
pub fn optional_singleton<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    singleton(deserializer).map(Some)
}
