//! Attribute decoders.
//!
//! Directory attributes arrive as sequences even when single-valued, and
//! their values come in whatever shape the client produced. The pure
//! decoders here return `Err(AdError::DecodeFailure)` on malformed input;
//! [`RecordReader`] applies them field by field, logs failures at `warn`
//! and maps them to absence, so a bad field never rejects a record.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use dirgraph_connector::record::{AttributeSet, AttributeValue};

use crate::error::{AdError, AdResult};

/// 100ns ticks between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// First element of a possibly multi-valued attribute.
///
/// Returns `None` for a missing attribute, a null, an empty sequence, or a
/// sequence whose first element is null.
pub fn unwrap_first(value: Option<&AttributeValue>) -> Option<&AttributeValue> {
    match value? {
        AttributeValue::Null => None,
        AttributeValue::Array(values) => values.first().filter(|v| !v.is_null()),
        single => Some(single),
    }
}

/// Convert a FILETIME tick count. `0` and `i64::MAX` mean "never".
pub fn filetime_to_datetime(ticks: i64) -> AdResult<Option<DateTime<Utc>>> {
    if ticks == 0 || ticks == i64::MAX {
        return Ok(None);
    }
    if ticks < 0 {
        return Err(AdError::decode("filetime", format!("negative tick count {ticks}")));
    }
    let since_unix = ticks - FILETIME_UNIX_EPOCH_TICKS;
    let secs = since_unix.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(Some)
        .ok_or_else(|| AdError::decode("filetime", format!("{ticks} out of range")))
}

fn parse_generalized_time(s: &str) -> Option<DateTime<Utc>> {
    // YYYYMMDDHHMMSS[.f]Z
    let digits = s.get(..14)?;
    let rest = &s[14..];
    let valid_tail = rest.is_empty()
        || rest == "Z"
        || (rest.starts_with('.') && rest.ends_with('Z'))
        || rest.starts_with('.') && rest[1..].chars().all(|c| c.is_ascii_digit());
    if !valid_tail {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode a timestamp from FILETIME ticks, generalized time, RFC 3339, or
/// an already-resolved time.
pub fn to_timestamp(raw: &AttributeValue) -> AdResult<Option<DateTime<Utc>>> {
    match raw {
        AttributeValue::Null => Ok(None),
        AttributeValue::Timestamp(ts) => Ok(Some(*ts)),
        AttributeValue::Integer(ticks) => filetime_to_datetime(*ticks),
        AttributeValue::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            // A bare YYYYMMDDHHMMSS is all digits; it must win over ticks.
            if let Some(ts) = parse_generalized_time(s) {
                return Ok(Some(ts));
            }
            if let Ok(ticks) = s.parse::<i64>() {
                return filetime_to_datetime(ticks);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| AdError::decode("timestamp", format!("'{s}': {e}")))
        }
        other => Err(AdError::decode(
            "timestamp",
            format!("unsupported value {other:?}"),
        )),
    }
}

/// Coerce a boolean. Integers are true when non-zero.
pub fn to_bool(raw: &AttributeValue) -> AdResult<bool> {
    match raw {
        AttributeValue::Null => Ok(false),
        AttributeValue::Boolean(b) => Ok(*b),
        AttributeValue::Integer(i) => Ok(*i != 0),
        AttributeValue::String(s) => match s.trim() {
            "TRUE" | "true" | "True" | "1" | "yes" => Ok(true),
            "FALSE" | "false" | "False" | "0" | "no" | "" => Ok(false),
            other => Err(AdError::decode("bool", format!("'{other}'"))),
        },
        other => Err(AdError::decode("bool", format!("unsupported value {other:?}"))),
    }
}

pub fn to_int(raw: &AttributeValue) -> AdResult<Option<i64>> {
    match raw {
        AttributeValue::Null => Ok(None),
        AttributeValue::Integer(i) => Ok(Some(*i)),
        AttributeValue::Boolean(b) => Ok(Some(i64::from(*b))),
        AttributeValue::String(s) if s.trim().is_empty() => Ok(None),
        AttributeValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| AdError::decode("integer", format!("'{s}': {e}"))),
        other => Err(AdError::decode(
            "integer",
            format!("unsupported value {other:?}"),
        )),
    }
}

pub fn to_string(raw: &AttributeValue) -> AdResult<Option<String>> {
    match raw {
        AttributeValue::Null => Ok(None),
        AttributeValue::String(s) => Ok(Some(s.clone())),
        AttributeValue::Integer(i) => Ok(Some(i.to_string())),
        AttributeValue::Boolean(b) => Ok(Some(if *b { "TRUE" } else { "FALSE" }.to_string())),
        AttributeValue::Timestamp(ts) => Ok(Some(ts.to_rfc3339())),
        AttributeValue::Binary(bytes) => String::from_utf8(bytes.clone())
            .map(Some)
            .map_err(|e| AdError::decode("string", e.to_string())),
        AttributeValue::Array(_) => Err(AdError::decode("string", "unexpected sequence")),
    }
}

/// Decode an `objectGUID`.
///
/// Binary values use the mixed-endian GUID layout. Strings may be a GUID in
/// text form or a base64 encoding of the binary layout.
pub fn to_guid(raw: &AttributeValue) -> AdResult<Option<String>> {
    match raw {
        AttributeValue::Null => Ok(None),
        AttributeValue::Binary(bytes) => guid_from_bytes(bytes).map(Some),
        AttributeValue::String(s) => {
            let s = s.trim().trim_start_matches('{').trim_end_matches('}');
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(guid) = Uuid::parse_str(s) {
                return Ok(Some(guid.hyphenated().to_string()));
            }
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| AdError::decode("objectGUID", format!("'{s}': {e}")))?;
            guid_from_bytes(&bytes).map(Some)
        }
        other => Err(AdError::decode(
            "objectGUID",
            format!("unsupported value {other:?}"),
        )),
    }
}

fn guid_from_bytes(bytes: &[u8]) -> AdResult<String> {
    let array: [u8; 16] = bytes
        .try_into()
        .map_err(|_| AdError::decode("objectGUID", format!("{} bytes, expected 16", bytes.len())))?;
    Ok(Uuid::from_bytes_le(array).hyphenated().to_string())
}

/// Decode an `objectSid` into `S-R-I-S-S...` form.
pub fn to_sid(raw: &AttributeValue) -> AdResult<Option<String>> {
    match raw {
        AttributeValue::Null => Ok(None),
        AttributeValue::String(s) if s.trim().is_empty() => Ok(None),
        AttributeValue::String(s) if s.trim().starts_with("S-") => Ok(Some(s.trim().to_string())),
        AttributeValue::String(s) => Err(AdError::decode("objectSid", format!("'{s}'"))),
        AttributeValue::Binary(bytes) => sid_from_bytes(bytes).map(Some),
        other => Err(AdError::decode(
            "objectSid",
            format!("unsupported value {other:?}"),
        )),
    }
}

fn sid_from_bytes(bytes: &[u8]) -> AdResult<String> {
    if bytes.len() < 8 {
        return Err(AdError::decode("objectSid", "shorter than header"));
    }
    let revision = bytes[0];
    let count = bytes[1] as usize;
    if bytes.len() != 8 + count * 4 {
        return Err(AdError::decode(
            "objectSid",
            format!("{} bytes for {count} sub-authorities", bytes.len()),
        ));
    }
    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = format!("S-{revision}-{authority}");
    for chunk in bytes[8..].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push('-');
        sid.push_str(&sub.to_string());
    }
    Ok(sid)
}

/// Field-by-field reader over one raw record.
///
/// Every accessor applies [`unwrap_first`] and the matching decoder. Decode
/// failures are logged with the record DN and read as absent.
#[derive(Debug, Clone, Copy)]
pub struct RecordReader<'a> {
    record: &'a AttributeSet,
    dn: &'a str,
}

impl<'a> RecordReader<'a> {
    pub fn new(record: &'a AttributeSet) -> Self {
        let dn = record
            .get("distinguishedName")
            .and_then(|v| unwrap_first(Some(v)))
            .and_then(|v| v.as_string())
            .unwrap_or("<unknown>");
        Self { record, dn }
    }

    /// DN used in logs; `<unknown>` when the record has none.
    pub fn dn(&self) -> &'a str {
        self.dn
    }

    pub fn raw(&self, name: &str) -> Option<&'a AttributeValue> {
        unwrap_first(self.record.get(name))
    }

    fn decode<T>(
        &self,
        name: &str,
        decoder: impl FnOnce(&AttributeValue) -> AdResult<Option<T>>,
    ) -> Option<T> {
        let raw = self.raw(name)?;
        match decoder(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(dn = %self.dn, attribute = name, error = %err, "Attribute decode failed");
                None
            }
        }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.decode(name, to_string)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.decode(name, to_int)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.decode(name, to_timestamp)
    }

    /// Absent or undecodable booleans read as `false`.
    pub fn bool(&self, name: &str) -> bool {
        self.decode(name, |raw| to_bool(raw).map(Some))
            .unwrap_or(false)
    }

    pub fn guid(&self, name: &str) -> Option<String> {
        self.decode(name, to_guid)
    }

    pub fn sid(&self, name: &str) -> Option<String> {
        self.decode(name, to_sid)
    }

    /// All string values of a multi-valued attribute.
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.record
            .get_strings(name)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
