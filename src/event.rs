//! Event file parsing
//!
//! The telephony gateway drops one file per event into the watched directory:
//! `.txt` files carry an SMS (`From: <sender>\nContent: <body>`), `.req` files
//! carry a call event as `KEY:VALUE` pairs separated by `|` or newlines.

use crate::error::{Error, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Sender substituted when an SMS has no `From:` header
pub const UNKNOWN_SENDER: &str = "unknown-number";

/// Number substituted when a call event has no `NUM` key
pub const UNKNOWN_NUMBER: &str = "unknown";

/// Timestamp format used for call events
pub const CALL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static SMS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)From:\s*(.*?)\s*Content:\s*(.*)").expect("Invalid SMS regex")
});

/// Kind of event file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Sms,
    Call,
}

impl EventKind {
    /// Classify a path by extension; `None` for anything unrecognized
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => Some(EventKind::Sms),
            Some("req") => Some(EventKind::Call),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sms => "sms",
            EventKind::Call => "call",
        }
    }
}

/// A consumed event file. The file itself is gone by the time this exists.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub content: String,
}

/// A parsed SMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    pub sender: String,
    pub body: String,
}

/// Call event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallType {
    /// Incoming call ringing
    Incoming,
    /// Call hung up
    Disconnected,
    /// Missing or unrecognized `TYPE`; carries the raw value if there was one
    Unknown(Option<String>),
}

impl CallType {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(t) if t.eq_ignore_ascii_case("IN") => CallType::Incoming,
            Some(t) if t.eq_ignore_ascii_case("UP") => CallType::Disconnected,
            other => CallType::Unknown(other.map(str::to_string)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallType::Incoming => "IN",
            CallType::Disconnected => "UP",
            CallType::Unknown(_) => "UNKNOWN",
        }
    }
}

/// A parsed call event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call_type: CallType,
    pub number: String,
    pub timestamp: String,
}

/// Parse SMS text. Never fails.
///
/// Falls back to [`UNKNOWN_SENDER`] and the whole trimmed text when the
/// `From:`/`Content:` labels are missing.
pub fn parse_sms(raw: &str) -> SmsRecord {
    let text = raw.trim();

    if let Some(caps) = SMS_PATTERN.captures(text) {
        let sender = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        return SmsRecord {
            sender: if sender.is_empty() {
                UNKNOWN_SENDER.to_string()
            } else {
                sender.to_string()
            },
            // Keep something readable when the Content: label is present but empty
            body: if body.is_empty() {
                text.to_string()
            } else {
                body.to_string()
            },
        };
    }

    SmsRecord {
        sender: UNKNOWN_SENDER.to_string(),
        body: text.to_string(),
    }
}

/// Parse call event text.
///
/// Pairs are split on `|` when present, otherwise on newlines; each pair is
/// split on its first `:`. Keys are matched case-insensitively and unknown
/// keys are ignored. Text with no `KEY:VALUE` pair at all is a parse error.
pub fn parse_call(raw: &str) -> Result<CallRecord> {
    parse_call_at(raw, || Local::now().format(CALL_TIME_FORMAT).to_string())
}

fn parse_call_at<F>(raw: &str, now: F) -> Result<CallRecord>
where
    F: FnOnce() -> String,
{
    let text = raw.trim();
    let separator = if text.contains('|') { '|' } else { '\n' };

    let fields: HashMap<String, String> = text
        .split(separator)
        .filter_map(|part| part.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_uppercase(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect();

    if fields.is_empty() {
        return Err(Error::Parse(format!(
            "no KEY:VALUE pairs in call event {:?}",
            text.chars().take(80).collect::<String>()
        )));
    }

    let field = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();

    Ok(CallRecord {
        call_type: CallType::parse(field("TYPE").as_deref()),
        number: field("NUM").unwrap_or_else(|| UNKNOWN_NUMBER.to_string()),
        timestamp: field("TIME").unwrap_or_else(now),
    })
}
