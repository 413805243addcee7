//! Configuration, channel switch sets and the command allow-list
//!
//! Everything here is read once at startup and never mutated afterwards.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Channel names in switch order
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = ["chat", "push", "webhook"];

/// Number of outbound channels
pub const CHANNEL_COUNT: usize = 3;

pub const DEFAULT_EVENT_DIR: &str = "/var/log/asterisk/unread_sms/";
pub const DEFAULT_WEBHOOK_URL: &str = "https://oapi.dingtalk.com/robot/send";
pub const DEFAULT_SILENCE_WINDOW_SECS: u64 = 40;
pub const DEFAULT_SMS_SWITCHES: &str = "1,1,1";
pub const DEFAULT_CALL_SWITCHES: &str = "0,1,0";

/// Per-event-type enable flags over (chat, push, webhook)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchSet([bool; CHANNEL_COUNT]);

impl SwitchSet {
    pub const ALL: SwitchSet = SwitchSet([true; CHANNEL_COUNT]);
    pub const NONE: SwitchSet = SwitchSet([false; CHANNEL_COUNT]);

    pub fn new(chat: bool, push: bool, webhook: bool) -> Self {
        Self([chat, push, webhook])
    }

    /// Strict parse of a `"1,0,1"` style string.
    ///
    /// Each of the first three entries must be `1` or `0`; extra entries are
    /// ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() < CHANNEL_COUNT {
            return Err(Error::Config(format!(
                "expected {} switches, got {}: {:?}",
                CHANNEL_COUNT,
                parts.len(),
                raw
            )));
        }

        let mut switches = [false; CHANNEL_COUNT];
        for (slot, part) in switches.iter_mut().zip(&parts) {
            *slot = match *part {
                "1" => true,
                "0" => false,
                other => {
                    return Err(Error::Config(format!("invalid switch value {:?}", other)));
                }
            };
        }

        Ok(Self(switches))
    }

    /// Parse a configured switch string, failing open.
    ///
    /// A malformed string enables every channel: a bad config must never
    /// silence notifications.
    pub fn parse_or_all(name: &str, raw: &str) -> Self {
        match Self::parse(raw) {
            Ok(switches) => switches,
            Err(e) => {
                warn!("Invalid {} ({}), enabling all channels", name, e);
                Self::ALL
            }
        }
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn as_array(&self) -> [bool; CHANNEL_COUNT] {
        self.0
    }

    /// Names of the enabled channels, in switch order
    pub fn enabled_names(&self) -> Vec<&'static str> {
        CHANNEL_NAMES
            .iter()
            .zip(self.0)
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for SwitchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<String> = CHANNEL_NAMES
            .iter()
            .zip(self.0)
            .map(|(name, on)| format!("{}={}", name, if on { "on" } else { "off" }))
            .collect();
        write!(f, "[{}]", flags.join(", "))
    }
}

/// Principal IDs allowed to run privileged commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: Vec<i64>,
}

impl AllowList {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self { ids }
    }

    /// Parse a comma-separated list of integer IDs. Blank entries are skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|e| Error::Config(format!("invalid principal id {:?}: {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ids))
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: Option<String>,
    pub allowed_ids: AllowList,
    pub push_url: Option<String>,
    pub push_token: String,
    pub push_user_id: i64,
    pub webhook_token: Option<String>,
    pub webhook_secret: String,
    pub webhook_url: String,
    pub event_dir: PathBuf,
    pub line_number: String,
    pub silence_window: Duration,
    pub proxy_url: Option<String>,
    pub sms_switches: SwitchSet,
    pub call_switches: SwitchSet,
    pub asterisk: PathBuf,
    pub modem: String,
    pub settle_delay: Duration,
    pub send_timeout: Duration,
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let allowed_ids = match get("TG_ALLOWED_IDS") {
            Some(raw) => AllowList::parse(&raw).unwrap_or_else(|e| {
                warn!("Ignoring TG_ALLOWED_IDS: {}", e);
                AllowList::default()
            }),
            None => AllowList::default(),
        };

        let push_user_id = get("QQ_USER_ID")
            .map(|raw| {
                raw.parse::<i64>().unwrap_or_else(|_| {
                    warn!("Invalid QQ_USER_ID {:?}, using 0", raw);
                    0
                })
            })
            .unwrap_or(0);

        let silence_secs = get("STARTUP_SILENCE_WINDOW")
            .map(|raw| {
                raw.parse::<u64>().unwrap_or_else(|_| {
                    warn!(
                        "Invalid STARTUP_SILENCE_WINDOW {:?}, using {}s",
                        raw, DEFAULT_SILENCE_WINDOW_SECS
                    );
                    DEFAULT_SILENCE_WINDOW_SECS
                })
            })
            .unwrap_or(DEFAULT_SILENCE_WINDOW_SECS);

        let proxy_url = get("PROXY_URL").filter(|p| !p.eq_ignore_ascii_case("none"));

        let sms_switches = SwitchSet::parse_or_all(
            "SMS_NOTIFY_SWITCH",
            &get("SMS_NOTIFY_SWITCH").unwrap_or_else(|| DEFAULT_SMS_SWITCHES.to_string()),
        );
        let call_switches = SwitchSet::parse_or_all(
            "CALL_NOTIFY_SWITCH",
            &get("CALL_NOTIFY_SWITCH").unwrap_or_else(|| DEFAULT_CALL_SWITCHES.to_string()),
        );

        Self {
            telegram_token: get("TG_TOKEN"),
            allowed_ids,
            push_url: get("QQ_API_URL"),
            push_token: get("QQ_BEARER_TOKEN").unwrap_or_default(),
            push_user_id,
            webhook_token: get("DD_TOKEN"),
            webhook_secret: get("DD_SECRET").unwrap_or_default(),
            webhook_url: get("DD_API_URL").unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
            event_dir: get("MESSAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENT_DIR)),
            line_number: get("MY_PHONE_NUMBER").unwrap_or_else(|| "Unknown".to_string()),
            silence_window: Duration::from_secs(silence_secs),
            proxy_url,
            sms_switches,
            call_switches,
            asterisk: get("ASTERISK_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("asterisk")),
            modem: get("QUECTEL_DEVICE").unwrap_or_else(|| "quectel0".to_string()),
            settle_delay: Duration::from_millis(200),
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Create config for testing: local event dir, no channels, no silence
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            telegram_token: None,
            allowed_ids: AllowList::default(),
            push_url: None,
            push_token: String::new(),
            push_user_id: 0,
            webhook_token: None,
            webhook_secret: String::new(),
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            event_dir: temp_dir.join("unread_sms"),
            line_number: "+10000000000".to_string(),
            silence_window: Duration::ZERO,
            proxy_url: None,
            sms_switches: SwitchSet::ALL,
            call_switches: SwitchSet::ALL,
            asterisk: temp_dir.join("asterisk"),
            modem: "quectel0".to_string(),
            settle_delay: Duration::ZERO,
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Human-readable summary with secrets redacted
    pub fn summary(&self) -> String {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "[set]"
            } else {
                "[unset]"
            }
        }

        format!(
            "event_dir: {}\n\
             line_number: {}\n\
             silence_window: {}s\n\
             telegram_token: {}\n\
             allowed_ids: {:?}\n\
             push_url: {}\n\
             push_user_id: {}\n\
             webhook_token: {}\n\
             webhook_url: {}\n\
             proxy_url: {}\n\
             sms_switches: {}\n\
             call_switches: {}\n\
             asterisk: {} ({})",
            self.event_dir.display(),
            self.line_number,
            self.silence_window.as_secs(),
            redact(&self.telegram_token),
            self.allowed_ids.ids(),
            self.push_url.as_deref().unwrap_or("[unset]"),
            self.push_user_id,
            redact(&self.webhook_token),
            self.webhook_url,
            self.proxy_url.as_deref().unwrap_or("[unset]"),
            self.sms_switches,
            self.call_switches,
            self.asterisk.display(),
            self.modem,
        )
    }
}
