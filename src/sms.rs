//! Outbound SMS through the telephony CLI
//!
//! Messages go out via `asterisk -rx 'quectel sms <device> <number> "<text>"'`.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{info, warn};

/// Result of one send attempt as reported by the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub success: bool,
    pub output: String,
}

/// Something that can send an SMS
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, number: &str, text: &str) -> Result<SendReport>;
}

/// Sends through the Asterisk CLI and the quectel channel driver
pub struct AsteriskGateway {
    asterisk: PathBuf,
    device: String,
}

impl AsteriskGateway {
    pub fn new(asterisk: PathBuf, device: String) -> Self {
        Self { asterisk, device }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.asterisk.clone(), config.modem.clone())
    }

    /// The `-rx` argument for one message
    pub fn cli_command(&self, number: &str, text: &str) -> String {
        let text = text.replace('\\', "\\\\").replace('"', "\\\"");
        format!("quectel sms {} {} \"{}\"", self.device, number, text)
    }
}

/// Zero exit status and no "error" anywhere in the CLI output
pub fn is_success(exit_ok: bool, output: &str) -> bool {
    exit_ok && !output.to_lowercase().contains("error")
}

#[async_trait]
impl SmsGateway for AsteriskGateway {
    async fn send_sms(&self, number: &str, text: &str) -> Result<SendReport> {
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '+') {
            return Err(Error::CommandFailed(format!("invalid number {:?}", number)));
        }

        let output = Command::new(&self.asterisk)
            .arg("-rx")
            .arg(self.cli_command(number, text))
            .output()
            .await
            .map_err(|e| Error::CommandFailed(format!("{}: {}", self.asterisk.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let success = is_success(output.status.success(), &stdout);
        if success {
            info!("SMS queued to {}", number);
        } else {
            warn!(
                "SMS to {} failed (status {:?}): {}",
                number,
                output.status.code(),
                stdout
            );
        }

        Ok(SendReport {
            success,
            output: stdout,
        })
    }
}
