//! Inbound chat commands
//!
//! `myid` (alias `whoami`) replies with the caller's ID. `send <number> <text...>`
//! sends an SMS, but only for callers on the allow-list; anyone else gets no
//! reply at all.

use crate::config::AllowList;
use crate::sms::SmsGateway;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SEND_USAGE: &str = "Usage: /send <number> <message>";

/// A recognized command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    WhoAmI,
    Send { number: String, text: String },
    /// `send` with missing arguments
    SendUsage,
}

/// Parse message text into a command.
///
/// Accepts an optional leading `/` and a trailing `@botname` on the command
/// word. Returns `None` for anything else.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut words = text.split_whitespace();
    let head = words.next()?;
    let head = head.strip_prefix('/').unwrap_or(head);
    let head = head.split('@').next().unwrap_or(head).to_lowercase();

    match head.as_str() {
        "myid" | "whoami" => Some(Command::WhoAmI),
        "send" => {
            let args: Vec<&str> = words.collect();
            if args.len() < 2 {
                return Some(Command::SendUsage);
            }
            Some(Command::Send {
                number: args[0].to_string(),
                text: args[1..].join(" "),
            })
        }
        _ => None,
    }
}

/// Authorizes and executes commands
pub struct CommandEndpoint {
    allow_list: AllowList,
    gateway: Arc<dyn SmsGateway>,
}

impl CommandEndpoint {
    pub fn new(allow_list: AllowList, gateway: Arc<dyn SmsGateway>) -> Self {
        Self {
            allow_list,
            gateway,
        }
    }

    /// Handle one message from `principal`. Returns the reply to send, if any.
    pub async fn handle(&self, principal: i64, text: &str) -> Option<String> {
        let command = parse_command(text)?;

        if command == Command::WhoAmI {
            return Some(format!("ID: {}", principal));
        }

        if !self.allow_list.contains(principal) {
            warn!("Ignoring command from unauthorized principal {}", principal);
            return None;
        }

        match command {
            Command::WhoAmI => None,
            Command::SendUsage => Some(SEND_USAGE.to_string()),
            Command::Send { number, text } => {
                info!("Principal {} sending SMS to {}", principal, number);
                match self.gateway.send_sms(&number, &text).await {
                    Ok(report) if report.success => Some(format!("✅ Sent to {}", number)),
                    Ok(report) => Some(format!("❌ Failed: {}", report.output)),
                    Err(e) => {
                        error!("SMS send to {} failed: {}", number, e);
                        Some(format!("❌ Error: {}", e))
                    }
                }
            }
        }
    }
}
