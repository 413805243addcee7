//! SMS Relay - forwards modem events to chat channels
//!
//! Watches the directory where the telephony gateway drops SMS and call event
//! files, parses each one and fans it out to the configured chat, push and
//! webhook channels. Also answers a small set of chat commands for sending SMS.

pub mod bot;
pub mod channels;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod format;
pub mod guard;
pub mod sms;
pub mod watcher;

pub use error::{Error, Result};
