//! Notification text for parsed events

use crate::event::{CallRecord, CallType, SmsRecord};
use chrono::{DateTime, Local};

/// Receipt timestamp format shown on SMS notifications
pub const RECEIVED_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Render an SMS notification
pub fn sms_message(sms: &SmsRecord, received_at: DateTime<Local>, line_number: &str) -> String {
    format!(
        "{}\n\nFrom: {}\nReceived: {}\nLine: {}",
        sms.body,
        sms.sender,
        received_at.format(RECEIVED_FORMAT),
        line_number
    )
}

/// Render a call notification. `None` for unknown call types.
pub fn call_message(call: &CallRecord, line_number: &str) -> Option<String> {
    let (title, time_label, tag) = match call.call_type {
        CallType::Incoming => ("📞 Incoming call", "Time", "#CALL #CALL_IN"),
        CallType::Disconnected => ("📴 Call ended", "Ended", "#CALL #CALL_DISCONNECTED"),
        CallType::Unknown(_) => return None,
    };

    Some(format!(
        "{}\n\nCaller: {}\n{}: {}\n{}\nLine: {}",
        title, call.number, time_label, call.timestamp, tag, line_number
    ))
}

/// First line of a message, for log previews
pub fn preview(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}
