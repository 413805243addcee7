//! Fan a notification out to the enabled channels
//!
//! Every enabled channel runs on its own task, so a slow, failing or
//! panicking channel cannot hold back or suppress its siblings.

use crate::channels::{Channel, Outcome};
use crate::config::{SwitchSet, CHANNEL_COUNT};
use crate::format::preview;
use std::sync::Arc;
use tracing::{error, info};

/// Per-channel outcome of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub preview: String,
    pub outcomes: Vec<(&'static str, Outcome)>,
}

impl DispatchReport {
    /// Names of the channels that were actually invoked
    pub fn attempted(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_attempted())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn delivered(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == Outcome::Delivered)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn outcome(&self, channel: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == channel)
            .map(|(_, o)| o)
    }
}

/// Fixed, ordered set of channels matching the switch order
pub struct Dispatcher {
    channels: [Arc<dyn Channel>; CHANNEL_COUNT],
}

impl Dispatcher {
    pub fn new(channels: [Arc<dyn Channel>; CHANNEL_COUNT]) -> Self {
        Self { channels }
    }

    pub async fn dispatch(&self, message: &str, switches: SwitchSet) -> DispatchReport {
        let message: Arc<str> = Arc::from(message);

        let mut tasks = Vec::with_capacity(CHANNEL_COUNT);
        for (channel, enabled) in self.channels.iter().zip(switches.as_array()) {
            let handle = enabled.then(|| {
                let channel = Arc::clone(channel);
                let message = Arc::clone(&message);
                tokio::spawn(async move { channel.send(&message).await })
            });
            tasks.push((channel.name(), handle));
        }

        let mut outcomes = Vec::with_capacity(CHANNEL_COUNT);
        for (name, handle) in tasks {
            let outcome = match handle {
                None => Outcome::Disabled,
                Some(handle) => handle.await.unwrap_or_else(|e| {
                    error!("Channel {} task failed: {}", name, e);
                    Outcome::Failed(if e.is_panic() {
                        "panicked".to_string()
                    } else {
                        e.to_string()
                    })
                }),
            };
            outcomes.push((name, outcome));
        }

        let report = DispatchReport {
            preview: preview(&message).to_string(),
            outcomes,
        };

        info!(
            channels = ?report.attempted(),
            delivered = ?report.delivered(),
            "Dispatched: {}...",
            report.preview
        );

        report
    }
}
