//! Event directory watcher and ingestion
//!
//! The watcher turns OS file-creation notifications into paths on a channel.
//! The [`Ingestor`] runs each path through filter → silence check → consume
//! (read, then delete) → parse → format → dispatch.

use crate::config::{Config, SwitchSet};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::Result;
use crate::event::{parse_call, parse_sms, CallType, EventKind, RawEvent};
use crate::format;
use crate::guard::StartupGuard;
use chrono::Local;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Create the event directory if needed and delete any files already in it.
///
/// Returns the number of stale files removed.
pub fn prepare_event_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        info!("Created event directory {}", dir.display());
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale file {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale event files from {}", removed, dir.display());
    }
    Ok(removed)
}

/// Watches one directory (non-recursively) for new files
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `dir`. Each created (or moved-in) file yields one path
    /// on the returned receiver.
    ///
    /// The watcher must be kept alive for events to keep flowing.
    pub fn start(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<PathBuf>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let created = match event.kind {
                        notify::EventKind::Create(_) => true,
                        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => true,
                        _ => false,
                    };
                    if !created {
                        return;
                    }
                    for path in event.paths {
                        debug!(path = %path.display(), "file created");
                        let _ = tx.send(path);
                    }
                }
                Err(e) => warn!(error = %e, "directory watcher error"),
            }
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching event directory");

        Ok((Self { _watcher: watcher }, rx))
    }
}

/// What happened to one notified path
#[derive(Debug)]
pub enum IngestOutcome {
    /// Directory or unrecognized extension
    Ignored,
    /// Arrived during the startup silence window; deleted without dispatch
    Silenced,
    /// Already gone, or empty
    Vanished,
    /// Could not be read; left in place
    ReadFailed(String),
    /// Call event that could not be parsed
    ParseFailed(String),
    /// Call with an unknown type; nothing to send
    Skipped,
    Dispatched(DispatchReport),
}

/// Read an event file, then delete it.
///
/// Waits `settle_delay` first so the gateway can finish writing. Returns
/// `None` if the file is gone or holds only whitespace.
pub async fn consume(path: &Path, kind: EventKind, settle_delay: Duration) -> Result<Option<RawEvent>> {
    if !path.exists() {
        return Ok(None);
    }
    if !settle_delay.is_zero() {
        tokio::time::sleep(settle_delay).await;
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        // Another handler consumed it between our read and delete
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let content = String::from_utf8_lossy(&bytes).trim().to_string();
    if content.is_empty() {
        return Ok(None);
    }

    Ok(Some(RawEvent {
        path: path.to_path_buf(),
        kind,
        content,
    }))
}

/// Turns event files into dispatched notifications
pub struct Ingestor {
    dispatcher: Arc<Dispatcher>,
    guard: StartupGuard,
    line_number: String,
    sms_switches: SwitchSet,
    call_switches: SwitchSet,
    settle_delay: Duration,
}

impl Ingestor {
    pub fn new(config: &Config, dispatcher: Arc<Dispatcher>, guard: StartupGuard) -> Self {
        Self {
            dispatcher,
            guard,
            line_number: config.line_number.clone(),
            sms_switches: config.sms_switches,
            call_switches: config.call_switches,
            settle_delay: config.settle_delay,
        }
    }

    /// Handle notifications until the watcher goes away. Each path is
    /// handled on its own task.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<PathBuf>) {
        while let Some(path) = rx.recv().await {
            let ingestor = Arc::clone(&self);
            tokio::spawn(async move {
                let outcome = ingestor.handle(&path).await;
                debug!(path = %path.display(), ?outcome, "event handled");
            });
        }
        warn!("Directory watcher stopped delivering events");
    }

    pub async fn handle(&self, path: &Path) -> IngestOutcome {
        if path.is_dir() {
            return IngestOutcome::Ignored;
        }
        let kind = match EventKind::from_path(path) {
            Some(k) => k,
            None => return IngestOutcome::Ignored,
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.guard.is_silenced() {
            warn!(
                "Silence window {}s/{}s, dropping {}",
                self.guard.uptime().as_secs(),
                self.guard.window().as_secs(),
                name
            );
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove silenced file {}: {}", name, e);
                }
            }
            return IngestOutcome::Silenced;
        }

        let event = match consume(path, kind, self.settle_delay).await {
            Ok(Some(event)) => event,
            Ok(None) => return IngestOutcome::Vanished,
            Err(e) => {
                error!("Failed to read {}: {}", name, e);
                return IngestOutcome::ReadFailed(e.to_string());
            }
        };

        let (message, switches) = match event.kind {
            EventKind::Sms => {
                let sms = parse_sms(&event.content);
                info!("Received SMS from {}", sms.sender);
                (
                    format::sms_message(&sms, Local::now(), &self.line_number),
                    self.sms_switches,
                )
            }
            EventKind::Call => {
                let call = match parse_call(&event.content) {
                    Ok(call) => call,
                    Err(e) => {
                        error!("Failed to parse call event {}: {}", name, e);
                        return IngestOutcome::ParseFailed(e.to_string());
                    }
                };
                match format::call_message(&call, &self.line_number) {
                    Some(message) => {
                        info!("Call event ({}) from {}", call.call_type.as_str(), call.number);
                        (message, self.call_switches)
                    }
                    None => {
                        let raw_type = match &call.call_type {
                            CallType::Unknown(Some(t)) => t.as_str(),
                            _ => "<missing>",
                        };
                        warn!(
                            "Unknown call type {} from {} in {}, not dispatching",
                            raw_type, call.number, name
                        );
                        return IngestOutcome::Skipped;
                    }
                }
            }
        };

        IngestOutcome::Dispatched(self.dispatcher.dispatch(&message, switches).await)
    }
}
