//! Integration tests for the SMS relay
//!
//! These drive event files through the ingestion pipeline with in-memory
//! channels standing in for the real transports.

use async_trait::async_trait;
use sms_relay::channels::{Channel, Outcome};
use sms_relay::commands::CommandEndpoint;
use sms_relay::config::{AllowList, Config, SwitchSet};
use sms_relay::dispatch::Dispatcher;
use sms_relay::guard::StartupGuard;
use sms_relay::sms::AsteriskGateway;
use sms_relay::watcher::{prepare_event_dir, DirectoryWatcher, IngestOutcome, Ingestor};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records every message it is asked to send
struct RecordingChannel {
    name: &'static str,
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, message: &str) -> Outcome {
        self.sent.lock().unwrap().push(message.to_string());
        Outcome::Delivered
    }
}

/// Always fails, as if the transport raised
struct BrokenChannel;

#[async_trait]
impl Channel for BrokenChannel {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn send(&self, _message: &str) -> Outcome {
        Outcome::Failed("connection refused".to_string())
    }
}

struct Harness {
    _temp: TempDir,
    config: Config,
    chat: Arc<RecordingChannel>,
    push: Arc<RecordingChannel>,
    webhook: Arc<RecordingChannel>,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = Config::for_test(temp.path());
        prepare_event_dir(&config.event_dir).unwrap();
        Self {
            _temp: temp,
            config,
            chat: RecordingChannel::new("chat"),
            push: RecordingChannel::new("push"),
            webhook: RecordingChannel::new("webhook"),
        }
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new([
            self.chat.clone(),
            self.push.clone(),
            self.webhook.clone(),
        ]))
    }

    fn ingestor(&self, guard: StartupGuard) -> Ingestor {
        Ingestor::new(&self.config, self.dispatcher(), guard)
    }

    fn drop_file(&self, name: &str, content: &str) -> std::path::PathBuf {
        let path = self.config.event_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn total_sends(&self) -> usize {
        self.chat.count() + self.push.count() + self.webhook.count()
    }
}

/// Files arriving during the silence window are deleted and never dispatched;
/// the same file after the window is dispatched normally
#[tokio::test]
async fn test_startup_silence_window() {
    let harness = Harness::new();
    let ingestor = harness.ingestor(StartupGuard::new(Duration::from_millis(200)));

    for i in 0..5 {
        let path = harness.drop_file(&format!("{}.txt", i), "From: 10086\nContent: stale");
        assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Silenced));
        assert!(!path.exists());
    }
    assert_eq!(harness.total_sends(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let path = harness.drop_file("5.txt", "From: 10086\nContent: stale");
    assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Dispatched(_)));
    assert_eq!(harness.chat.count(), 1);
    assert_eq!(harness.push.count(), 1);
    assert_eq!(harness.webhook.count(), 1);
}

/// A failing channel does not stop the healthy ones
#[tokio::test]
async fn test_failing_channel_does_not_block_siblings() {
    let harness = Harness::new();
    let dispatcher = Arc::new(Dispatcher::new([
        harness.chat.clone(),
        Arc::new(BrokenChannel),
        harness.webhook.clone(),
    ]));
    let ingestor = Ingestor::new(&harness.config, dispatcher, StartupGuard::disabled());

    let path = harness.drop_file("1.txt", "From: +8613800138000\nContent: code 4321");
    let report = match ingestor.handle(&path).await {
        IngestOutcome::Dispatched(report) => report,
        other => panic!("expected dispatch, got {:?}", other),
    };

    assert_eq!(harness.chat.count(), 1);
    assert_eq!(harness.webhook.count(), 1);
    assert_eq!(report.attempted(), vec!["chat", "push", "webhook"]);
    assert_eq!(report.delivered(), vec!["chat", "webhook"]);
    assert!(matches!(report.outcome("push"), Some(Outcome::Failed(_))));
    assert_eq!(report.preview, "code 4321");
}

/// Once a file is consumed, re-triggering the same path does nothing
#[tokio::test]
async fn test_redelivery_is_noop() {
    let harness = Harness::new();
    let ingestor = harness.ingestor(StartupGuard::disabled());

    let path = harness.drop_file("1.txt", "From: 1\nContent: once");
    assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Dispatched(_)));
    assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Vanished));
    assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Vanished));

    assert_eq!(harness.chat.count(), 1);
}

/// SMS notifications carry the body, sender and local line
#[tokio::test]
async fn test_sms_notification_content() {
    let harness = Harness::new();
    let ingestor = harness.ingestor(StartupGuard::disabled());

    let path = harness.drop_file("1.txt", "from:  10086 \n\ncontent:  Your balance is low ");
    ingestor.handle(&path).await;

    let messages = harness.chat.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Your balance is low\n\nFrom: 10086\nReceived: "));
    assert!(messages[0].ends_with(&format!("Line: {}", harness.config.line_number)));
}

/// Call events use the call switch set
#[tokio::test]
async fn test_call_uses_call_switches() {
    let mut harness = Harness::new();
    harness.config.call_switches = SwitchSet::new(false, true, false);
    let ingestor = harness.ingestor(StartupGuard::disabled());

    let path = harness.drop_file("1.req", "TYPE:IN|NUM:13800138000|TIME:2024-01-01 10:00:00");
    assert!(matches!(ingestor.handle(&path).await, IngestOutcome::Dispatched(_)));

    assert_eq!(harness.chat.count(), 0);
    assert_eq!(harness.webhook.count(), 0);
    let messages = harness.push.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Caller: 13800138000"));
    assert!(messages[0].contains("#CALL_IN"));
}

/// Unknown call types and unparseable call events are consumed but not sent
#[tokio::test]
async fn test_call_events_not_dispatched() {
    let harness = Harness::new();
    let ingestor = harness.ingestor(StartupGuard::disabled());

    let unknown = harness.drop_file("1.req", "TYPE:RING\nNUM:1");
    assert!(matches!(ingestor.handle(&unknown).await, IngestOutcome::Skipped));
    assert!(!unknown.exists());

    let garbage = harness.drop_file("2.req", "nothing useful");
    assert!(matches!(ingestor.handle(&garbage).await, IngestOutcome::ParseFailed(_)));
    assert!(!garbage.exists());

    assert_eq!(harness.total_sends(), 0);
}

/// Unrecognized files and directories are left alone
#[tokio::test]
async fn test_unrecognized_paths_ignored() {
    let harness = Harness::new();
    let ingestor = harness.ingestor(StartupGuard::disabled());

    let tmp = harness.drop_file("partial.tmp", "From: 1\nContent: x");
    assert!(matches!(ingestor.handle(&tmp).await, IngestOutcome::Ignored));
    assert!(tmp.exists());

    let dir = harness.config.event_dir.join("nested.txt");
    fs::create_dir(&dir).unwrap();
    assert!(matches!(ingestor.handle(&dir).await, IngestOutcome::Ignored));

    let empty = harness.drop_file("empty.txt", "   \n");
    assert!(matches!(ingestor.handle(&empty).await, IngestOutcome::Vanished));
    assert!(!empty.exists());

    assert_eq!(harness.total_sends(), 0);
}

/// Full loop: OS notification → ingestor → channels
#[tokio::test]
async fn test_watcher_to_dispatch() {
    let mut harness = Harness::new();
    // Give the writer time to finish before the file is read
    harness.config.settle_delay = Duration::from_millis(200);
    let ingestor = Arc::new(harness.ingestor(StartupGuard::disabled()));

    let (_watcher, rx) = DirectoryWatcher::start(&harness.config.event_dir).unwrap();
    let loop_handle = tokio::spawn(ingestor.run(rx));

    let path = harness.drop_file("live.txt", "From: 95588\nContent: transfer received");

    let mut delivered = false;
    for _ in 0..50 {
        if harness.chat.count() > 0 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    loop_handle.abort();

    assert!(delivered, "event was not dispatched");
    assert_eq!(harness.chat.count(), 1);
    assert!(!path.exists());
}

/// Files arriving while the relay is still connecting are queued by the
/// watcher and ingested once the loop starts
#[tokio::test]
async fn test_events_during_setup_are_queued() {
    let mut harness = Harness::new();
    harness.config.settle_delay = Duration::from_millis(100);

    let (_watcher, rx) = DirectoryWatcher::start(&harness.config.event_dir).unwrap();

    // Slow bot setup: nothing consumes the channel yet
    let path = harness.drop_file("early.txt", "From: 10010\nContent: arrived during setup");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(path.exists());

    let ingestor = Arc::new(harness.ingestor(StartupGuard::disabled()));
    let loop_handle = tokio::spawn(ingestor.run(rx));

    for _ in 0..50 {
        if harness.chat.count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    loop_handle.abort();

    let messages = harness.chat.messages();
    assert!(!messages.is_empty(), "queued event was not dispatched");
    assert!(messages[0].starts_with("arrived during setup"));
    assert!(!path.exists());
}

fn fake_asterisk(dir: &Path, output: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("asterisk");
    let log = dir.join("asterisk.log");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nprintf '%s\\n' \"$2\" >> '{}'\necho '{}'\n",
            log.display(),
            output
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// The privileged command reaches the telephony CLI only for allowed principals
#[tokio::test]
async fn test_send_command_through_cli() {
    let temp = TempDir::new().unwrap();
    let script = fake_asterisk(temp.path(), "[quectel0] SMS queued for send");
    let gateway = Arc::new(AsteriskGateway::new(script, "quectel0".to_string()));
    let endpoint = CommandEndpoint::new(AllowList::new([42]), gateway);

    assert_eq!(endpoint.handle(99, "/send 10086 hello").await, None);
    assert!(!temp.path().join("asterisk.log").exists());

    let reply = endpoint.handle(42, "/send 10086 hello there").await;
    assert_eq!(reply.as_deref(), Some("✅ Sent to 10086"));

    let log = fs::read_to_string(temp.path().join("asterisk.log")).unwrap();
    assert_eq!(log.trim(), "quectel sms quectel0 10086 \"hello there\"");
}

/// CLI output mentioning an error is a failed send even with a zero exit
#[tokio::test]
async fn test_send_command_reports_cli_error() {
    let temp = TempDir::new().unwrap();
    let script = fake_asterisk(temp.path(), "ERROR: device quectel0 not found");
    let gateway = Arc::new(AsteriskGateway::new(script, "quectel0".to_string()));
    let endpoint = CommandEndpoint::new(AllowList::new([42]), gateway);

    let reply = endpoint.handle(42, "/send 10086 hi").await.unwrap();
    assert!(reply.starts_with("❌ Failed"));
    assert!(reply.contains("not found"));
}
