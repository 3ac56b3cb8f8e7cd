use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use zappy_logging::{JsonLogger, LogLevel};

/// Only trigger events that became due within this window; guards against
/// replaying the entire backlog on startup.
const MAX_STALENESS: chrono::Duration = chrono::Duration::seconds(300);

/// One entry in the scheduled-events JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEvent {
    /// Unique event id, used for dedup against [`TimeSensor`]'s processed set.
    pub id: String,
    /// Free-form category (`"deadline"`, `"calendar"`, `"healthcare"`, ...).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// When this event becomes due.
    pub trigger_time: DateTime<Utc>,
    /// Arbitrary payload carried through to the emitted event.
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    events: Vec<ScheduledEvent>,
}

/// Background watcher over a scheduled-events file, emitting a `time_event`
/// the first time each entry becomes due (§4.7).
pub struct TimeSensor {
    data_path: PathBuf,
    processed: Arc<RwLock<HashSet<String>>>,
    events: UnboundedSender<Value>,
    logger: Option<Arc<JsonLogger>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimeSensor {
    /// Watches `data_path`, a JSON file shaped `{"events": [...]}`.
    #[must_use]
    pub fn new(data_path: PathBuf, events: UnboundedSender<Value>) -> Self {
        Self {
            data_path,
            processed: Arc::new(RwLock::new(HashSet::new())),
            events,
            logger: None,
            poll_interval: Duration::from_secs(30),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Overrides the default 30s poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Starts the background polling loop. A no-op if already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let data_path = self.data_path.clone();
        let processed = Arc::clone(&self.processed);
        let events = self.events.clone();
        let logger = self.logger.clone();
        let poll_interval = self.poll_interval;
        let running = Arc::clone(&self.running);

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            while running.load(Ordering::Acquire) {
                ticker.tick().await;
                poll_and_check(&data_path, &processed, &events, logger.as_deref()).await;
            }
        }));
    }

    /// Stops the background polling loop.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn poll_and_check(
    data_path: &PathBuf,
    processed: &RwLock<HashSet<String>>,
    events: &UnboundedSender<Value>,
    logger: Option<&JsonLogger>,
) {
    let Ok(raw) = tokio::fs::read_to_string(data_path).await else {
        return;
    };
    let Ok(schedule) = serde_json::from_str::<ScheduleFile>(&raw) else {
        if let Some(logger) = logger {
            logger.event(LogLevel::Warn, "sensors.time.unparseable_schedule", json!({}));
        }
        return;
    };

    let now = Utc::now();
    for event in schedule.events {
        if processed.read().contains(&event.id) {
            continue;
        }
        if event.trigger_time > now {
            continue;
        }
        if now - event.trigger_time >= MAX_STALENESS {
            processed.write().insert(event.id.clone());
            continue;
        }
        trigger(&event, events, logger);
        processed.write().insert(event.id.clone());
    }
}

fn trigger(event: &ScheduledEvent, events: &UnboundedSender<Value>, logger: Option<&JsonLogger>) {
    let agi_event = json!({
        "type": "time_event",
        "source": "sensor_time",
        "payload": {
            "event_id": event.id,
            "event_type": event.event_type,
            "description": event.description,
            "data": event.payload,
        },
    });
    if let Some(logger) = logger {
        logger.event(
            LogLevel::Info,
            "sensors.time.triggered",
            json!({"event_id": event.id, "description": event.description}),
        );
    }
    let _ = events.send(agi_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn due_event_fires_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_events.json");
        let trigger_time = Utc::now() - chrono::Duration::seconds(5);
        tokio::fs::write(
            &path,
            serde_json::json!({
                "events": [{
                    "id": "deadline-1",
                    "type": "deadline",
                    "description": "submit report",
                    "trigger_time": trigger_time.to_rfc3339(),
                    "payload": {},
                }]
            })
            .to_string(),
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sensor = TimeSensor::new(path, tx).with_poll_interval(Duration::from_millis(20));
        sensor.start();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event["payload"]["event_id"], "deadline-1");

        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "dedup must suppress a second emission");
        sensor.stop();
    }

    #[tokio::test]
    async fn stale_event_is_marked_processed_without_emitting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_events.json");
        let trigger_time = Utc::now() - chrono::Duration::seconds(600);
        tokio::fs::write(
            &path,
            serde_json::json!({
                "events": [{
                    "id": "stale-1",
                    "type": "deadline",
                    "description": "old",
                    "trigger_time": trigger_time.to_rfc3339(),
                    "payload": {},
                }]
            })
            .to_string(),
        )
        .await
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sensor = TimeSensor::new(path, tx).with_poll_interval(Duration::from_millis(20));
        sensor.start();
        let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(result.is_err());
        sensor.stop();
    }
}
