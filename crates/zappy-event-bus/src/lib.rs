#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Typed broadcast bus carrying the §3 `Event` vocabulary between the AGI
//! facade's pipeline and any number of streaming consumers (§4.13).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use zappy_core::event::Event;

/// Publishes [`Event`]s onto a bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: Event) -> Result<()>;
}

/// Subscribes to a bus, receiving every event published after the
/// subscription was created (broadcast semantics, not replay).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Begins consuming events.
    async fn subscribe(&self) -> Result<broadcast::Receiver<Event>>;
}

/// In-memory broadcast bus backing the facade's `execute_streaming` and any
/// number of external relays.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<Event>,
    backlog: Arc<Mutex<VecDeque<Event>>>,
}

impl MemoryEventBus {
    /// Creates a new bus retaining up to `capacity` events for
    /// [`MemoryEventBus::snapshot`] and buffering at most `capacity`
    /// un-consumed broadcasts per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Snapshot of recently published events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.backlog.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > backlog.capacity().max(1) {
                backlog.pop_front();
            }
        }
        // A publish with no active subscribers is not an error: reflex- and
        // sensor-driven plans may run with nobody streaming.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<Event>> {
        Ok(self.sender.subscribe())
    }
}

/// Durable JSON-lines sink: every published event is appended regardless of
/// whether any subscriber is listening, for offline inspection (§4.13).
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher appending JSON lines to `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// The four envelope names an external HTTP layer frames an [`Event`] under
/// (§6): `start`/`done` bracket one execution, `error` carries a terminal
/// failure, everything else is an `update` carrying the full typed payload.
fn sse_event_name(event: &Event) -> &'static str {
    match event {
        Event::PlanStarted { .. } | Event::ExecutionStarted { .. } => "start",
        Event::ExecutionCompleted { .. } => "done",
        Event::PlanningError { .. } | Event::Error { .. } => "error",
        _ => "update",
    }
}

/// Frames one [`Event`] as a Server-Sent Events record: `event: <name>` then
/// `data: <json>`, blank-line terminated (§6). The HTTP transport itself is
/// out of scope; this is the thin formatting step a consumer's HTTP stack
/// wires a byte stream around.
///
/// # Errors
///
/// Returns an error if `event` cannot be serialised to JSON.
pub fn to_sse(event: &Event) -> Result<String> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {data}\n\n", sse_event_name(event)))
}

/// Fans a publish out to two sinks at once — typically a [`MemoryEventBus`]
/// for live consumers and a [`FileEventPublisher`] for the durable log.
pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    /// Creates a fanout over the given sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: Event) -> Result<()> {
        for sink in &self.sinks {
            sink.publish(event.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zappy_core::event::EventPhase;

    fn sample_event() -> Event {
        Event::IntentDetected {
            phase: EventPhase::Planning,
            intent: "CHAT".into(),
        }
    }

    #[tokio::test]
    async fn publishes_and_receives() {
        let bus = MemoryEventBus::new(16);
        let mut rx = bus.subscribe().await.unwrap();
        bus.publish(sample_event()).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::IntentDetected { .. }));
    }

    #[tokio::test]
    async fn file_publisher_writes_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let publisher = FileEventPublisher::new(&path).unwrap();
        publisher.publish(sample_event()).await.unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("intent_detected"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = MemoryEventBus::new(4);
        bus.publish(sample_event()).await.unwrap();
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn sse_frames_an_update_event_with_its_json_payload() {
        let frame = to_sse(&sample_event()).unwrap();
        assert!(frame.starts_with("event: update\ndata: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"intent_detected\""));
    }

    #[test]
    fn sse_names_start_done_and_error_envelopes() {
        let start = Event::ExecutionStarted {
            phase: EventPhase::Execution,
            action_count: 3,
        };
        let done = Event::ExecutionCompleted {
            phase: EventPhase::Execution,
            success: true,
            result: None,
            errors: vec![],
        };
        let error = Event::Error {
            phase: EventPhase::Execution,
            kind: "fatal_system_error".into(),
            message: "db unavailable".into(),
        };
        assert!(to_sse(&start).unwrap().starts_with("event: start\n"));
        assert!(to_sse(&done).unwrap().starts_with("event: done\n"));
        assert!(to_sse(&error).unwrap().starts_with("event: error\n"));
    }
}
