use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use zappy_logging::{JsonLogger, LogLevel};

use crate::gate::AudioGate;

/// Minimum length (bytes) a flushed phrase must reach to be emitted; guards
/// against echo-like one/two-character noise, matching the distilled
/// source's `len(full_text) < 3` check.
const MIN_PHRASE_LEN: usize = 3;

/// Yields one transcribed chunk of speech per call, or `None` on a listen
/// timeout with no speech detected. Implementations wrap whatever speech
/// backend is available; tests use an in-memory fake.
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Waits for and transcribes the next chunk of speech.
    async fn listen_chunk(&self) -> Option<String>;
}

/// The runtime's "ear": a continuous background listener that debounces
/// successive speech chunks into one goal before emitting a `voice_input`
/// event (§4.7).
pub struct VoiceEar {
    capture: Arc<dyn AudioCapture>,
    gate: Arc<AudioGate>,
    events: UnboundedSender<Value>,
    logger: Option<Arc<JsonLogger>>,
    debounce: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VoiceEar {
    /// Wires a capture backend, the shared speaking gate, and the event
    /// channel the runtime drains on its main loop.
    #[must_use]
    pub fn new(capture: Arc<dyn AudioCapture>, gate: Arc<AudioGate>, events: UnboundedSender<Value>) -> Self {
        Self {
            capture,
            gate,
            events,
            logger: None,
            debounce: Duration::from_millis(1500),
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

    /// Overrides the default 1.5s debounce window.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Starts the background listen loop. A no-op if already running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let capture = Arc::clone(&self.capture);
        let gate = Arc::clone(&self.gate);
        let events = self.events.clone();
        let logger = self.logger.clone();
        let debounce = self.debounce;
        let running = Arc::clone(&self.running);

        self.handle = Some(tokio::spawn(async move {
            let mut buffer: Vec<String> = Vec::new();
            let mut last_speech = tokio::time::Instant::now();
            while running.load(Ordering::Acquire) {
                if gate.is_speaking() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
                match capture.listen_chunk().await {
                    Some(text) if !text.trim().is_empty() => {
                        buffer.push(text.trim().to_string());
                        last_speech = tokio::time::Instant::now();
                    }
                    _ => {}
                }
                if !buffer.is_empty() && last_speech.elapsed() >= debounce {
                    flush(&mut buffer, &events, logger.as_deref());
                }
            }
        }));
    }

    /// Stops the background listen loop.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn flush(buffer: &mut Vec<String>, events: &UnboundedSender<Value>, logger: Option<&JsonLogger>) {
    let full_text = buffer.join(" ");
    buffer.clear();
    if full_text.len() < MIN_PHRASE_LEN {
        return;
    }
    let event = json!({
        "type": "voice_input",
        "source": "sensor_ear",
        "payload": {"text": full_text, "status": "success"},
    });
    if let Some(logger) = logger {
        logger.event(LogLevel::Info, "sensors.ear.debounce_complete", json!({"text": full_text}));
    }
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct ScriptedCapture {
        chunks: Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl AudioCapture for ScriptedCapture {
        async fn listen_chunk(&self) -> Option<String> {
            let mut chunks = self.chunks.lock().unwrap();
            if chunks.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
                return None;
            }
            chunks.remove(0)
        }
    }

    #[tokio::test]
    async fn debounced_chunks_flush_as_one_event() {
        let capture = Arc::new(ScriptedCapture {
            chunks: Mutex::new(vec![Some("what".to_string()), Some("time is it".to_string())]),
        });
        let gate = AudioGate::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ear = VoiceEar::new(capture, gate, tx).with_debounce(Duration::from_millis(30));
        ear.start();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event["payload"]["text"], "what time is it");
        ear.stop();
    }

    #[tokio::test]
    async fn speaking_gate_suppresses_capture() {
        let capture = Arc::new(ScriptedCapture {
            chunks: Mutex::new(vec![Some("echoed back".to_string())]),
        });
        let gate = AudioGate::new();
        gate.begin_speaking();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ear = VoiceEar::new(capture, gate, tx).with_debounce(Duration::from_millis(30));
        ear.start();
        let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(result.is_err());
        ear.stop();
    }
}
