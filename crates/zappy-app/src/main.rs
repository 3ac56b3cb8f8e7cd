//! Binary entrypoint: loads configuration, opens the persistence layer,
//! assembles an [`zappy_agi::Agi`] via [`zappy_agi::AgiBuilder`], starts the
//! background sensor drivers, and runs an interactive goal/sensor loop.
//! Grounded on the teacher's own top-level `entire_system_orchestrator.rs`
//! (`bootstrap`/`run`/`main` shape), adapted from its 14-subsystem command
//! dispatch down to the single-facade `Agi::execute`/`handle_sensor_event`
//! surface this runtime actually exposes.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use zappy_agi::{Agi, AgiBuilder};
use zappy_config_store::env_config::RuntimeConfig;
use zappy_config_store::perceptions::PerceptionStore;
use zappy_config_store::system_config::SystemConfigStore;
use zappy_logging::{JsonLogger, LogLevel};
use zappy_memory::long_term::LongTermMemory;
use zappy_memory::short_term::ShortTermMemory;
use zappy_memory::MemoryStore;
use zappy_model_router::{AnthropicProvider, ModelCandidate, ModelRouter, OpenAiProvider, TaskClass};
use zappy_perception::PerceptionLayer;
use zappy_persistence::{migrate_skills_db, migrate_state_db, Database};
use zappy_reflex::ReflexLayer;
use zappy_sensors::{AudioCapture, AudioGate, TimeSensor, VoiceEar};
use zappy_skill_registry::SkillRegistry;

const ANTHROPIC_MODEL: &str = "claude-3-7-sonnet-20250219";
const ANTHROPIC_FAST_MODEL: &str = "claude-3-5-haiku-20241022";
const OPENAI_MODEL: &str = "gpt-4o";
const OPENAI_FAST_MODEL: &str = "gpt-4o-mini";

/// Microphone backend is out of scope (§4.7 Non-goals); this capture never
/// produces a chunk, so `VoiceEar` stays alive (and the `voice_commander`
/// reflex stays wired and testable end-to-end via synthetic sensor events)
/// without a real audio dependency. Swap in a real [`AudioCapture`] to
/// light up the sensor for a particular deployment.
struct NullAudioCapture;

#[async_trait]
impl AudioCapture for NullAudioCapture {
    async fn listen_chunk(&self) -> Option<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        None
    }
}

/// Everything `main` drives: the assembled facade plus the background
/// sensor drivers feeding it events. The sensors are kept alive for their
/// `Drop`-free lifetime (`stop()` aborts their task on shutdown) rather
/// than detached, matching `VoiceEar`/`TimeSensor`'s handle-owning design.
struct App {
    agi: Agi,
    sensor_events: mpsc::UnboundedReceiver<Value>,
    time_sensor: TimeSensor,
    voice_ear: VoiceEar,
}

impl App {
    async fn bootstrap() -> Result<Self> {
        let config = RuntimeConfig::from_env();
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;
        std::fs::create_dir_all("logs").context("failed to create logs directory")?;

        let logger = Arc::new(
            JsonLogger::to_file("logs/zappy.log.jsonl").context("failed to open the structured log file")?,
        );
        logger.event(LogLevel::Info, "app.bootstrap.started", json!({}));

        let skills_db = Database::open(config.data_dir.join("skills.sqlite3"), migrate_skills_db)
            .context("failed to open the skills database")?;
        let state_db = Database::open(config.data_dir.join("state.sqlite3"), migrate_state_db)
            .context("failed to open the state database")?;

        let system_config = SystemConfigStore::new(state_db.clone());
        let router = Arc::new(build_router(&config, &system_config));

        let skills = Arc::new(SkillRegistry::new(skills_db).with_logger(Arc::clone(&logger)));
        let memory = Arc::new(MemoryStore::new(
            ShortTermMemory::new(),
            LongTermMemory::new(state_db.clone()),
        ));
        let perception = Arc::new(PerceptionLayer::new(PerceptionStore::new(state_db)).with_logger(Arc::clone(&logger)));
        let reflexes = Arc::new(ReflexLayer::new());

        let skills_dir = config.data_dir.join("skills");
        if skills_dir.is_dir() {
            match skills.load_directory(&skills_dir).await {
                Ok(count) => logger.event(
                    LogLevel::Info,
                    "app.bootstrap.dynamic_skills_loaded",
                    json!({"count": count}),
                ),
                Err(err) => logger.event(
                    LogLevel::Warn,
                    "app.bootstrap.dynamic_skills_load_failed",
                    json!({"error": err.to_string()}),
                ),
            }
        }

        if router.has_embedding_provider() {
            if let Err(err) = skills.ensure_embeddings(&router).await {
                logger.event(
                    LogLevel::Warn,
                    "app.bootstrap.embedding_backfill_failed",
                    json!({"error": err.to_string()}),
                );
            }
        }

        let gate = AudioGate::new();
        let agi = AgiBuilder::new(Arc::clone(&router), memory, skills, perception, reflexes)
            .with_logger(Arc::clone(&logger))
            .with_event_log(config.data_dir.join("events.jsonl"))
            .with_audio_gate(Arc::clone(&gate))
            .build()
            .await
            .context("failed to assemble the agi facade")?;

        let (sensor_tx, sensor_events) = mpsc::unbounded_channel();
        let mut voice_ear = VoiceEar::new(Arc::new(NullAudioCapture), gate, sensor_tx.clone())
            .with_logger(Arc::clone(&logger));
        voice_ear.start();

        let mut time_sensor = TimeSensor::new(config.data_dir.join("scheduled_events.json"), sensor_tx)
            .with_logger(Arc::clone(&logger));
        time_sensor.start();

        logger.event(LogLevel::Info, "app.bootstrap.completed", json!({}));

        Ok(Self {
            agi,
            sensor_events,
            time_sensor,
            voice_ear,
        })
    }

    async fn run(mut self) -> Result<()> {
        println!("Zappy agentic runtime ready. Type a goal, or 'exit' to quit.");
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        loop {
            print!("zappy> ");
            std::io::stdout().flush().ok();

            tokio::select! {
                line = lines.next_line() => {
                    let line = line.context("failed reading from stdin")?;
                    let Some(line) = line else { break };
                    let goal = line.trim();
                    if goal.is_empty() {
                        continue;
                    }
                    if matches!(goal, "exit" | "quit") {
                        break;
                    }
                    match self.agi.execute(goal, None, false).await {
                        Ok(outcome) => println!("{}", outcome.reply),
                        Err(err) => println!("error: {err}"),
                    }
                }
                Some(event) = self.sensor_events.recv() => {
                    for result in self.agi.handle_sensor_event(&event).await {
                        if let Err(err) = result {
                            eprintln!("reflex execution failed: {err}");
                        }
                    }
                }
            }
        }

        self.voice_ear.stop();
        self.time_sensor.stop();
        Ok(())
    }
}

/// Registers the Anthropic and OpenAI(-compatible) providers present in the
/// environment and builds each [`TaskClass`]'s priority table, letting a
/// persisted `system_config` override win over the primary provider's
/// default model (§6, §2a).
fn build_router(config: &RuntimeConfig, system_config: &SystemConfigStore) -> ModelRouter {
    let mut builder = ModelRouter::builder();

    let anthropic_key = config.provider_keys.get("anthropic").cloned().unwrap_or_default();
    builder = builder.provider(Arc::new(AnthropicProvider::new(anthropic_key)));

    let openai_key = config.provider_keys.get("openai").cloned().unwrap_or_default();
    builder = builder.provider(Arc::new(OpenAiProvider::new("openai", openai_key)));

    if let Some(compat_key) = config.provider_keys.get("openai_compatible").cloned() {
        let base_url = std::env::var("ZAPPY_OPENAI_COMPATIBLE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434/v1".to_string());
        builder = builder.provider(Arc::new(
            OpenAiProvider::new("openai_compatible", compat_key).with_base_url(base_url),
        ));
    }

    for task_class in [
        TaskClass::Planning,
        TaskClass::Coding,
        TaskClass::Creative,
        TaskClass::Fast,
        TaskClass::General,
    ] {
        let (label, anthropic_default, openai_model) = match task_class {
            TaskClass::Planning => ("PLANNING", ANTHROPIC_MODEL, OPENAI_MODEL),
            TaskClass::Coding => ("CODING", ANTHROPIC_MODEL, OPENAI_MODEL),
            TaskClass::Creative => ("CREATIVE", ANTHROPIC_MODEL, OPENAI_MODEL),
            TaskClass::Fast => ("FAST", ANTHROPIC_FAST_MODEL, OPENAI_FAST_MODEL),
            TaskClass::General => ("GENERAL", ANTHROPIC_FAST_MODEL, OPENAI_FAST_MODEL),
        };
        let anthropic_model = config.resolve_model(system_config, label, anthropic_default);
        builder = builder.priority(
            task_class,
            vec![
                ModelCandidate::new("anthropic", anthropic_model),
                ModelCandidate::new("openai", openai_model),
            ],
        );
    }

    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::bootstrap().await?;
    app.run().await
}
