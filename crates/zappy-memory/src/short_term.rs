use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zappy_model_router::{ChatMessage, ModelRouter, ModelRouterError, TaskClass};

const DEFAULT_CAPACITY: usize = 10;

/// One `{goal, result, timestamp}` turn (§3 "Short-Term Conversation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The user goal that produced this turn.
    pub goal: String,
    /// The resolved final reply.
    pub result: String,
    /// When the turn completed.
    pub timestamp: DateTime<Utc>,
}

/// The working-memory snapshot handed to the planner's prompt (§4.3).
#[derive(Debug, Clone, Serialize)]
pub struct WorkingMemory {
    /// Recent turns, oldest first.
    pub recent: Vec<ConversationTurn>,
    /// Rolling compressed summary of older history, if computed.
    pub summary: Option<String>,
    /// Free-form emotional-state label, perceived out of band.
    pub emotional_state: Option<String>,
}

/// Bounded FIFO ring of recent dialogue turns (§3, §4.3). Single-writer:
/// only the AGI facade mutates this (§5).
pub struct ShortTermMemory {
    turns: RwLock<VecDeque<ConversationTurn>>,
    capacity: usize,
    summary: RwLock<Option<String>>,
    emotional_state: RwLock<Option<String>>,
}

impl ShortTermMemory {
    /// Creates a ring with the default capacity of 10.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a ring with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            summary: RwLock::new(None),
            emotional_state: RwLock::new(None),
        }
    }

    /// Appends a turn, evicting the oldest if at capacity.
    pub fn add(&self, goal: impl Into<String>, result: impl Into<String>) {
        let mut turns = self.turns.write();
        if turns.len() >= self.capacity {
            turns.pop_front();
        }
        turns.push_back(ConversationTurn {
            goal: goal.into(),
            result: result.into(),
            timestamp: Utc::now(),
        });
    }

    /// Records a perceived emotional-state label (fed by a fire-and-forget
    /// perception, §4.12).
    pub fn set_emotional_state(&self, state: impl Into<String>) {
        *self.emotional_state.write() = Some(state.into());
    }

    /// Current turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.read().iter().cloned().collect()
    }

    /// The list + rolling summary + emotional state (§4.3).
    #[must_use]
    pub fn working_memory(&self) -> WorkingMemory {
        WorkingMemory {
            recent: self.turns(),
            summary: self.summary.read().clone(),
            emotional_state: self.emotional_state.read().clone(),
        }
    }

    /// Compresses the current turns into a rolling summary via the Model
    /// Router's FAST task class. Degrades silently (leaves the prior
    /// summary untouched) if there is nothing to summarise or the model
    /// call fails — summarisation is a convenience, not load-bearing.
    pub async fn update_summary(&self, router: &ModelRouter) -> Result<(), ModelRouterError> {
        let turns = self.turns();
        if turns.is_empty() {
            return Ok(());
        }
        let transcript = turns
            .iter()
            .map(|t| format!("Goal: {}\nReply: {}", t.goal, t.result))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let messages = vec![
            ChatMessage::system("Summarise this conversation history in two or three sentences."),
            ChatMessage::user(transcript),
        ];
        let summary = router.chat(TaskClass::Fast, &messages, 0.2, 256).await?;
        *self.summary.write() = Some(summary);
        Ok(())
    }

    /// Removes every stored turn and summary (tests, and post-summarisation
    /// clearing).
    pub fn clear(&self) {
        self.turns.write().clear();
        *self.summary.write() = None;
    }
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction_respects_capacity() {
        let memory = ShortTermMemory::with_capacity(2);
        memory.add("g1", "r1");
        memory.add("g2", "r2");
        memory.add("g3", "r3");
        let turns = memory.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].goal, "g2");
        assert_eq!(turns[1].goal, "g3");
    }

    #[test]
    fn working_memory_reflects_emotional_state() {
        let memory = ShortTermMemory::new();
        memory.set_emotional_state("curious");
        assert_eq!(memory.working_memory().emotional_state.as_deref(), Some("curious"));
    }
}
