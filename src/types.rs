//! Core types for The Mirror
//!
//! These types carry the conversation through the council:
//! - Personas are immutable voices, looked up by id
//! - Turns are append-only
//! - Session state is owned by the session store, one per user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mentor persona in the council
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub title: String,
    pub era: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub philosophy: String,
    pub speaking_style: String,
    #[serde(default)]
    pub notable_works: Vec<String>,
    #[serde(default)]
    pub signature_quote: Option<String>,
}

impl Persona {
    /// Personas without any tags are never scored, only used as fallback
    pub fn has_tags(&self) -> bool {
        !self.keywords.is_empty() || !self.expertise.is_empty()
    }

    pub fn summary(&self) -> PersonaSummary {
        PersonaSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
            era: self.era.clone(),
            expertise: self.expertise.clone(),
            signature_quote: self.signature_quote.clone(),
        }
    }
}

/// What the transport layer shows about a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub title: String,
    pub era: String,
    pub expertise: Vec<String>,
    pub signature_quote: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    /// Persona id that spoke this turn (mentor stage only)
    pub persona_id: Option<String>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            persona_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>, persona_id: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            persona_id,
        }
    }
}

/// The handler that produced a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Intake,
    Discovery,
    Mentor,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Discovery => "discovery",
            Stage::Mentor => "mentor",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a session sits in the intake -> discovery -> mentor sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No persona pinned yet
    NeedsIntake,
    /// Persona pinned, still gathering context
    NeedsDiscovery,
    /// Persona pinned and discovery complete
    Ready,
}

impl Phase {
    /// The handler a session in this phase is dispatched to
    pub fn stage(&self) -> Stage {
        match self {
            Phase::NeedsIntake => Stage::Intake,
            Phase::NeedsDiscovery => Stage::Discovery,
            Phase::Ready => Stage::Mentor,
        }
    }
}

/// Per-user conversation state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub user_id: String,
    turns: Vec<ConversationTurn>,
    situation: String,
    discovery_complete: bool,
    pinned_persona: Option<String>,
    last_stage: Option<Stage>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            turns: Vec::new(),
            situation: String::new(),
            discovery_complete: false,
            pinned_persona: None,
            last_stage: None,
            created_at: now,
            last_active: now,
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn situation(&self) -> &str {
        &self.situation
    }

    pub fn discovery_complete(&self) -> bool {
        self.discovery_complete
    }

    pub fn pinned_persona(&self) -> Option<&str> {
        self.pinned_persona.as_deref()
    }

    pub fn last_stage(&self) -> Option<Stage> {
        self.last_stage
    }

    pub fn phase(&self) -> Phase {
        match (&self.pinned_persona, self.discovery_complete) {
            (None, _) => Phase::NeedsIntake,
            (Some(_), false) => Phase::NeedsDiscovery,
            (Some(_), true) => Phase::Ready,
        }
    }

    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.last_active = Utc::now();
    }

    /// The last `n` turns, oldest first
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn append_situation(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.situation.is_empty() {
            self.situation.push('\n');
        }
        self.situation.push_str(text);
    }

    pub fn clear_situation(&mut self) {
        self.situation.clear();
    }

    /// Monotonic: only `exit_mentor` / reset can take it back to false
    pub fn complete_discovery(&mut self) {
        self.discovery_complete = true;
    }

    pub fn pin_persona(&mut self, persona_id: impl Into<String>) {
        self.pinned_persona = Some(persona_id.into());
    }

    /// Clears the pinned persona and the discovery flag together
    pub fn exit_mentor(&mut self) {
        self.pinned_persona = None;
        self.discovery_complete = false;
    }

    pub fn set_last_stage(&mut self, stage: Stage) {
        self.last_stage = Some(stage);
    }
}

/// Result of one `handle_message` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnReply {
    pub assistant_text: String,
    pub persona_id: Option<String>,
    pub stage: Stage,
}

// ============================================================================
// Journal
// ============================================================================

/// A stored journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Insight plus follow-up questions for a fresh entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FollowUpAnalysis {
    pub insight: String,
    pub questions: Vec<String>,
}

/// An open journaling exchange awaiting follow-up answers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalSession {
    pub original_entry: String,
    pub insight: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalResponse {
    pub status: String,
    pub entry_id: Option<String>,
    pub follow_up_questions: Option<Vec<String>>,
    pub insights: Option<String>,
    pub message: Option<String>,
}

// ============================================================================
// Meditation
// ============================================================================

/// A meditation stage as shown to the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeditationStageInfo {
    pub id: String,
    pub name: String,
    pub duration: u32,
    pub icon: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeditationPlan {
    pub stages: Vec<MeditationStageInfo>,
    pub total_duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageContent {
    pub stage_id: String,
    pub stage_name: String,
    pub content: String,
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionResponse {
    pub status: String,
    pub message: String,
    pub insight: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_needs_intake() {
        let state = SessionState::new("u1");
        assert_eq!(state.phase(), Phase::NeedsIntake);
        assert_eq!(state.phase().stage(), Stage::Intake);
        assert!(state.turns().is_empty());
    }

    #[test]
    fn test_phase_follows_pin_and_discovery() {
        let mut state = SessionState::new("u1");
        state.pin_persona("stoic");
        assert_eq!(state.phase(), Phase::NeedsDiscovery);

        state.complete_discovery();
        assert_eq!(state.phase(), Phase::Ready);

        state.exit_mentor();
        assert_eq!(state.phase(), Phase::NeedsIntake);
        assert!(!state.discovery_complete());
    }

    #[test]
    fn test_recent_turns_window() {
        let mut state = SessionState::new("u1");
        for i in 0..6 {
            state.push_turn(ConversationTurn::user(format!("m{}", i)));
        }
        let recent = state.recent_turns(4);
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(state.recent_turns(10).len(), 6);
    }

    #[test]
    fn test_append_situation_joins_lines() {
        let mut state = SessionState::new("u1");
        state.append_situation("first");
        state.append_situation("   ");
        state.append_situation("second");
        assert_eq!(state.situation(), "first\nsecond");
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&Stage::Discovery).unwrap();
        assert_eq!(json, "\"discovery\"");
    }
}
