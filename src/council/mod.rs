//! Council engine
//!
//! Sequences a conversation through three stages:
//! - Intake: empathetic first contact, picks and pins a mentor
//! - Discovery: clarifying questions until there is enough context
//! - Mentor: the pinned persona answers in its own voice
//!
//! `CouncilEngine` is the session API used by the transport layer and the
//! REPL. Turns for one user are serialized through the session store; a
//! turn holds its user's lock for its whole duration and writes its changes
//! back only when it finishes.

pub mod router;
pub mod stages;

pub use router::route;
pub use stages::{Incoming, StageContext, StageOutcome};

use crate::error::{require_text, CouncilError, CouncilResult};
use crate::llm::CompletionService;
use crate::personas::PersonaRegistry;
use crate::retrieval::ContextRetriever;
use crate::selector::{KeywordSelector, MentorMatch, MentorSelector};
use crate::session::SessionStore;
use crate::types::{ConversationTurn, PersonaSummary, SessionState, TurnReply};
use std::sync::Arc;
use std::time::Duration;

/// Deadlines and switches for the engine
#[derive(Debug, Clone)]
pub struct CouncilPolicy {
    pub completion_timeout: Duration,
    pub retrieval_timeout: Duration,
    /// Clear the accumulated situation when the user leaves a mentor
    pub reset_situation_on_exit: bool,
}

impl Default for CouncilPolicy {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(30),
            retrieval_timeout: Duration::from_secs(10),
            reset_situation_on_exit: false,
        }
    }
}

impl CouncilPolicy {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            completion_timeout: settings.llm_timeout,
            retrieval_timeout: settings.retrieval_timeout,
            reset_situation_on_exit: settings.reset_situation_on_exit,
        }
    }
}

pub struct CouncilEngine {
    registry: Arc<PersonaRegistry>,
    selector: Arc<dyn MentorSelector>,
    completion: Arc<dyn CompletionService>,
    retriever: Arc<dyn ContextRetriever>,
    sessions: SessionStore,
    policy: CouncilPolicy,
}

impl CouncilEngine {
    pub fn new(
        registry: Arc<PersonaRegistry>,
        completion: Arc<dyn CompletionService>,
        retriever: Arc<dyn ContextRetriever>,
    ) -> Self {
        Self {
            registry,
            selector: Arc::new(KeywordSelector),
            completion,
            retriever,
            sessions: SessionStore::new(),
            policy: CouncilPolicy::default(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn MentorSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_policy(mut self, policy: CouncilPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn policy(&self) -> &CouncilPolicy {
        &self.policy
    }

    fn stage_context(&self) -> StageContext<'_> {
        StageContext {
            registry: &self.registry,
            selector: self.selector.as_ref(),
            completion: self.completion.as_ref(),
            retriever: self.retriever.as_ref(),
            policy: &self.policy,
        }
    }

    /// Handle one user message and return the assistant's reply
    pub async fn handle_message(&self, user_id: &str, text: &str) -> CouncilResult<TurnReply> {
        require_text("message", text)?;

        let mut guard = self.sessions.lock(user_id).await;
        // Stored only once a reply exists; a dropped turn leaves the session as it was
        let mut state = guard.draft();

        let incoming = Incoming {
            text,
            prior_user_turns: state.user_turn_count(),
        };
        state.push_turn(ConversationTurn::user(text));

        let ctx = self.stage_context();

        // A pass that only advances state is followed by one more pass so the
        // caller always gets a reply
        for _ in 0..2 {
            let stage = route(&state);
            tracing::info!("[COUNCIL] {} -> {}", user_id, stage);
            if let StageOutcome::Replied(reply) = ctx.run(stage, &mut state, incoming).await {
                guard.commit(state);
                return Ok(reply);
            }
        }

        Err(CouncilError::Internal(anyhow::anyhow!(
            "no stage produced a reply for {}",
            user_id
        )))
    }

    /// Delete the user's session; the next message starts from intake
    pub async fn reset_session(&self, user_id: &str) -> bool {
        self.sessions.reset(user_id).await
    }

    /// Pin a persona and skip straight to mentor responses
    pub async fn select_mentor_explicitly(
        &self,
        user_id: &str,
        persona_id: &str,
    ) -> CouncilResult<PersonaSummary> {
        let persona = self
            .registry
            .get(persona_id)
            .ok_or_else(|| CouncilError::UnknownPersona(persona_id.to_string()))?;

        let mut guard = self.sessions.lock(user_id).await;
        let state = guard.get_or_create();
        state.pin_persona(persona.id.clone());
        state.complete_discovery();

        tracing::info!("[COUNCIL] {} chose {} explicitly", user_id, persona.id);
        Ok(persona.summary())
    }

    /// Leave the current mentor; the next message goes back through intake
    pub async fn exit_mentor(&self, user_id: &str) -> CouncilResult<()> {
        let no_session = || CouncilError::NoActiveSession(user_id.to_string());
        let mut guard = self.sessions.lock_existing(user_id).await.ok_or_else(no_session)?;
        let state = guard.state_mut().ok_or_else(no_session)?;

        state.exit_mentor();
        if self.policy.reset_situation_on_exit {
            state.clear_situation();
        }

        tracing::info!("[COUNCIL] {} left their mentor", user_id);
        Ok(())
    }

    pub fn list_personas(&self) -> Vec<PersonaSummary> {
        self.registry.summaries()
    }

    /// The mentor the selector would pick for this text
    pub fn preview_mentor(&self, message: &str, situation: &str) -> MentorMatch {
        self.selector.select(&self.registry, message, situation)
    }

    pub async fn get_session(&self, user_id: &str) -> CouncilResult<SessionState> {
        self.sessions
            .snapshot(user_id)
            .await
            .ok_or_else(|| CouncilError::NoActiveSession(user_id.to_string()))
    }

    pub fn evict_idle(&self, max_idle: chrono::Duration) -> usize {
        self.sessions.evict_idle(max_idle)
    }
}
