//! Stage handlers: Intake, Discovery, Mentor
//!
//! Each handler takes the session with the current user turn already
//! appended, builds its prompt, calls the completion service and records the
//! result. A failed or timed-out completion becomes a fallback assistant turn;
//! handlers never return an error.

use super::CouncilPolicy;
use crate::llm::{complete_with_timeout, CompletionService, GenerationConfig};
use crate::personas::PersonaRegistry;
use crate::prompts;
use crate::retrieval::{search_with_timeout, ContextRetriever};
use crate::selector::MentorSelector;
use crate::types::{ConversationTurn, SessionState, Stage, TurnReply};
use std::sync::Arc;

/// Intake: longer than this many characters counts as enough context
pub const INTAKE_MIN_CHARS: usize = 100;
/// Intake: this many earlier user turns counts as enough context
pub const INTAKE_MIN_TURNS: usize = 2;
/// Discovery: longer than this many characters counts as enough context
pub const DISCOVERY_MIN_CHARS: usize = 150;
pub const DISCOVERY_MIN_TURNS: usize = 2;

/// Journal snippets pulled into a mentor prompt
pub const MENTOR_CONTEXT_SNIPPETS: usize = 3;
/// Earlier turns shown to the mentor
pub const MENTOR_HISTORY_TURNS: usize = 4;

pub const INTAKE_CONFIG: GenerationConfig = GenerationConfig::new(0.7, 500, 0.95);
pub const DISCOVERY_CONFIG: GenerationConfig = GenerationConfig::new(0.7, 300, 0.95);
pub const MENTOR_CONFIG: GenerationConfig = GenerationConfig::new(0.8, 500, 0.95);

/// Collaborators a handler may use
pub struct StageContext<'a> {
    pub registry: &'a PersonaRegistry,
    pub selector: &'a dyn MentorSelector,
    pub completion: &'a dyn CompletionService,
    pub retriever: &'a dyn ContextRetriever,
    pub policy: &'a CouncilPolicy,
}

/// What one handler pass produced
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// An assistant turn was appended
    Replied(TurnReply),
    /// State advanced without an assistant turn
    Advanced,
}

/// The message being handled and how many user turns came before it
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    pub text: &'a str,
    pub prior_user_turns: usize,
}

impl Incoming<'_> {
    fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

impl<'a> StageContext<'a> {
    async fn complete_or_fallback(
        &self,
        stage: Stage,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, String> {
        complete_with_timeout(self.completion, prompt, config, self.policy.completion_timeout)
            .await
            .map_err(|e| {
                tracing::warn!("[{}] Completion failed, using fallback: {:#}", stage.name().to_uppercase(), e);
                e.to_string()
            })
    }

    /// Run the handler for `stage`
    pub async fn run(
        &self,
        stage: Stage,
        state: &mut SessionState,
        incoming: Incoming<'_>,
    ) -> StageOutcome {
        let outcome = match stage {
            Stage::Intake => self.intake(state, incoming).await,
            Stage::Discovery => self.discovery(state, incoming).await,
            Stage::Mentor => self.mentor(state, incoming).await,
        };
        state.set_last_stage(stage);
        outcome
    }

    async fn intake(&self, state: &mut SessionState, incoming: Incoming<'_>) -> StageOutcome {
        let enough_context =
            incoming.chars() > INTAKE_MIN_CHARS || incoming.prior_user_turns >= INTAKE_MIN_TURNS;

        let selected = self
            .selector
            .select(self.registry, incoming.text, state.situation());
        state.pin_persona(selected.persona.id.clone());

        let prompt = prompts::intake_prompt(incoming.text, &selected.persona, enough_context);
        let text = match self.complete_or_fallback(Stage::Intake, &prompt, &INTAKE_CONFIG).await {
            Ok(text) => text,
            Err(e) => prompts::intake_fallback(&e),
        };

        state.push_turn(ConversationTurn::assistant(text.clone(), None));
        if enough_context {
            state.complete_discovery();
        }
        state.append_situation(incoming.text);

        tracing::info!(
            "[INTAKE] Pinned {} (score {}), enough context: {}",
            selected.persona.id,
            selected.score,
            enough_context
        );

        StageOutcome::Replied(TurnReply {
            assistant_text: text,
            persona_id: None,
            stage: Stage::Intake,
        })
    }

    async fn discovery(&self, state: &mut SessionState, incoming: Incoming<'_>) -> StageOutcome {
        let enough_context = incoming.prior_user_turns >= DISCOVERY_MIN_TURNS
            || incoming.chars() > DISCOVERY_MIN_CHARS;

        if enough_context {
            state.complete_discovery();
            state.append_situation(incoming.text);
            tracing::info!("[DISCOVERY] Enough context gathered, handing over to mentor");
            return StageOutcome::Advanced;
        }

        let prompt = prompts::discovery_prompt(incoming.text, state.situation());
        let text = match self
            .complete_or_fallback(Stage::Discovery, &prompt, &DISCOVERY_CONFIG)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                // Never leave the conversation stuck in discovery
                state.complete_discovery();
                prompts::discovery_fallback(&e)
            }
        };

        state.push_turn(ConversationTurn::assistant(text.clone(), None));
        state.append_situation(incoming.text);

        StageOutcome::Replied(TurnReply {
            assistant_text: text,
            persona_id: None,
            stage: Stage::Discovery,
        })
    }

    async fn mentor(&self, state: &mut SessionState, incoming: Incoming<'_>) -> StageOutcome {
        let persona = match state.pinned_persona().and_then(|id| self.registry.get(id)) {
            Some(persona) => persona,
            None => {
                let selected = self
                    .selector
                    .select(self.registry, incoming.text, state.situation());
                tracing::warn!(
                    "[MENTOR] No pinned persona for {}, selected {} on the fly",
                    state.user_id,
                    selected.persona.id
                );
                Arc::clone(&selected.persona)
            }
        };

        let context = search_with_timeout(
            self.retriever,
            &state.user_id,
            incoming.text,
            MENTOR_CONTEXT_SNIPPETS,
            self.policy.retrieval_timeout,
        )
        .await;
        tracing::info!("[MENTOR] {} with {} context snippet(s)", persona.id, context.len());

        // The current message is the last turn; the window is what came before it
        let turns = state.turns();
        let earlier = &turns[..turns.len().saturating_sub(1)];
        let window = &earlier[earlier.len().saturating_sub(MENTOR_HISTORY_TURNS)..];

        let prompt = prompts::mentor_prompt(&persona, &context, window, incoming.text);
        let text = match self.complete_or_fallback(Stage::Mentor, &prompt, &MENTOR_CONFIG).await {
            Ok(text) => text,
            Err(e) => prompts::mentor_fallback(&persona, &e),
        };

        state.push_turn(ConversationTurn::assistant(text.clone(), Some(persona.id.clone())));

        StageOutcome::Replied(TurnReply {
            assistant_text: text,
            persona_id: Some(persona.id.clone()),
            stage: Stage::Mentor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::KeywordSelector;
    use crate::testing::{FailingCompletion, ScriptedCompletion, StaticRetriever};

    struct Fixture {
        registry: PersonaRegistry,
        completion: ScriptedCompletion,
        retriever: StaticRetriever,
        policy: CouncilPolicy,
    }

    impl Fixture {
        fn new(completion: ScriptedCompletion) -> Self {
            Self {
                registry: PersonaRegistry::with_builtins(),
                completion,
                retriever: StaticRetriever::with(&["slept badly all week", "argued with Sam"]),
                policy: CouncilPolicy::default(),
            }
        }

        fn context(&self) -> StageContext<'_> {
            StageContext {
                registry: &self.registry,
                selector: &KeywordSelector,
                completion: &self.completion,
                retriever: &self.retriever,
                policy: &self.policy,
            }
        }
    }

    fn state_with_user_turn(text: &str) -> SessionState {
        let mut state = SessionState::new("u1");
        state.push_turn(ConversationTurn::user(text));
        state
    }

    fn first(text: &str) -> Incoming<'_> {
        Incoming { text, prior_user_turns: 0 }
    }

    #[tokio::test]
    async fn test_intake_pins_persona_and_records_situation() {
        let fx = Fixture::new(ScriptedCompletion::replying("I hear you."));
        let msg = "I'm stressed and feel no control";
        let mut state = state_with_user_turn(msg);

        let outcome = fx.context().run(Stage::Intake, &mut state, first(msg)).await;

        let StageOutcome::Replied(reply) = outcome else {
            panic!("intake must reply");
        };
        assert_eq!(reply.stage, Stage::Intake);
        assert_eq!(reply.persona_id, None);
        assert_eq!(state.pinned_persona(), Some("stoic"));
        assert!(!state.discovery_complete());
        assert_eq!(state.situation(), msg);
        assert_eq!(state.last_stage(), Some(Stage::Intake));
        assert_eq!(fx.completion.configs(), vec![INTAKE_CONFIG]);
    }

    #[tokio::test]
    async fn test_intake_long_message_completes_discovery() {
        let fx = Fixture::new(ScriptedCompletion::replying("ok"));
        let msg = "a".repeat(INTAKE_MIN_CHARS + 1);
        let mut state = state_with_user_turn(&msg);

        fx.context().run(Stage::Intake, &mut state, first(&msg)).await;
        assert!(state.discovery_complete());
        assert!(fx.completion.prompts()[0].contains("introduce"));
    }

    #[tokio::test]
    async fn test_intake_threshold_is_exclusive() {
        let fx = Fixture::new(ScriptedCompletion::replying("ok"));
        let msg = "a".repeat(INTAKE_MIN_CHARS);
        let mut state = state_with_user_turn(&msg);

        fx.context().run(Stage::Intake, &mut state, first(&msg)).await;
        assert!(!state.discovery_complete());
    }

    #[tokio::test]
    async fn test_intake_prior_turns_count_as_context() {
        let fx = Fixture::new(ScriptedCompletion::replying("ok"));
        let mut state = state_with_user_turn("hi");
        let incoming = Incoming { text: "hi", prior_user_turns: INTAKE_MIN_TURNS };

        fx.context().run(Stage::Intake, &mut state, incoming).await;
        assert!(state.discovery_complete());
    }

    #[tokio::test]
    async fn test_discovery_asks_when_context_is_thin() {
        let fx = Fixture::new(ScriptedCompletion::replying("What happened?"));
        let mut state = state_with_user_turn("work");
        state.pin_persona("sage");
        let incoming = Incoming { text: "work", prior_user_turns: 1 };

        let outcome = fx.context().run(Stage::Discovery, &mut state, incoming).await;

        assert!(matches!(outcome, StageOutcome::Replied(ref r) if r.assistant_text == "What happened?"));
        assert!(!state.discovery_complete());
        assert_eq!(fx.completion.configs(), vec![DISCOVERY_CONFIG]);
    }

    #[tokio::test]
    async fn test_discovery_short_circuits_without_completion() {
        let fx = Fixture::new(ScriptedCompletion::replying("unused"));
        let mut state = state_with_user_turn("third message");
        state.pin_persona("sage");
        let incoming = Incoming { text: "third message", prior_user_turns: DISCOVERY_MIN_TURNS };

        let outcome = fx.context().run(Stage::Discovery, &mut state, incoming).await;

        assert_eq!(outcome, StageOutcome::Advanced);
        assert!(state.discovery_complete());
        assert_eq!(state.situation(), "third message");
        assert_eq!(state.turns().len(), 1);
        assert_eq!(fx.completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_discovery_length_threshold_is_its_own() {
        // Long enough for intake, not for discovery
        let at_limit = "w".repeat(DISCOVERY_MIN_CHARS);
        let fx = Fixture::new(ScriptedCompletion::replying("Tell me more?"));
        let mut state = state_with_user_turn(&at_limit);
        state.pin_persona("sage");

        let outcome = fx
            .context()
            .run(Stage::Discovery, &mut state, Incoming { text: &at_limit, prior_user_turns: 1 })
            .await;
        assert!(matches!(outcome, StageOutcome::Replied(ref r) if r.stage == Stage::Discovery));
        assert!(!state.discovery_complete());
        assert_eq!(fx.completion.calls(), 1);

        let over_limit = "w".repeat(DISCOVERY_MIN_CHARS + 1);
        let fx = Fixture::new(ScriptedCompletion::replying("unused"));
        let mut state = state_with_user_turn(&over_limit);
        state.pin_persona("sage");

        let outcome = fx
            .context()
            .run(Stage::Discovery, &mut state, Incoming { text: &over_limit, prior_user_turns: 1 })
            .await;
        assert_eq!(outcome, StageOutcome::Advanced);
        assert!(state.discovery_complete());
        assert_eq!(fx.completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_discovery_failure_still_completes() {
        let registry = PersonaRegistry::with_builtins();
        let retriever = StaticRetriever::default();
        let policy = CouncilPolicy::default();
        let ctx = StageContext {
            registry: &registry,
            selector: &KeywordSelector,
            completion: &FailingCompletion("rate limited"),
            retriever: &retriever,
            policy: &policy,
        };
        let mut state = state_with_user_turn("hm");
        state.pin_persona("poet");

        let outcome = ctx
            .run(Stage::Discovery, &mut state, Incoming { text: "hm", prior_user_turns: 1 })
            .await;

        let StageOutcome::Replied(reply) = outcome else {
            panic!("fallback turn expected");
        };
        assert!(reply.assistant_text.contains("rate limited"));
        assert!(state.discovery_complete());
    }

    #[tokio::test]
    async fn test_mentor_uses_pinned_persona_context_and_window() {
        let fx = Fixture::new(ScriptedCompletion::replying("When I was emperor..."));
        let mut state = SessionState::new("u1");
        for i in 0..3 {
            state.push_turn(ConversationTurn::user(format!("user {}", i)));
            state.push_turn(ConversationTurn::assistant(format!("reply {}", i), None));
        }
        state.push_turn(ConversationTurn::user("what do I do about love?"));
        state.pin_persona("stoic");
        state.complete_discovery();
        let incoming = Incoming { text: "what do I do about love?", prior_user_turns: 3 };

        let outcome = fx.context().run(Stage::Mentor, &mut state, incoming).await;

        let StageOutcome::Replied(reply) = outcome else {
            panic!("mentor must reply");
        };
        // Love would match the poet, but the pinned persona wins
        assert_eq!(reply.persona_id.as_deref(), Some("stoic"));
        assert_eq!(state.turns().last().unwrap().persona_id.as_deref(), Some("stoic"));

        let prompt = &fx.completion.prompts()[0];
        assert!(prompt.contains("- slept badly all week"));
        assert!(!prompt.contains("user 0"));
        assert!(!prompt.contains("reply 0"));
        assert!(prompt.contains("User: user 1"));
        assert!(prompt.contains("Marcus Aurelius: reply 2"));
        assert_eq!(fx.completion.configs(), vec![MENTOR_CONFIG]);

        assert_eq!(
            fx.retriever.queries(),
            vec![("u1".to_string(), "what do I do about love?".to_string(), MENTOR_CONTEXT_SNIPPETS)]
        );
    }

    #[tokio::test]
    async fn test_mentor_without_pin_selects_on_the_fly() {
        let fx = Fixture::new(ScriptedCompletion::replying("ok"));
        let msg = "my heart aches with longing";
        let mut state = state_with_user_turn(msg);

        let outcome = fx.context().run(Stage::Mentor, &mut state, first(msg)).await;

        assert!(matches!(outcome, StageOutcome::Replied(ref r) if r.persona_id.as_deref() == Some("poet")));
        assert_eq!(state.pinned_persona(), None);
    }

    #[tokio::test]
    async fn test_mentor_failure_is_in_character() {
        let fx = Fixture::new(ScriptedCompletion::replying("unused").then_err("upstream 503"));
        let mut state = state_with_user_turn("hello");
        state.pin_persona("existentialist");
        state.complete_discovery();

        let outcome = fx
            .context()
            .run(Stage::Mentor, &mut state, Incoming { text: "hello", prior_user_turns: 3 })
            .await;

        let StageOutcome::Replied(reply) = outcome else {
            panic!("fallback turn expected");
        };
        assert!(reply.assistant_text.starts_with("Viktor Frankl"));
        assert!(reply.assistant_text.contains("upstream 503"));
        assert_eq!(reply.persona_id.as_deref(), Some("existentialist"));
    }
}
