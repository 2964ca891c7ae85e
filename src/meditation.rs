//! Guided meditation
//!
//! A fixed sequence of stages, each narrated by a generated script. Every
//! stage has a hand-written script to fall back on, so a session never
//! stalls on the model. The live session protocol is a small set of
//! JSON frames tagged by `type`.

use crate::error::{require_text, CouncilError, CouncilResult};
use crate::journal::JournalService;
use crate::llm::{complete_with_timeout, CompletionService, GenerationConfig};
use crate::profile;
use crate::types::{MeditationPlan, MeditationStageInfo, ReflectionResponse, StageContent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SCRIPT_CONFIG: GenerationConfig = GenerationConfig::new(0.85, 600, 0.95);
const INSIGHT_CONFIG: GenerationConfig = GenerationConfig::new(0.8, 150, 0.95);

pub const REFLECTION_PREFIX: &str = "[Meditation Reflection]";
const FALLBACK_REFLECTION_INSIGHT: &str =
    "Thank you for sharing your thoughts. May this peace stay with you.";
const SESSION_COMPLETE_MESSAGE: &str =
    "Your meditation is complete. Take a moment to notice how you feel.";

/// One stage of a guided session
#[derive(Debug, Clone, Copy)]
pub struct StageDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Seconds
    pub duration: u32,
    pub icon: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub fallback: &'static str,
}

impl StageDef {
    pub fn info(&self) -> MeditationStageInfo {
        MeditationStageInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            duration: self.duration,
            icon: self.icon.to_string(),
            description: self.description.to_string(),
        }
    }
}

pub const STAGES: [StageDef; 5] = [
    StageDef {
        id: "welcome",
        name: "Welcome",
        duration: 30,
        icon: "heart",
        description: "Setting intentions",
        prompt: "Write a warm, gentle welcome to a meditation, as a caring friend sitting beside them.\n\
                 Acknowledge that they chose to pause, invite them to get comfortable, and remind them \
                 there is nowhere else to be.\n\
                 3-4 short sentences of flowing prose, no lists.",
        fallback: "You're here... and that's enough.\n\n\
                   Find a position that feels good... let your body settle... there's no rush.\n\n\
                   Whatever brought you here today can wait a few minutes... you can set it down.\n\n\
                   Right now there's just this breath... this moment... and you.",
    },
    StageDef {
        id: "breathing",
        name: "Breathing",
        duration: 120,
        icon: "wind",
        description: "Deep breathing exercises",
        prompt: "Guide a gentle breathing exercise with a rhythm like soft waves.\n\
                 Begin with the breath as it already is, then invite deeper breaths through 3-4 cycles \
                 of breathing in, holding softly and releasing slowly. Count gently (\"two... three... \
                 four...\") and weave in images of tides or drifting clouds. Leave room for silence.",
        fallback: "Notice the breath already moving through you... nothing to change... just noticing...\n\n\
                   When you're ready... let the next breath in grow a little deeper... two... three... four...\n\n\
                   Hold it gently... two... three... four...\n\n\
                   And release... soft and slow... two... three... four...\n\n\
                   Again... breathing in like the tide... holding... and letting go like a wave returning to the sea...\n\n\
                   One more time... fill up with ease... hold this fullness... and let go completely.\n\n\
                   Breathe naturally now... noticing the calm that has settled in.",
    },
    StageDef {
        id: "bodyscan",
        name: "Body Scan",
        duration: 90,
        icon: "user",
        description: "Release physical tension",
        prompt: "Guide a slow body scan, moving like warm sunlight across the skin.\n\
                 Start at the crown of the head, soften the forehead, eyes and jaw, let the shoulders \
                 drop, the arms grow heavy, the chest open and the belly soften, then release the hips, \
                 legs and feet into the ground. Use words of warmth, weight and softness.",
        fallback: "Bring your attention to the top of your head... a warm light resting there...\n\n\
                   Let it drift across your forehead... your eyes soften... your jaw lets go...\n\n\
                   The warmth flows into your shoulders... they drop... setting down what they carry...\n\n\
                   Down through your arms... heavy and easy... to the tips of your fingers...\n\n\
                   Your chest rises and falls on its own... your belly soft...\n\n\
                   Hips releasing... legs heavy against the ground... all the way to your toes... held... at rest.",
    },
    StageDef {
        id: "visualization",
        name: "Visualization",
        duration: 90,
        icon: "eye",
        description: "Peaceful imagery",
        prompt: "Paint a peaceful sanctuary in words: a forest glade, a beach at sunset, a mountain \
                 meadow, or a cozy room with rain outside.\n\
                 Describe what they see, hear, feel on their skin and smell, and the deep safety of the \
                 place. Speak in the present tense (\"you find yourself...\", \"you notice...\") and let \
                 the scene unfold slowly.",
        fallback: "You find yourself in a quiet meadow... soft gold light of late afternoon all around...\n\n\
                   The grass is soft beneath you... warm air on your skin... a faint scent of wildflowers...\n\n\
                   Somewhere far off, birdsong... leaves stirring in a breeze you can barely feel...\n\n\
                   Nothing to do here... nowhere to go... nothing to solve...\n\n\
                   This place is yours... you can come back whenever you need it...\n\n\
                   Safe... quiet... deeply at rest.",
    },
    StageDef {
        id: "closing",
        name: "Closing",
        duration: 30,
        icon: "sun",
        description: "Gentle return",
        prompt: "Gently bring them back, like waking slowly from a peaceful dream.\n\
                 Let them notice the room again, move their fingers, take a deeper breath, and carry the \
                 calm with them. Close with quiet gratitude for their practice. Keep it brief.",
        fallback: "Gently... in your own time... notice the room around you again...\n\n\
                   The surface beneath you... the air on your skin... sounds near and far...\n\n\
                   Wiggle your fingers if you like... take a breath that's a little deeper...\n\n\
                   When you're ready... let your eyes open...\n\n\
                   This quiet is yours to carry... thank you for giving yourself these moments.",
    },
];

pub fn find_stage(stage_id: &str) -> Option<&'static StageDef> {
    STAGES.iter().find(|s| s.id == stage_id)
}

pub fn plan() -> MeditationPlan {
    MeditationPlan {
        stages: STAGES.iter().map(StageDef::info).collect(),
        total_duration: total_duration(),
    }
}

pub fn total_duration() -> u32 {
    STAGES.iter().map(|s| s.duration).sum()
}

/// Client -> server frames
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartStage { stage_id: String },
    StageComplete { stage_id: String },
    SessionComplete,
    Ping,
}

/// Server -> client frames
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StageContent {
        stage_id: String,
        content: String,
        duration: u32,
    },
    StageCompleteAck { stage_id: String },
    SessionCompleteAck { message: String },
    Pong,
    Error { message: String },
}

pub struct MeditationService {
    completion: Arc<dyn CompletionService>,
    journal: Arc<JournalService>,
    timeout: Duration,
}

impl MeditationService {
    pub fn new(completion: Arc<dyn CompletionService>, journal: Arc<JournalService>) -> Self {
        Self {
            completion,
            journal,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generated script for a stage, or its fixed script if generation fails
    pub async fn stage_content(&self, stage_id: &str, user_id: &str) -> CouncilResult<StageContent> {
        let stage = find_stage(stage_id)
            .ok_or_else(|| CouncilError::NotFound(format!("meditation stage {}", stage_id)))?;

        let prompt = script_prompt(stage, user_id);
        let content =
            match complete_with_timeout(self.completion.as_ref(), &prompt, &SCRIPT_CONFIG, self.timeout)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("[MEDITATION] Script for {} failed, using fallback: {:#}", stage.id, e);
                    stage.fallback.to_string()
                }
            };

        Ok(StageContent {
            stage_id: stage.id.to_string(),
            stage_name: stage.name.to_string(),
            content,
            duration: stage.duration,
        })
    }

    /// Reply to a post-session reflection and keep it in the journal
    pub async fn reflection(&self, user_id: &str, content: &str) -> CouncilResult<ReflectionResponse> {
        require_text("content", content)?;
        tracing::info!("[MEDITATION] Saving reflection for {}", user_id);

        let insight = match complete_with_timeout(
            self.completion.as_ref(),
            &reflection_prompt(content),
            &INSIGHT_CONFIG,
            self.timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[MEDITATION] Reflection insight failed: {:#}", e);
                FALLBACK_REFLECTION_INSIGHT.to_string()
            }
        };

        let entry = format!("{}\n{}", REFLECTION_PREFIX, content);
        if let Err(e) = self.journal.save(user_id, &entry).await {
            tracing::warn!("[MEDITATION] Could not store reflection: {}", e);
        }

        Ok(ReflectionResponse {
            status: "success".to_string(),
            message: "Your reflection has been saved.".to_string(),
            insight: Some(insight),
        })
    }

    /// Answer one text frame of a live session
    pub async fn handle_frame(&self, user_id: &str, raw: &str) -> ServerMessage {
        let message = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("[MEDITATION] Malformed frame: {}", e);
                return ServerMessage::Error {
                    message: format!("Malformed message: {}", e),
                };
            }
        };

        match message {
            ClientMessage::StartStage { stage_id } => {
                tracing::info!("[MEDITATION] Starting stage {}", stage_id);
                match self.stage_content(&stage_id, user_id).await {
                    Ok(content) => ServerMessage::StageContent {
                        stage_id: content.stage_id,
                        content: content.content,
                        duration: content.duration,
                    },
                    Err(e) => ServerMessage::Error { message: e.to_string() },
                }
            }
            ClientMessage::StageComplete { stage_id } => {
                tracing::info!("[MEDITATION] Stage complete: {}", stage_id);
                ServerMessage::StageCompleteAck { stage_id }
            }
            ClientMessage::SessionComplete => {
                tracing::info!("[MEDITATION] Session complete");
                ServerMessage::SessionCompleteAck {
                    message: SESSION_COMPLETE_MESSAGE.to_string(),
                }
            }
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }
}

fn script_prompt(stage: &StageDef, user_id: &str) -> String {
    let mut prompt = String::from(
        "You are a meditation guide with a voice like warm honey: soft, slow and deeply calming.\n\n\
         Style:\n\
         - Speak as if to someone you care about\n\
         - Simple, sensory words (soft, warm, gentle, light, ease)\n\
         - Short sentences, with \"...\" for pauses\n\
         - Everything is an invitation, never a command (\"you might notice...\")\n\
         - Avoid \"Now\", \"Next\", \"Let's\" and \"I want you to\"\n",
    );

    let context = profile::personalization_context(user_id);
    if !context.is_empty() {
        prompt.push_str(&format!(
            "\nAbout the person you are guiding:\n{}\nAddress them as {} once, gently. \
             Do not list their worries back to them.\n",
            context,
            profile::greeting_name(user_id)
        ));
        if stage.id == "welcome" {
            let ack = profile::stress_acknowledgment(user_id);
            if !ack.is_empty() {
                prompt.push_str(&format!("You may softly acknowledge: \"{}\".\n", ack));
            }
        }
    }

    prompt.push('\n');
    prompt.push_str(stage.prompt);
    prompt
}

fn reflection_prompt(content: &str) -> String {
    format!(
        "Someone just finished a meditation and shared this reflection:\n\n\"{}\"\n\n\
         Write a brief, warm reply (2-3 sentences) that acknowledges what they shared, reflects \
         back something meaningful, and offers a gentle affirmation. Soft, like a kind friend.",
        content
    )
}
