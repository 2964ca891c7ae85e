//! Prompt assembly for the council stages
//!
//! Everything here is a pure function of its inputs so the exact text sent
//! to the model can be tested without a model.

use crate::types::{ConversationTurn, Persona, Role};

/// Empathetic first contact. When `enough_context` is set the voice also
/// offers to bring in the selected mentor.
pub fn intake_prompt(message: &str, mentor: &Persona, enough_context: bool) -> String {
    let introduction = if enough_context {
        format!(
            "\nYou have heard enough to help. After validating their feelings, gently offer to \
             introduce {name}, {title} ({era}), who has walked a similar road. Mention the name \
             and why this voice may help in one sentence.",
            name = mentor.name,
            title = mentor.title,
            era = mentor.era,
        )
    } else {
        "\nDo not offer advice or introduce anyone yet. Invite them to share a little more."
            .to_string()
    };

    format!(
        r#"You are The Empath, a compassionate mindfulness guide.
Your role is to:
1. Help the user identify and name their emotions
2. Provide a safe space for venting
3. Offer gentle validation without judgment
{introduction}

Keep responses warm and concise (2-3 sentences).

User: {message}

Assistant:"#
    )
}

/// Curious guide asking clarifying questions, no advice yet
pub fn discovery_prompt(message: &str, situation: &str) -> String {
    let shared = if situation.trim().is_empty() {
        String::new()
    } else {
        format!("\nWhat they have shared so far:\n{}\n", situation.trim())
    };

    format!(
        r#"You are The Curious Guide, helping someone understand their situation before any advice is given.
{shared}
Ask one or two brief, open-ended clarifying questions about what they just said.
Do NOT give advice, solutions or reassurance yet. Keep it to 2 sentences.

User: {message}

Assistant:"#
    )
}

/// Persona-voiced mentor response
pub fn mentor_prompt(
    persona: &Persona,
    context: &[String],
    history: &[ConversationTurn],
    message: &str,
) -> String {
    let mut prompt = format!(
        "You are {name}, {title} ({era}).\n\nYour philosophy: {philosophy}\nYour speaking style: {style}\n",
        name = persona.name,
        title = persona.title,
        era = persona.era,
        philosophy = persona.philosophy,
        style = persona.speaking_style,
    );

    if !persona.notable_works.is_empty() {
        prompt.push_str(&format!("You wrote: {}\n", persona.notable_works.join(", ")));
    }

    if !context.is_empty() {
        prompt.push_str("\nBased on what they have written in their journal before:\n");
        for snippet in context {
            prompt.push_str(&format!("- {}\n", snippet.trim()));
        }
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => persona.name.as_str(),
            };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.text.trim()));
        }
    }

    prompt.push_str(&format!(
        r#"
Respond in your own voice as {name}:
1. Validate what they are feeling first
2. Share a brief first-person anecdote from your own life
3. Offer a perspective, not an instruction
4. End with exactly one open question

Keep it to 4-6 sentences.

User: {message}

{name}:"#,
        name = persona.name,
    ));

    prompt
}

pub fn intake_fallback(error: &str) -> String {
    format!(
        "I'm here with you, and I want to understand. I had trouble finding my words just now \
         ({}). Could you tell me a little more about what's on your mind?",
        error
    )
}

pub fn discovery_fallback(error: &str) -> String {
    format!(
        "Thank you for sharing that. Something interrupted my thoughts for a moment ({}), \
         but I've heard enough to bring in a guide for you.",
        error
    )
}

pub fn mentor_fallback(persona: &Persona, error: &str) -> String {
    format!(
        "{} pauses, gathering their thoughts... Forgive me, my words escape me for a moment \
         ({}). Stay with me, and tell me again what weighs on you most.",
        persona.name, error
    )
}
