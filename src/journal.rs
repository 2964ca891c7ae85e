//! Journaling workflow
//!
//! 1. `ingest`: store an entry, reflect an insight and ask follow-up questions
//! 2. `follow_up`: weave the answers into a richer entry and store that too
//!
//! The open exchange between the two steps is kept per user in memory.
//! Model failures fall back to fixed text; storage failures are errors.

use crate::db::JournalStore;
use crate::embeddings::{Embedder, EmbeddingTask};
use crate::error::{require_text, CouncilResult};
use crate::llm::{complete_with_timeout, CompletionService, GenerationConfig};
use crate::retrieval::{search_with_timeout, ContextRetriever};
use crate::types::{FollowUpAnalysis, FollowUpAnswer, JournalEntry, JournalResponse, JournalSession};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_QUESTIONS: usize = 3;
/// Earlier entries shown to the model when analysing a new one
pub const PRIOR_ENTRIES: usize = 3;
const PRIOR_ENTRY_PREVIEW_CHARS: usize = 200;

const ANALYSIS_CONFIG: GenerationConfig = GenerationConfig::new(0.7, 500, 0.95);
const SYNTHESIS_CONFIG: GenerationConfig = GenerationConfig::new(0.6, 600, 0.95);
const INSIGHT_CONFIG: GenerationConfig = GenerationConfig::new(0.7, 150, 0.95);

const FALLBACK_INSIGHT: &str = "Thank you for sharing.";
const FALLBACK_QUESTIONS: [&str; 3] = [
    "How did that make you feel in the moment?",
    "What do you think triggered these thoughts?",
    "Is there anything else you'd like to explore about this?",
];
const FALLBACK_DEEPER_INSIGHT: &str =
    "Taking the time to look deeper is itself an act of care. Notice what felt lighter as you wrote.";

/// Result of a journal search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSearch {
    pub query: String,
    pub results: Vec<String>,
    pub count: usize,
}

pub struct JournalService {
    store: Arc<JournalStore>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionService>,
    retriever: Arc<dyn ContextRetriever>,
    open_sessions: DashMap<String, JournalSession>,
    completion_timeout: Duration,
    retrieval_timeout: Duration,
}

impl JournalService {
    pub fn new(
        store: Arc<JournalStore>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionService>,
        retriever: Arc<dyn ContextRetriever>,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            retriever,
            open_sessions: DashMap::new(),
            completion_timeout: Duration::from_secs(30),
            retrieval_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, completion: Duration, retrieval: Duration) -> Self {
        self.completion_timeout = completion;
        self.retrieval_timeout = retrieval;
        self
    }

    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    /// Store a new entry and open a follow-up exchange for it
    pub async fn ingest(&self, user_id: &str, content: &str) -> CouncilResult<JournalResponse> {
        require_text("content", content)?;
        tracing::info!("[JOURNAL] Ingesting {} chars for {}", content.chars().count(), user_id);

        let previous = search_with_timeout(
            self.retriever.as_ref(),
            user_id,
            content,
            PRIOR_ENTRIES,
            self.retrieval_timeout,
        )
        .await;

        let analysis = self.analyze(content, &previous).await;
        self.open_sessions.insert(
            user_id.to_string(),
            JournalSession {
                original_entry: content.to_string(),
                insight: analysis.insight.clone(),
                questions: analysis.questions.clone(),
            },
        );

        let entry = self.save(user_id, content).await?;

        Ok(JournalResponse {
            status: "success".to_string(),
            entry_id: Some(entry.id),
            follow_up_questions: Some(analysis.questions),
            insights: Some(analysis.insight),
            message: Some("Entry saved. Would you like to explore deeper?".to_string()),
        })
    }

    /// Fold follow-up answers into a synthesized entry and close the exchange
    pub async fn follow_up(
        &self,
        user_id: &str,
        original_entry: &str,
        answers: &[FollowUpAnswer],
    ) -> CouncilResult<JournalResponse> {
        require_text("original_entry", original_entry)?;
        tracing::info!("[JOURNAL] Follow-up with {} answer(s) for {}", answers.len(), user_id);

        let synthesized = self.synthesize(original_entry, answers).await;
        let entry = self.save(user_id, &synthesized).await?;

        let insight = match complete_with_timeout(
            self.completion.as_ref(),
            &insight_prompt(&synthesized),
            &INSIGHT_CONFIG,
            self.completion_timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[JOURNAL] Insight generation failed: {:#}", e);
                FALLBACK_DEEPER_INSIGHT.to_string()
            }
        };

        self.open_sessions.remove(user_id);

        Ok(JournalResponse {
            status: "success".to_string(),
            entry_id: Some(entry.id),
            follow_up_questions: None,
            insights: Some(insight),
            message: Some(
                "Your deeper reflection has been saved. It will help your mentors understand you better."
                    .to_string(),
            ),
        })
    }

    pub async fn search(&self, user_id: &str, query: &str, top_k: usize) -> CouncilResult<JournalSearch> {
        require_text("query", query)?;
        let results = search_with_timeout(
            self.retriever.as_ref(),
            user_id,
            query,
            top_k,
            self.retrieval_timeout,
        )
        .await;

        Ok(JournalSearch {
            query: query.to_string(),
            count: results.len(),
            results,
        })
    }

    /// The open exchange awaiting follow-up answers, if any
    pub fn session(&self, user_id: &str) -> Option<JournalSession> {
        self.open_sessions.get(user_id).map(|s| s.value().clone())
    }

    /// Store with an embedding when one can be made
    pub async fn save(&self, user_id: &str, content: &str) -> CouncilResult<JournalEntry> {
        let embedding = match tokio::time::timeout(
            self.retrieval_timeout,
            self.embedder.embed(content, EmbeddingTask::Document),
        )
        .await
        {
            Ok(Ok(vec)) => Some(vec),
            Ok(Err(e)) => {
                tracing::warn!("[JOURNAL] Storing without embedding: {:#}", e);
                None
            }
            Err(_) => {
                tracing::warn!("[JOURNAL] Embedding timed out, storing without it");
                None
            }
        };

        let entry = self.store.insert_entry(user_id, content, embedding.as_deref())?;
        tracing::info!("[JOURNAL] Stored entry {}", entry.id);
        Ok(entry)
    }

    async fn analyze(&self, content: &str, previous: &[String]) -> FollowUpAnalysis {
        let prompt = analysis_prompt(content, previous);
        match complete_with_timeout(
            self.completion.as_ref(),
            &prompt,
            &ANALYSIS_CONFIG,
            self.completion_timeout,
        )
        .await
        {
            Ok(text) => parse_follow_up(&text),
            Err(e) => {
                tracing::warn!("[JOURNAL] Question generation failed: {:#}", e);
                fallback_analysis()
            }
        }
    }

    async fn synthesize(&self, original_entry: &str, answers: &[FollowUpAnswer]) -> String {
        let transcript = answers_transcript(answers);
        let prompt = synthesis_prompt(original_entry, &transcript);
        match complete_with_timeout(
            self.completion.as_ref(),
            &prompt,
            &SYNTHESIS_CONFIG,
            self.completion_timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[JOURNAL] Synthesis failed, concatenating: {:#}", e);
                if transcript.is_empty() {
                    original_entry.to_string()
                } else {
                    format!("{}\n\n{}", original_entry, transcript)
                }
            }
        }
    }
}

fn fallback_analysis() -> FollowUpAnalysis {
    FollowUpAnalysis {
        insight: FALLBACK_INSIGHT.to_string(),
        questions: FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect(),
    }
}

/// Parse an `INSIGHT:` line and the numbered list after `QUESTIONS:`
///
/// Missing pieces are filled from the fallback analysis.
pub fn parse_follow_up(text: &str) -> FollowUpAnalysis {
    let mut insight = String::new();
    let mut questions = Vec::new();
    let mut in_questions = false;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("INSIGHT:") {
            insight = rest.trim().to_string();
        } else if line.starts_with("QUESTIONS:") {
            in_questions = true;
        } else if in_questions
            && line.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        {
            let question = line
                .trim_start_matches(|c: char| c.is_ascii_digit() || ".-) ".contains(c))
                .trim();
            if !question.is_empty() {
                questions.push(question.to_string());
            }
        }
    }
    questions.truncate(MAX_QUESTIONS);

    let fallback = fallback_analysis();
    FollowUpAnalysis {
        insight: if insight.is_empty() { fallback.insight } else { insight },
        questions: if questions.is_empty() { fallback.questions } else { questions },
    }
}

fn answers_transcript(answers: &[FollowUpAnswer]) -> String {
    answers
        .iter()
        .map(|a| format!("Q: {}\nA: {}", a.question, a.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn analysis_prompt(content: &str, previous: &[String]) -> String {
    let context = if previous.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = previous
            .iter()
            .take(PRIOR_ENTRIES)
            .map(|entry| {
                let preview: String = entry.chars().take(PRIOR_ENTRY_PREVIEW_CHARS).collect();
                format!("- {}...", preview)
            })
            .collect();
        format!("\nPREVIOUS JOURNAL ENTRIES (for context):\n{}\n", lines.join("\n"))
    };

    format!(
        r#"You are a thoughtful journal companion holding a gentle, curious conversation.
Help the writer explore their thoughts and feelings a little more deeply.
{context}
CURRENT ENTRY:
{content}

Notice the emotional themes in the entry, including feelings they did not name.
Ask 2-3 open, non-judgmental questions that invite reflection on patterns or beliefs.

FORMAT YOUR RESPONSE EXACTLY LIKE THIS:
INSIGHT: [1-2 sentence observation about their entry]

QUESTIONS:
1. [First follow-up question]
2. [Second follow-up question]
3. [Optional third follow-up question]"#
    )
}

fn synthesis_prompt(original_entry: &str, transcript: &str) -> String {
    format!(
        r#"Help write a single, rich journal entry.

ORIGINAL ENTRY:
{original_entry}

FOLLOW-UP CONVERSATION:
{transcript}

Write one cohesive first-person entry that weaves all of this together in the writer's own voice.
Do not add interpretations they did not express. 2-4 paragraphs at most."#
    )
}

fn insight_prompt(entry: &str) -> String {
    format!(
        "Offer a brief, warm observation (1-2 sentences) about this journal entry that might help \
         the writer notice a pattern or feel understood:\n\n{}",
        entry
    )
}
