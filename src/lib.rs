//! The Mirror - journaling, guided meditation and a council of mentors
//!
//! A conversation walks through three stages before a mentor speaks:
//!
//! - **Intake**: an empathetic voice validates the feeling and quietly picks a
//!   mentor by keyword affinity
//! - **Discovery**: a curious voice asks clarifying questions until there is
//!   enough context
//! - **Mentor**: the pinned persona answers in its own voice, drawing on the
//!   user's earlier journal entries
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mirror_council::{CouncilEngine, PersonaRegistry};
//! use mirror_council::llm::GeminiClient;
//! use mirror_council::retrieval::JournalRetriever;
//!
//! let engine = CouncilEngine::new(Arc::new(PersonaRegistry::with_builtins()), completion, retriever);
//!
//! let reply = engine.handle_message(user_id, "I'm stressed about everything").await?;
//! println!("[{}] {}", reply.stage, reply.assistant_text);
//!
//! engine.select_mentor_explicitly(user_id, "buddhist").await?;
//! engine.exit_mentor(user_id).await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Web client / terminal REPL              │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ HTTP + WebSocket
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                    The Mirror                        │
//! │  council    → intake / discovery / mentor            │
//! │  journal    → insight + follow-up questions          │
//! │  meditation → staged scripts over a live socket      │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │ generateContent          │ embedContent
//!            ▼                          ▼
//!      hosted model              SQLite journal store
//! ```

pub mod config;
pub mod council;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod journal;
pub mod llm;
pub mod meditation;
pub mod personas;
pub mod profile;
pub mod prompts;
pub mod retrieval;
pub mod selector;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Core types
pub use council::{CouncilEngine, CouncilPolicy};
pub use error::{CouncilError, CouncilResult};
pub use personas::PersonaRegistry;
pub use selector::{KeywordSelector, MentorMatch, MentorSelector};
pub use session::SessionStore;
pub use types::*;

// External collaborators
pub use llm::{CompletionService, GeminiClient, GenerationConfig};
pub use retrieval::{ContextRetriever, JournalRetriever};
pub use embeddings::{Embedder, GeminiEmbedder};
pub use db::{init_db, JournalStore};

// Services
pub use journal::JournalService;
pub use meditation::MeditationService;
pub use config::Settings;
