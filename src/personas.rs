//! Persona Registry: the council of mentors
//!
//! A read-only table of personas built once at start-up. Lookups go through
//! an id index; listing preserves definition order.
//!
//! The built-in catalog can be replaced by a JSON file:
//!
//! ```json
//! { "default_id": "default", "personas": [ { "id": "stoic", ... } ] }
//! ```

use crate::types::{Persona, PersonaSummary};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Id of the built-in fallback persona
pub const DEFAULT_PERSONA_ID: &str = "default";

/// Immutable persona catalog
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Arc<Persona>>,
    index: HashMap<String, usize>,
    default_idx: usize,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default_id: String,
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Build a registry, validating ids and the designated default
    pub fn new(personas: Vec<Persona>, default_id: &str) -> Result<Self> {
        if personas.is_empty() {
            bail!("persona catalog is empty");
        }

        let mut index = HashMap::with_capacity(personas.len());
        for (i, persona) in personas.iter().enumerate() {
            if persona.id.trim().is_empty() {
                bail!("persona at position {} has an empty id", i);
            }
            if index.insert(persona.id.clone(), i).is_some() {
                bail!("duplicate persona id: {}", persona.id);
            }
        }

        let default_idx = *index
            .get(default_id)
            .with_context(|| format!("default persona '{}' not in catalog", default_id))?;

        Ok(Self {
            personas: personas.into_iter().map(Arc::new).collect(),
            index,
            default_idx,
        })
    }

    /// The built-in council
    pub fn with_builtins() -> Self {
        let personas = builtin_personas();
        let index = personas
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect::<HashMap<_, _>>();
        let default_idx = personas.len() - 1;

        Self {
            personas: personas.into_iter().map(Arc::new).collect(),
            index,
            default_idx,
        }
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona catalog at {:?}", path))?;
        let catalog: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid persona catalog at {:?}", path))?;
        Self::new(catalog.personas, &catalog.default_id)
    }

    /// Load from `path` when given, falling back to the built-ins on any error
    pub fn load_or_builtins(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load personas: {:#}, using builtins only", e);
                Self::with_builtins()
            }),
            None => Self::with_builtins(),
        }
    }

    /// All personas in definition order
    pub fn list(&self) -> &[Arc<Persona>] {
        &self.personas
    }

    pub fn summaries(&self) -> Vec<PersonaSummary> {
        self.personas.iter().map(|p| p.summary()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Persona>> {
        self.index.get(id).map(|&i| Arc::clone(&self.personas[i]))
    }

    pub fn default_persona(&self) -> Arc<Persona> {
        Arc::clone(&self.personas[self.default_idx])
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn tags(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in catalog. The fallback persona must stay last.
fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "stoic".to_string(),
            name: "Marcus Aurelius".to_string(),
            title: "Stoic philosopher and Roman Emperor".to_string(),
            era: "Rome, 121-180 CE".to_string(),
            expertise: tags(&["stoicism", "resilience", "self-discipline", "adversity"]),
            keywords: tags(&[
                "stress", "control", "anxiety", "worry", "acceptance", "fear", "anger",
            ]),
            philosophy: "Focus on what you can control. Accept what you cannot. \
                         Practice virtue and wisdom in every small act."
                .to_string(),
            speaking_style: "Measured and plain-spoken, like notes written to himself at \
                             the end of a long day; gentle firmness, no ornament."
                .to_string(),
            notable_works: tags(&["Meditations"]),
            signature_quote: Some(
                "You have power over your mind, not outside events. Realize this, and you \
                 will find strength."
                    .to_string(),
            ),
        },
        Persona {
            id: "buddhist".to_string(),
            name: "Thich Nhat Hanh".to_string(),
            title: "Zen Buddhist monk and mindfulness teacher".to_string(),
            era: "Vietnam and France, 1926-2022".to_string(),
            expertise: tags(&["zen", "meditation practice", "impermanence", "mindful living"]),
            keywords: tags(&[
                "peace",
                "mindfulness",
                "present",
                "compassion",
                "suffering",
                "meditation",
                "calm",
                "breath",
            ]),
            philosophy: "Be present in the moment. Practice compassion. Understand the \
                         nature of suffering and it begins to loosen."
                .to_string(),
            speaking_style: "Soft, slow and poetic; simple images from daily life like \
                             tea, clouds and walking; every sentence an invitation."
                .to_string(),
            notable_works: tags(&["The Miracle of Mindfulness", "Peace Is Every Step"]),
            signature_quote: Some(
                "Walk as if you are kissing the Earth with your feet.".to_string(),
            ),
        },
        Persona {
            id: "sage".to_string(),
            name: "Confucius".to_string(),
            title: "Chinese philosopher and teacher".to_string(),
            era: "State of Lu, 551-479 BCE".to_string(),
            expertise: tags(&["ethics", "education", "social harmony", "filial piety"]),
            keywords: tags(&[
                "relationship", "family", "work", "duty", "respect", "harmony", "parent",
                "friend",
            ]),
            philosophy: "Cultivate virtue through learning. Respect relationships. \
                         Practice benevolence toward those around you."
                .to_string(),
            speaking_style: "Patient and aphoristic; answers with a short saying and a \
                             story about a student, then turns the question back."
                .to_string(),
            notable_works: tags(&["The Analects"]),
            signature_quote: Some(
                "It does not matter how slowly you go as long as you do not stop.".to_string(),
            ),
        },
        Persona {
            id: "existentialist".to_string(),
            name: "Viktor Frankl".to_string(),
            title: "psychiatrist, Holocaust survivor and founder of logotherapy".to_string(),
            era: "Vienna, 1905-1997".to_string(),
            expertise: tags(&["logotherapy", "meaning-making", "grief work", "psychiatry"]),
            keywords: tags(&[
                "meaning", "purpose", "grief", "loss", "hopeless", "empty", "direction",
            ]),
            philosophy: "Between stimulus and response there is a space. In that space \
                         is our freedom to choose, and in our choice lies our growth."
                .to_string(),
            speaking_style: "Warm, clinical precision softened by lived experience; \
                             speaks of hard things without flinching and always points \
                             toward a why."
                .to_string(),
            notable_works: tags(&["Man's Search for Meaning"]),
            signature_quote: Some(
                "Those who have a 'why' to live, can bear with almost any 'how'.".to_string(),
            ),
        },
        Persona {
            id: "poet".to_string(),
            name: "Rumi".to_string(),
            title: "Persian poet and Sufi mystic".to_string(),
            era: "Anatolia, 1207-1273".to_string(),
            expertise: tags(&["poetry", "spiritual love", "inner journey"]),
            keywords: tags(&[
                "love", "heart", "lonely", "longing", "heartbreak", "creativity", "joy",
            ]),
            philosophy: "The wound is the place where the light enters you. What you \
                         seek is seeking you."
                .to_string(),
            speaking_style: "Lyrical and tender, rich with metaphor of reed flutes, \
                             taverns and gardens; speaks to the heart before the mind."
                .to_string(),
            notable_works: tags(&["Masnavi", "Divan-e Shams"]),
            signature_quote: Some(
                "Let yourself be silently drawn by the strange pull of what you really \
                 love."
                    .to_string(),
            ),
        },
        Persona {
            id: DEFAULT_PERSONA_ID.to_string(),
            name: "The Wise Elder".to_string(),
            title: "compassionate guide".to_string(),
            era: "timeless".to_string(),
            expertise: Vec::new(),
            keywords: Vec::new(),
            philosophy: "Draw upon your own wisdom and experiences. You know yourself \
                         better than anyone."
                .to_string(),
            speaking_style: "Kind, grounded and unhurried, like a grandparent on a porch \
                             swing."
                .to_string(),
            notable_works: Vec::new(),
            signature_quote: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn persona(id: &str) -> Persona {
        Persona {
            id: id.to_string(),
            name: id.to_uppercase(),
            title: "t".to_string(),
            era: "e".to_string(),
            expertise: vec![],
            keywords: vec![],
            philosophy: "p".to_string(),
            speaking_style: "s".to_string(),
            notable_works: vec![],
            signature_quote: None,
        }
    }

    #[test]
    fn test_builtins_have_unique_ids_and_default_last() {
        let registry = PersonaRegistry::with_builtins();
        let ids: Vec<_> = registry.list().iter().map(|p| p.id.clone()).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), unique.len(), "Persona IDs should be unique");

        let default = registry.default_persona();
        assert_eq!(default.id, DEFAULT_PERSONA_ID);
        assert!(!default.has_tags(), "Default persona must carry no tags");
        assert_eq!(ids.last().map(String::as_str), Some(DEFAULT_PERSONA_ID));
    }

    #[test]
    fn test_builtin_tags_are_lowercase() {
        for persona in PersonaRegistry::with_builtins().list() {
            for tag in persona.keywords.iter().chain(persona.expertise.iter()) {
                assert_eq!(tag, &tag.to_lowercase(), "{} has mixed-case tag", persona.id);
            }
        }
    }

    #[test]
    fn test_stoic_carries_stress_and_control() {
        let registry = PersonaRegistry::with_builtins();
        let stoic = registry.get("stoic").unwrap();
        assert!(stoic.keywords.contains(&"stress".to_string()));
        assert!(stoic.keywords.contains(&"control".to_string()));
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = PersonaRegistry::with_builtins();
        assert!(registry.get("nobody").is_none());
    }

    #[test]
    fn test_list_is_stable() {
        let registry = PersonaRegistry::with_builtins();
        assert_eq!(registry.summaries(), registry.summaries());
        assert_eq!(registry.summaries()[0].id, "stoic");
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let err = PersonaRegistry::new(vec![persona("a"), persona("a")], "a").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_new_rejects_missing_default() {
        assert!(PersonaRegistry::new(vec![persona("a")], "b").is_err());
        assert!(PersonaRegistry::new(vec![], "a").is_err());
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("personas.json");
        let mut coach = persona("coach");
        coach.keywords = vec!["goal".to_string()];
        let body = serde_json::json!({
            "default_id": "fallback",
            "personas": [coach, persona("fallback")],
        });
        std::fs::write(&path, body.to_string()).unwrap();

        let registry = PersonaRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.default_persona().id, "fallback");
        assert_eq!(registry.get("coach").unwrap().keywords, vec!["goal"]);
    }

    #[test]
    fn test_load_or_builtins_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let registry = PersonaRegistry::load_or_builtins(Some(&path));
        assert!(registry.get("stoic").is_some());
    }
}
