//! Mentor Selector
//!
//! Picks the persona whose tags best match what the user has said so far.
//! Matching is plain lowercase substring search: no stemming, no word
//! boundaries. Keyword hits weigh 2, expertise hits weigh 1.

use crate::personas::PersonaRegistry;
use crate::types::Persona;
use std::sync::Arc;

/// Minimum score for a tagged persona to beat the default
pub const MIN_MATCH_SCORE: u32 = 2;

const KEYWORD_WEIGHT: u32 = 2;
const EXPERTISE_WEIGHT: u32 = 1;

/// A selected persona and how strongly it matched
#[derive(Debug, Clone)]
pub struct MentorMatch {
    pub persona: Arc<Persona>,
    pub score: u32,
}

/// Strategy for choosing a mentor from the registry
pub trait MentorSelector: Send + Sync {
    fn select(&self, registry: &PersonaRegistry, message: &str, situation: &str) -> MentorMatch;
}

/// Keyword-substring scoring
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSelector;

impl KeywordSelector {
    /// Score one persona against already-lowercased text
    pub fn score(persona: &Persona, text: &str) -> u32 {
        let keyword_hits = persona
            .keywords
            .iter()
            .filter(|kw| text.contains(kw.to_lowercase().as_str()))
            .count() as u32;
        let expertise_hits = persona
            .expertise
            .iter()
            .filter(|tag| text.contains(tag.to_lowercase().as_str()))
            .count() as u32;

        keyword_hits * KEYWORD_WEIGHT + expertise_hits * EXPERTISE_WEIGHT
    }
}

impl MentorSelector for KeywordSelector {
    fn select(&self, registry: &PersonaRegistry, message: &str, situation: &str) -> MentorMatch {
        let text = format!("{} {}", message, situation).to_lowercase();

        let fallback = registry.default_persona();

        let mut best: Option<(&Arc<Persona>, u32)> = None;
        for persona in registry
            .list()
            .iter()
            .filter(|p| p.has_tags() && p.id != fallback.id)
        {
            let score = Self::score(persona, &text);
            // Strictly greater: the first persona in registry order wins ties
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((persona, score));
            }
        }

        match best {
            Some((persona, score)) if score >= MIN_MATCH_SCORE => {
                tracing::info!("[PERSONA] Selected {} (score {})", persona.name, score);
                MentorMatch {
                    persona: Arc::clone(persona),
                    score,
                }
            }
            _ => {
                tracing::info!("[PERSONA] No strong match, using default persona");
                MentorMatch {
                    persona: fallback,
                    score: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personas::DEFAULT_PERSONA_ID;

    fn tagged(id: &str, keywords: &[&str], expertise: &[&str]) -> Persona {
        Persona {
            id: id.to_string(),
            name: id.to_string(),
            title: "t".to_string(),
            era: "e".to_string(),
            expertise: expertise.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            philosophy: "p".to_string(),
            speaking_style: "s".to_string(),
            notable_works: vec![],
            signature_quote: None,
        }
    }

    #[test]
    fn test_stress_and_control_pick_stoic() {
        let registry = PersonaRegistry::with_builtins();
        let text = "I'm really stressed about losing control of this situation";

        let stoic = registry.get("stoic").unwrap();
        assert!(KeywordSelector::score(&stoic, &text.to_lowercase()) >= 4);
        for other in registry.list().iter().filter(|p| p.id != "stoic") {
            assert_eq!(KeywordSelector::score(other, &text.to_lowercase()), 0, "{}", other.id);
        }

        let selected = KeywordSelector.select(&registry, text, "");
        assert_eq!(selected.persona.id, "stoic");
        assert!(selected.score >= 4);
    }

    #[test]
    fn test_situation_text_counts() {
        let registry = PersonaRegistry::with_builtins();
        let selected = KeywordSelector.select(&registry, "hi", "My FAMILY and my work");
        assert_eq!(selected.persona.id, "sage");
        assert_eq!(selected.score, 4);
    }

    #[test]
    fn test_substring_match_without_word_boundaries() {
        let registry = PersonaRegistry::with_builtins();
        // "worrying" contains "worry", "network" contains "work"
        let text = "worrying about my network".to_lowercase();
        assert_eq!(KeywordSelector::score(&registry.get("stoic").unwrap(), &text), 2);
        assert_eq!(KeywordSelector::score(&registry.get("sage").unwrap(), &text), 2);
    }

    #[test]
    fn test_low_score_returns_default_with_zero() {
        let registry = PersonaRegistry::with_builtins();
        let selected = KeywordSelector.select(&registry, "what a day", "");
        assert_eq!(selected.persona.id, DEFAULT_PERSONA_ID);
        assert_eq!(selected.score, 0);
    }

    #[test]
    fn test_single_expertise_hit_is_not_enough() {
        let registry = PersonaRegistry::new(
            vec![tagged("a", &[], &["zen"]), tagged("fallback", &[], &[])],
            "fallback",
        )
        .unwrap();
        let selected = KeywordSelector.select(&registry, "some zen", "");
        assert_eq!(selected.persona.id, "fallback");
        assert_eq!(selected.score, 0);
    }

    #[test]
    fn test_ties_keep_first_registered() {
        let registry = PersonaRegistry::new(
            vec![
                tagged("first", &["rain"], &[]),
                tagged("second", &["cloud"], &[]),
                tagged("fallback", &[], &[]),
            ],
            "fallback",
        )
        .unwrap();

        let selected = KeywordSelector.select(&registry, "cloud and rain", "");
        assert_eq!(selected.persona.id, "first");
        assert_eq!(selected.score, 2);
    }

    #[test]
    fn test_untagged_persona_never_scored() {
        // Untagged persona placed first must not win even at score 0
        let registry = PersonaRegistry::new(
            vec![tagged("fallback", &[], &[]), tagged("a", &["sun"], &[])],
            "fallback",
        )
        .unwrap();
        let selected = KeywordSelector.select(&registry, "sun", "");
        assert_eq!(selected.persona.id, "a");
    }

    #[test]
    fn test_tagged_default_is_only_a_fallback() {
        let registry = PersonaRegistry::new(
            vec![tagged("a", &["sun"], &[]), tagged("fallback", &["rain", "cloud"], &[])],
            "fallback",
        )
        .unwrap();

        let selected = KeywordSelector.select(&registry, "rain and cloud", "");
        assert_eq!(selected.persona.id, "fallback");
        assert_eq!(selected.score, 0);

        let selected = KeywordSelector.select(&registry, "sun, rain and cloud", "");
        assert_eq!(selected.persona.id, "a");
        assert_eq!(selected.score, 2);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let registry = PersonaRegistry::with_builtins();
        let message = "I feel lonely and my heart aches, I lost my purpose";
        let a = KeywordSelector.select(&registry, message, "grief");
        let b = KeywordSelector.select(&registry, message, "grief");
        assert_eq!(a.persona.id, b.persona.id);
        assert_eq!(a.score, b.score);
    }
}
