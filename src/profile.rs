//! User personalization
//!
//! Only the demo identity has a profile. Everyone else is an anonymous
//! "friend" with nothing to personalize on.

use crate::config::DEMO_USER_ID;
use serde::{Deserialize, Serialize};

/// Greeting name for users without a profile
pub const ANONYMOUS_NAME: &str = "friend";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub display_name: String,
    pub occupation: String,
    pub current_challenges: String,
    pub personal_goals: String,
    pub interests: Vec<String>,
    pub stress_sources: Vec<String>,
    /// Seconds
    pub preferred_meditation_duration: u32,
}

impl UserProfile {
    fn anonymous(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            first_name: ANONYMOUS_NAME.to_string(),
            display_name: "User".to_string(),
            occupation: String::new(),
            current_challenges: String::new(),
            personal_goals: String::new(),
            interests: Vec::new(),
            stress_sources: Vec::new(),
            preferred_meditation_duration: 600,
        }
    }

    fn demo() -> Self {
        Self {
            id: DEMO_USER_ID.to_string(),
            first_name: "Marco".to_string(),
            display_name: "Marco Chen".to_string(),
            occupation: "Computer Science Student".to_string(),
            current_challenges: "Feeling stressed about upcoming recruiting season and technical \
                                 interviews. Worried about finding the right career path and \
                                 proving myself in interviews."
                .to_string(),
            personal_goals: "Land a great internship, build confidence in technical skills, find \
                             work-life balance, practice more mindfulness"
                .to_string(),
            interests: to_strings(&["coding", "meditation", "hiking", "music", "AI research"]),
            stress_sources: to_strings(&[
                "interview prep",
                "career uncertainty",
                "imposter syndrome",
                "time management",
            ]),
            preferred_meditation_duration: 600,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.first_name.is_empty() || self.first_name == ANONYMOUS_NAME
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn profile_for(user_id: &str) -> UserProfile {
    if user_id == DEMO_USER_ID {
        UserProfile::demo()
    } else {
        UserProfile::anonymous(user_id)
    }
}

/// Profile facts as prompt-ready lines; empty for anonymous users
pub fn personalization_context(user_id: &str) -> String {
    let profile = profile_for(user_id);
    if profile.is_anonymous() {
        return String::new();
    }

    let mut lines = vec![format!("The user's name is {}.", profile.first_name)];
    if !profile.occupation.is_empty() {
        lines.push(format!("They are a {}.", profile.occupation));
    }
    if !profile.current_challenges.is_empty() {
        lines.push(format!("Current challenges: {}", profile.current_challenges));
    }
    if !profile.personal_goals.is_empty() {
        lines.push(format!("Their goals: {}", profile.personal_goals));
    }
    if !profile.stress_sources.is_empty() {
        lines.push(format!("Main sources of stress: {}.", profile.stress_sources.join(", ")));
    }
    // Interests give the model relatable metaphors
    if !profile.interests.is_empty() {
        lines.push(format!("Interests: {}.", profile.interests.join(", ")));
    }

    lines.join("\n")
}

pub fn greeting_name(user_id: &str) -> String {
    profile_for(user_id).first_name
}

/// A sentence naming the user's first one or two stressors
pub fn stress_acknowledgment(user_id: &str) -> String {
    let profile = profile_for(user_id);
    match profile.stress_sources.as_slice() {
        [] => String::new(),
        [only] => format!("I know you've been dealing with {}", only),
        [first, second, ..] => format!("I know you've been navigating {} and {}", first, second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_user_has_context() {
        let context = personalization_context(DEMO_USER_ID);
        assert!(context.starts_with("The user's name is Marco."));
        assert!(context.contains("They are a Computer Science Student."));
        assert!(context.contains("Main sources of stress: interview prep, career uncertainty"));
        assert!(context.ends_with("Interests: coding, meditation, hiking, music, AI research."));
    }

    #[test]
    fn test_anonymous_user_gets_nothing() {
        assert_eq!(personalization_context("someone-else"), "");
        assert_eq!(greeting_name("someone-else"), "friend");
        assert_eq!(stress_acknowledgment("someone-else"), "");
        assert!(profile_for("someone-else").is_anonymous());
    }

    #[test]
    fn test_stress_acknowledgment_names_two() {
        assert_eq!(
            stress_acknowledgment(DEMO_USER_ID),
            "I know you've been navigating interview prep and career uncertainty"
        );
        assert_eq!(greeting_name(DEMO_USER_ID), "Marco");
    }
}
