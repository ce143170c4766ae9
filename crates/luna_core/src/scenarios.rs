//! crates/luna_core/src/scenarios.rs
//!
//! The built-in conversation scenarios offered on the new-chat screen.

use crate::domain::Scenario;

/// (id, icon, text, prompt)
#[rustfmt::skip]
const BUILTIN: &[(&str, &str, &str, &str)] = &[
    ("greeting", "hand-left-outline", "Greeting",
        "Let’s practice basic greetings in Japanese! How would you say hello or goodbye?"),
    ("weather", "sunny-outline", "Weather",
        "Let’s talk about the weather in Japanese! How do you describe sunny, rainy, or snowy days?"),
    ("anime", "tv-outline", "Anime",
        "Let's talk about anime in Japanese! Tell me about your favorite anime and recommendations."),
    ("manga", "book-outline", "Manga",
        "Let's talk about manga in Japanese! Tell me about your favorite manga and genres."),
    ("citypop", "musical-notes-outline", "City Pop",
        "Let's talk about City Pop in Japanese! Tell me about your favorite artists and songs."),
    ("fashion", "shirt-outline", "Fashion",
        "Let's talk about fashion in Japanese! Tell me about your favorite styles, brands, and items you're interested in lately."),
    ("restaurant", "restaurant-outline", "Restaurant",
        "Imagine you're at a restaurant in Japan. Let's practice how to order food and ask for the bill in Japanese!"),
    ("shopping", "bag-handle-outline", "Shopping",
        "Let’s go shopping together! Practice asking prices and finding what you need in Japanese."),
    ("travel", "airplane-outline", "Traveling",
        "Let’s practice useful Japanese phrases for traveling, like checking into a hotel or asking for directions."),
    ("hobby", "happy-outline", "Hobbies",
        "Let’s talk about your hobbies in Japanese! What do you like to do for fun?"),
    ("self-introduction", "person-circle-outline", "Introduction",
        "Let's practice introducing ourselves in Japanese. Share your name, where you're from, and more!"),
    ("directions", "compass-outline", "Directions",
        "You’re lost in Japan—let’s practice asking and giving directions in Japanese!"),
    ("hobby-details", "sparkles-outline", "More about Hobbies",
        "Let's dive deeper into your favorite hobbies in Japanese. What do you enjoy the most and why?"),
    ("food-drinks", "cafe-outline", "Food and Drinks",
        "Let’s talk about your favorite foods and drinks in Japanese. Have you tried any Japanese dishes?"),
    ("school-work", "school-outline", "School/Work",
        "Let’s chat about your school or job in Japanese. What’s your daily routine like?"),
    ("making-plans", "calendar-outline", "Making Plans",
        "Let’s make plans for the weekend in Japanese! Maybe go to a movie or meet for lunch?"),
    ("public-transport", "train-outline", "Public Transport",
        "Let’s practice using trains or buses in Japan—buying tickets, asking routes, and more!"),
    ("recommendations", "bulb-outline", "Recommendations",
        "Let’s talk about your favorite places, movies, or restaurants in Japanese—and give each other recommendations!"),
];

/// A lookup table of scenarios, by id or by seed prompt.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScenarioCatalog {
    pub fn builtin() -> Self {
        let scenarios = BUILTIN
            .iter()
            .map(|(id, icon, text, prompt)| Scenario {
                id: id.to_string(),
                icon: icon.to_string(),
                text: text.to_string(),
                prompt: prompt.to_string(),
            })
            .collect();
        Self { scenarios }
    }

    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    pub fn all(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn find(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// The scenario whose seed prompt is exactly `prompt` (ignoring surrounding whitespace).
    pub fn find_by_prompt(&self, prompt: &str) -> Option<&Scenario> {
        let prompt = prompt.trim();
        self.scenarios.iter().find(|s| s.prompt == prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        let catalog = ScenarioCatalog::builtin();
        assert_eq!(catalog.all().len(), 18);
        let mut ids: Vec<_> = catalog.all().iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 18);
    }

    #[test]
    fn lookup_by_prompt() {
        let catalog = ScenarioCatalog::builtin();
        let weather = catalog.find("weather").unwrap().clone();
        let found = catalog.find_by_prompt(&format!("  {}\n", weather.prompt)).unwrap();
        assert_eq!(found.text, "Weather");
        assert!(catalog.find_by_prompt("Tell me a joke").is_none());
    }
}
