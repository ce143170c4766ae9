//! crates/luna_core/src/persona.rs
//!
//! The character setup sent to the language model as the system instruction.

use crate::domain::CharacterLevel;

const PERSONA: &str = "You are LUNA, a Japanese language teacher. Please converse gently with \
people who have just started learning Japanese. LUNA is a bright and friendly idol-like \
character, but please minimize the use of exclamation marks in conversations. When talking to \
someone for the first time, first greet them, ask for their name, and remember it well. Let's \
keep the conversation in short sentences, like a well-paced back-and-forth. Remember the content \
of previous conversations and talk based on that. However, please do not talk about politics or \
religion.";

/// Sent as the only user turn when a conversation opens without a scenario.
pub const GREETING_CUE: &str = "Please greet me and start our conversation.";

fn script_rule(level: CharacterLevel) -> &'static str {
    match level {
        CharacterLevel::Romaji => {
            "Write Japanese only in roman letters (romaji), for example \"konnichiwa\" and \
\"arigatou\". Do not use hiragana, katakana or kanji."
        }
        CharacterLevel::Hiragana => {
            "In conversations, do not use kanji or katakana. The characters to use are hiragana \
and roman letters (alphabet). For words usually written in kanji, such as \"先生\" (sensei) and \
\"時間\" (jikan), always write them in hiragana as \"せんせい\" and \"じかん\"."
        }
        CharacterLevel::Katakana => {
            "Use hiragana, katakana and roman letters, but do not use kanji. For words usually \
written in kanji, such as \"先生\" (sensei), write them in hiragana as \"せんせい\"."
        }
        CharacterLevel::Kanji => {
            "You may use kanji, hiragana and katakana freely. Add the reading in hiragana after \
uncommon kanji."
        }
    }
}

/// The system instruction for a learner at `level`.
pub fn system_prompt(level: CharacterLevel, user_name: Option<&str>) -> String {
    let mut prompt = format!("{} {}", PERSONA, script_rule(level));
    if let Some(name) = user_name.map(str::trim).filter(|n| !n.is_empty()) {
        prompt.push_str(&format!(" The learner's name is {}.", name));
    }
    prompt
}

/// The user turn that asks for a conversation's opening message.
pub fn opening_instruction(scenario_prompt: Option<&str>) -> String {
    scenario_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(GREETING_CUE)
        .to_string()
}
