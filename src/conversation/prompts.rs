//! Tutor persona and session-opening instructions.

use super::catalog::language_name;

pub const DEFAULT_LEVEL: u8 = 3;

/// Clamps anything outside 1..=5 to the intermediate level.
pub fn normalize_level(level: Option<i64>) -> u8 {
    match level {
        Some(l @ 1..=5) => l as u8,
        _ => DEFAULT_LEVEL,
    }
}

fn level_profile(level: u8) -> &'static str {
    match level {
        1 => "Student level: Beginner (1/5), conversational language tutor.
LANGUAGE RULE, MANDATORY AND PERMANENT: Always speak mostly in English for the entire conversation, no matter what language the student uses. Do NOT switch to full target language just because the student responded in it. Your messages must be primarily English with only a few target-language words or one short phrase woven in per turn.
Each turn: introduce one target-language word or short phrase with a pronunciation hint, use it naturally in an English sentence, then ask the student to try it. Correct mistakes briefly: praise, correct form, one-line reason.",
        2 => "Student level: Elementary (2/5). Lead through prompts and scenarios.
Each turn: weave in one vocabulary word naturally (word = English meaning), give a situational prompt to respond to. After every 2-3 exchanges add one brief correction note. Write about 60% in the target language, 40% English. Translations in brackets after unfamiliar words.",
        4 => "Student level: Advanced (4/5). Natural conversation, no vocabulary preview.
Speak entirely in the target language. Let minor errors pass; only interrupt for errors that block understanding. After every 6-8 turns give a brief review: top 1-2 grammar corrections, one vocabulary upgrade, one fluency tip. Challenge the student with nuanced questions, hypotheticals, and opinions.",
        5 => "Student level: Fluent (5/5). Native-speaking peer, not a tutor.
Speak entirely in the target language at full native speed. Pursue opinions, debate, humor, storytelling, hypotheticals. Only correct when communication breaks down. After every 8-10 turns offer one brief tonal or idiomatic refinement, then resume immediately. No accommodations.",
        _ => "Student level: Intermediate (3/5). Conversation partner who also coaches.
Have genuine exchanges and let minor errors slide for 4-5 turns. Then give one short coaching block: 1-2 grammar corrections with one-line reasons, one vocabulary upgrade, one fluency tip. Then continue naturally. Speak primarily in the target language; English only in brackets for quick clarifications.",
    }
}

const PRIOR_CONTEXT_NOTE: &str = "\n\nNote: The conversation history below contains messages from this student's recent previous sessions. Use it to remember what vocabulary and topics were already covered, acknowledge their progress naturally, and avoid re-teaching things they already know. Always open this new session with a warm, fresh greeting.";

pub fn build_system_prompt(
    language: &str,
    level: u8,
    topic_name: &str,
    topic_description: &str,
    has_prior_context: bool,
) -> String {
    let lang = language_name(language);
    let note = if has_prior_context { PRIOR_CONTEXT_NOTE } else { "" };
    format!(
        "You are an expert language tutor specializing in {lang}. Your mission is to help the student practice {lang} through engaging conversation about \"{topic_name}\".

Topic context: {topic_description}

{profile}

RESPONSE LENGTH RULE, THIS IS MANDATORY: Every reply must be 2 sentences. 3 sentences absolute maximum. Never more. Do not explain, elaborate, or add extra context beyond those sentences. If you are tempted to write more, stop and cut it down.

Other guidelines:
- End each turn with one short question or prompt.
- Plain prose only. No bullet points except inside correction or review blocks.
- Acknowledge effort warmly but briefly.{note}",
        profile = level_profile(level),
    )
}

/// Hidden user turn that makes the tutor open the session.
pub fn build_greet_prompt(language: &str, level: u8) -> String {
    let lang = language_name(language);
    match level {
        1 => format!(
            "[Open in English. Welcome the student briefly, name the topic, introduce one {lang} word or short phrase with a pronunciation hint, and ask them to try it. Speak primarily in English; this is a beginner lesson taught in English with {lang} words woven in. 2-3 sentences only.]"
        ),
        2 => format!(
            "[Begin the session. Greet the student in a mix of {lang} and English. Drop in 2-3 useful vocabulary words for the topic (word = English meaning). Then set up a simple scenario related to the topic and give the student their first situational prompt to respond to.]"
        ),
        4 => format!(
            "[Begin the session. Jump straight into natural conversation in {lang} with no preamble. Ask an interesting, open-ended question related to the topic that requires a real opinion or thought, not a yes/no answer.]"
        ),
        5 => format!(
            "[Begin the session entirely in {lang}. Start immediately with no greeting ritual. Open with something that invites real engagement: a bold opinion on the topic, a hypothetical, a cultural reference, or a question worth debating. Set the tone of a real conversation between equals.]"
        ),
        _ => format!(
            "[Begin the session. Set the context naturally by describing the conversational scenario related to the topic in 1 sentence. Greet the student primarily in {lang} and open with an engaging question that invites a real response. Keep it brief, warm, and natural.]"
        ),
    }
}

pub fn build_translate_prompt(language: &str, text: &str) -> String {
    format!(
        "Translate the following {} text to English. Respond with ONLY the translation, no explanations, no quotation marks, no additional commentary:\n\n{text}",
        language_name(language)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_normalization() {
        assert_eq!(normalize_level(Some(1)), 1);
        assert_eq!(normalize_level(Some(5)), 5);
        assert_eq!(normalize_level(Some(0)), 3);
        assert_eq!(normalize_level(Some(9)), 3);
        assert_eq!(normalize_level(None), 3);
    }

    #[test]
    fn system_prompt_mentions_language_topic_and_level() {
        let prompt = build_system_prompt("es", 4, "Travel & Tourism", "Directions", false);
        assert!(prompt.contains("specializing in Spanish"));
        assert!(prompt.contains("\"Travel & Tourism\""));
        assert!(prompt.contains("Advanced (4/5)"));
        assert!(!prompt.contains("previous sessions"));

        let with_context = build_system_prompt("es", 4, "Travel & Tourism", "Directions", true);
        assert!(with_context.ends_with(PRIOR_CONTEXT_NOTE));
    }

    #[test]
    fn greet_prompt_varies_by_level() {
        assert!(build_greet_prompt("it", 1).starts_with("[Open in English"));
        assert!(build_greet_prompt("it", 5).contains("entirely in Italian"));
        assert_eq!(build_greet_prompt("pt", 0), build_greet_prompt("pt", 3));
    }
}
