//! Keyword heuristics over model-generated speech.
//!
//! These are substring checks on text the model produced, so they are
//! approximate by nature. Tests pin the keyword sets below rather than
//! claiming the checks are always right.

/// The scripted yes/no permission prompt.
pub const CONSENT_QUESTION: &str = "Are you happy to continue?";

const ANYTHING_ELSE: [&str; 2] = [
    "anything else you want to add",
    "anything else you'd like to add",
];
const THANKS: [&str; 2] = ["thank you", "thanks"];
const WRAP_UP: [&str; 5] = [
    "wrap",
    "that's all",
    "that concludes",
    "we're done",
    "we are done",
];

/// Number of leading prompt characters that must be echoed back verbatim.
pub const INSTRUCTION_FRAGMENT_CHARS: usize = 48;

fn strip_punctuation(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '?' | '.' | '!')).collect()
}

/// True when `text` contains the consent question, ignoring case and `?.!`.
pub fn has_consent_question(text: &str) -> bool {
    let normalized = strip_punctuation(&text.to_lowercase());
    let needle = strip_punctuation(&CONSENT_QUESTION.to_lowercase());
    normalized.trim().contains(needle.trim())
}

/// True for an interviewer line that reads as the end of the interview.
pub fn is_closing_line(text: &str) -> bool {
    let normalized = text.to_lowercase();
    let asks_for_more = ANYTHING_ELSE.iter().any(|k| normalized.contains(k));
    let thanks = THANKS.iter().any(|k| normalized.contains(k));
    let wraps_up = WRAP_UP.iter().any(|k| normalized.contains(k));
    asks_for_more || (thanks && wraps_up)
}

/// Checks whether instructions echoed by `session.updated` are ours.
///
/// Accepts an echo that starts with the first [`INSTRUCTION_FRAGMENT_CHARS`]
/// characters of the prompt, or one that names the persona in the
/// `You are "<persona>"` form with straight or curly quotes.
pub fn echoes_instructions(echoed: &str, prompt: &str, persona: Option<&str>) -> bool {
    let echoed = echoed.trim();
    let fragment: String = prompt
        .trim()
        .chars()
        .take(INSTRUCTION_FRAGMENT_CHARS)
        .collect();
    if !fragment.is_empty() && echoed.starts_with(&fragment) {
        return true;
    }
    persona.is_some_and(|name| {
        ["\"", "\u{201c}"].iter().any(|open| {
            ["\"", "\u{201d}"]
                .iter()
                .any(|close| echoed.contains(&format!("You are {open}{name}{close}")))
        })
    })
}

/// Clips `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
