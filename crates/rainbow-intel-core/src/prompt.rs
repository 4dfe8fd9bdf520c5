//! Grounding-prompt construction and the fixed / offline answer texts.
//!
//! The grounding prompt is a fixed instruction preamble followed by the
//! retrieved messages as a numbered, timestamped, platform-tagged list, in
//! retrieval order (most similar first).

use sha2::{Digest, Sha256};

use crate::models::ScoredMessage;

/// Answer returned when a bridge has no embedded history to ground on.
/// No model is called when this is returned.
pub const NO_CONTEXT_ANSWER: &str = "I don't have any relevant context from the bridge history to answer this question. The bridge may not have processed any messages yet, or there's no relevant information stored.";

/// Label appended to every placeholder answer produced without a live model.
pub const OFFLINE_LABEL: &str = "[Offline mode: connect a real API key for AI-powered answers]";

const PREAMBLE: &str = "You are a project assistant for a cross-platform communication bridge that connects Slack and Microsoft Teams. Your role is to help users understand project history and find information from past conversations.

IMPORTANT INSTRUCTIONS:
- Answer the user's question using ONLY the context logs provided below
- If the information isn't in the context, say so honestly
- Reference specific messages when relevant, citing platform, sender and timestamp (e.g., \"According to the [Platform] message from [Sender] at [Time]...\")
- Be concise but thorough
- If asked about decisions, summarize the key points and who made them
- If asked about responsibilities, identify the relevant person based on the context";

const CLOSING: &str =
    "Remember: Only use information from the context above. Do not make up information.";

/// Render retrieved messages as the numbered context block.
pub fn render_context(hits: &[ScoredMessage]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let m = &hit.message;
            format!(
                "[{}] [{}] {} ({}): {}",
                i + 1,
                m.platform.as_str().to_uppercase(),
                m.sender,
                m.created_at.format("%Y-%m-%d %H:%M UTC"),
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full system prompt grounding the model on `hits`.
pub fn system_prompt(hits: &[ScoredMessage]) -> String {
    format!(
        "{}\n\nCONTEXT LOGS FROM BRIDGE HISTORY:\n{}\n\n{}",
        PREAMBLE,
        render_context(hits),
        CLOSING
    )
}

/// Templated, clearly labelled answer used when no live model is configured.
///
/// The wording is picked from a content hash of the question so the same
/// question always gets the same answer.
pub fn offline_answer(question: &str, context_size: usize, prior_turns: usize) -> String {
    const OPENERS: [&str; 3] = [
        "Based on the conversation history, I can see discussions about",
        "Looking at the bridge messages about",
        "From the context provided on",
    ];
    const DETAILS: [&str; 4] = [
        "The team has been actively discussing this topic across both Slack and Teams.",
        "Several team members have contributed to this discussion.",
        "There appear to be some action items related to this query.",
        "The conversation shows progress on this matter.",
    ];

    let seed = seed(question);
    let excerpt: String = question.trim().chars().take(30).collect();
    let opener = OPENERS[(seed % OPENERS.len() as u64) as usize];
    let detail = DETAILS[((seed >> 4) % DETAILS.len() as u64) as usize];

    let grounding = if context_size == 0 {
        "No bridge history matched this question yet.".to_string()
    } else if context_size == 1 {
        "I found 1 related message in the bridge history.".to_string()
    } else {
        format!(
            "I found {} related messages in the bridge history.",
            context_size
        )
    };

    let mut answer = format!("{} \"{}\". {} {}", opener, excerpt, detail, grounding);
    if prior_turns > 0 {
        answer.push_str(&format!(
            " ({} earlier turn{} of this conversation {} considered.)",
            prior_turns,
            if prior_turns == 1 { "" } else { "s" },
            if prior_turns == 1 { "was" } else { "were" }
        ));
    }
    answer.push_str("\n\n");
    answer.push_str(OFFLINE_LABEL);
    answer
}

fn seed(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
