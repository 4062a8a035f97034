//! Prompt composition for the answering model.

/// Instruction prepended to every question.
pub const SYSTEM_INSTRUCTION: &str = "You are a Log Analyst.

RULES:
1. Base your answer ONLY on the provided logs.
2. Copy timestamps exactly as they appear in the logs (e.g. \"14:41:11\").
3. Do not convert timezones or calculate time differences.
4. Do not invent events. If the logs are empty, say \"No activity found.\"
5. Keep it short (2-3 sentences) and avoid jargon; group similar events.";

/// Build the full model prompt from retrieval context and the question.
pub fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\nLOG DATA:\n{}\n\nUSER QUESTION: {}\nANSWER:",
        SYSTEM_INSTRUCTION, context, question
    )
}
