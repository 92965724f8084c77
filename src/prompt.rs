//! Prompt assembly for retrieval-augmented chat.

use crate::memory::ChatMessage;

pub const SYSTEM_PROMPT: &str = "
You are an AI assistant. Use the provided CONTEXT to answer the USER QUESTION as accurately as possible.

Instructions:
- Base your answer strictly on the given CONTEXT and your general world knowledge.
- If the answer is not available in the context, respond: \"I don't have enough information from the documents.\"
- Do not make up facts or provide information not supported by the context.
- Your responses should be clear and concise.
";

/// Placeholder used when retrieval returned nothing.
pub const NO_CONTEXT: &str = "No relevant context found in the documents.";

/// Render the user turn carrying retrieved context and the question.
pub fn render_user_prompt(retrieved_context: &str, user_query: &str) -> String {
    format!(
        "
### CONTEXT (Retrieved Relevant Document Chunks):
{retrieved_context}

### USER QUESTION:
{user_query}

### INSTRUCTIONS:
- Answer using ONLY the CONTEXT above and your general world knowledge.
- If no relevant information is present, explain that it is not available.
"
    )
}

/// `[system, user]` messages for `query`, with `context_chunks` separated by
/// blank lines.
pub fn build_prompt<S: AsRef<str>>(context_chunks: &[S], query: &str) -> Vec<ChatMessage> {
    let retrieved_context = if context_chunks.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context_chunks
            .iter()
            .map(|chunk| chunk.as_ref())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(render_user_prompt(&retrieved_context, query)),
    ]
}
