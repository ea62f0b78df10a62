//! Deterministic prompt assembly

use crate::config::PromptConfig;
use crate::types::{estimate_tokens, ConversationTurn, ScoredChunk};

/// Assembles the generation prompt from persona, context, history, and
/// the current query.
///
/// Assembly is pure: the same inputs always yield the same prompt, byte
/// for byte. Context chunks keep retrieval order and are labeled with
/// their chunk ids so the model can cite them.
pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Build the full prompt string
    pub fn assemble(
        &self,
        history: &[ConversationTurn],
        retrieved: &[ScoredChunk],
        query: &str,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(&self.config.persona);
        prompt.push_str("\n\n");

        prompt.push_str("Context:\n");
        if retrieved.is_empty() {
            prompt.push_str("No relevant information found in the knowledge base.\n");
        } else {
            for (i, scored) in retrieved.iter().enumerate() {
                if i > 0 {
                    prompt.push_str("---\n");
                }
                prompt.push_str(&format!(
                    "[{}] (source: {}, relevance: {:.2})\n{}\n",
                    scored.chunk.id,
                    scored.chunk.document_id,
                    scored.similarity,
                    scored.chunk.text.trim_end()
                ));
            }
        }
        prompt.push('\n');

        let window = self.history_window(history);
        if !window.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in window {
                prompt.push_str(&format!("{}: {}\n", turn.role.label(), turn.text));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("QUESTION: {}\n\nAnswer:", query));
        prompt
    }

    /// Most recent turns fitting both the turn and token limits.
    ///
    /// Oldest turns are dropped first; the returned slice preserves
    /// chronological order.
    fn history_window<'a>(&self, history: &'a [ConversationTurn]) -> &'a [ConversationTurn] {
        let mut start = history.len().saturating_sub(self.config.max_history_turns);
        let mut tokens: usize = history[start..]
            .iter()
            .map(|t| estimate_tokens(&t.text))
            .sum();
        while start < history.len() && tokens > self.config.max_history_tokens {
            tokens -= estimate_tokens(&history[start].text);
            start += 1;
        }
        &history[start..]
    }
}
