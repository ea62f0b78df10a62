//! Prompt assembly, streaming answers, and citation handling

pub mod citation;
pub mod prompt;
pub mod stream;

pub use citation::{cited_ids, extract_citations};
pub use prompt::PromptBuilder;
pub use stream::{AnswerStream, CancelHandle};

/// Strip prompt scaffolding an undertrained model sometimes echoes back.
///
/// Some models leak the literal `Context:`/`Answer:` framing from the
/// prompt into their output; citations inside the text are kept.
pub fn post_process_answer(answer: &str) -> String {
    let mut text = answer.trim();
    for prefix in ["Answer:", "ANSWER:"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
        }
    }
    // A leaked context block ends at the first blank line.
    if text.starts_with("Context:") {
        if let Some(pos) = text.find("\n\n") {
            text = text[pos + 2..].trim_start();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_answer_unchanged() {
        assert_eq!(
            post_process_answer("Grass is green [doc#0001]."),
            "Grass is green [doc#0001]."
        );
    }

    #[test]
    fn test_answer_prefix_stripped() {
        assert_eq!(post_process_answer("Answer: Grass is green."), "Grass is green.");
    }

    #[test]
    fn test_leaked_context_block_stripped() {
        let leaked = "Context: some retrieved text\n\nGrass is green.";
        assert_eq!(post_process_answer(leaked), "Grass is green.");
    }
}
