use crate::database::ScoredPassage;

/// The user prompt for one question plus the documents its context came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub text: String,
    pub context_documents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
    not_found_message: String,
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new(language: &str, not_found_message: &str, max_context_chars: usize) -> Self {
        Self {
            language: language.to_string(),
            not_found_message: not_found_message.to_string(),
            max_context_chars,
        }
    }

    pub fn not_found_message(&self) -> &str {
        &self.not_found_message
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Tags every passage with its source and keeps adding passages, best
    /// first, until the context budget runs out. The best passage is always
    /// included, cut to the budget if it has to be.
    pub fn compose(&self, question: &str, passages: &[ScoredPassage]) -> ComposedPrompt {
        let mut context = String::new();
        let mut used_chars = 0;
        let mut context_documents: Vec<String> = Vec::new();

        for (i, passage) in passages.iter().enumerate() {
            let text = passage.text.trim();
            let length = text.chars().count();

            let body: String = if used_chars + length <= self.max_context_chars {
                text.to_string()
            } else if i == 0 {
                text.chars().take(self.max_context_chars).collect()
            } else {
                break;
            };
            used_chars += body.chars().count();

            context.push_str(&format!("[{}] (source: {})\n{}\n\n", i + 1, passage.document_id, body));
            if !context_documents.contains(&passage.document_id) {
                context_documents.push(passage.document_id.clone());
            }
        }

        let text = format!(
            "Context from the course notes:\n\n{}\
             Question: {}\n\n\
             Answer using only the context above, in {}. \
             Name the source PDF files you used. \
             If the context does not answer the question, reply exactly: {}",
            context,
            question.trim(),
            self.language,
            self.not_found_message
        );

        ComposedPrompt { text, context_documents }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(document_id: &str, text: &str, score: f32) -> ScoredPassage {
        ScoredPassage {
            text: text.to_string(),
            document_id: document_id.to_string(),
            chunk_index: 0,
            score,
        }
    }

    #[test]
    fn tags_passages_with_their_source() {
        let builder = PromptBuilder::new("Turkish", "Bu bilgi notlarda yok.", 1000);
        let prompt = builder.compose(
            "Yığın hangi sırayı izler?",
            &[
                passage("veri_yapilari.pdf", "A stack follows LIFO order.", 0.9),
                passage("algoritmalar.pdf", "Binary search halves the range.", 0.5),
                passage("veri_yapilari.pdf", "A queue follows FIFO order.", 0.4),
            ],
        );

        assert!(prompt.text.contains("[1] (source: veri_yapilari.pdf)\nA stack follows LIFO order."));
        assert!(prompt.text.contains("[2] (source: algoritmalar.pdf)"));
        assert!(prompt.text.contains("Question: Yığın hangi sırayı izler?"));
        assert!(prompt.text.contains("in Turkish"));
        assert!(prompt.text.ends_with("reply exactly: Bu bilgi notlarda yok."));
        assert_eq!(prompt.context_documents, vec!["veri_yapilari.pdf", "algoritmalar.pdf"]);
    }

    #[test]
    fn stops_at_context_budget() {
        let builder = PromptBuilder::new("English", "Not in the notes.", 30);
        let prompt = builder.compose(
            "q",
            &[
                passage("a.pdf", "twenty characters...", 0.9),
                passage("b.pdf", "this one no longer fits", 0.8),
            ],
        );

        assert!(prompt.text.contains("(source: a.pdf)"));
        assert!(!prompt.text.contains("(source: b.pdf)"));
        assert_eq!(prompt.context_documents, vec!["a.pdf"]);
    }

    #[test]
    fn oversized_first_passage_is_cut() {
        let builder = PromptBuilder::new("English", "Not in the notes.", 5);
        let prompt = builder.compose("q", &[passage("a.pdf", "çğıöşü and more", 0.9)]);
        assert!(prompt.text.contains("(source: a.pdf)\nçğıöş\n"));
    }
}
