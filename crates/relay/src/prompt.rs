//! Prompt assembly — instruction preamble, recent history, the new turn,
//! and an optional image combined into one backend payload.

use tutorbot_core::backend::{Payload, PromptPart};
use tutorbot_core::session::ConversationContext;
use tutorbot_core::turn::ImageData;

/// Question substituted when a turn carries an image but no text, so the
/// backend always receives a non-empty instruction.
pub const DEFAULT_IMAGE_QUESTION: &str =
    "What can you tell me about this image? Please analyze it in detail.";

/// Assembles backend payloads from conversational context and the new turn.
pub struct PromptAssembler {
    instruction: String,
}

impl PromptAssembler {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    /// Build the payload for one turn.
    ///
    /// Transcript mode composes instruction + rendered history + the new
    /// question into one text part. Session mode supplies only the new
    /// turn's text — the backend's own session carries the history. In
    /// both modes an image part, when present, strictly follows the text
    /// part: the backend associates trailing non-text parts with the
    /// preceding instruction.
    pub fn build(
        &self,
        context: &ConversationContext,
        student_text: Option<&str>,
        image: Option<ImageData>,
    ) -> Payload {
        let question = match student_text {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_IMAGE_QUESTION,
        };

        let (text_block, session) = match context {
            ConversationContext::History(entries) => {
                let mut block = self.instruction.clone();
                if !entries.is_empty() {
                    block.push_str("\n\nRecent conversation:\n");
                    for entry in entries {
                        block.push_str(entry.speaker.label());
                        block.push_str(": ");
                        block.push_str(&entry.text);
                        block.push('\n');
                    }
                }
                block.push_str("\n\nStudent question: ");
                block.push_str(question);
                (block, None)
            }
            ConversationContext::Session(handle) => (question.to_string(), handle.clone()),
        };

        let mut parts = vec![PromptPart::Text(text_block)];
        if let Some(image) = image {
            parts.push(PromptPart::Image(image));
        }

        Payload { parts, session }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorbot_core::backend::SessionHandle;
    use tutorbot_core::turn::TurnEntry;

    fn assembler() -> PromptAssembler {
        PromptAssembler::new("You are a patient study tutor.")
    }

    fn first_text(payload: &Payload) -> &str {
        match &payload.parts[0] {
            PromptPart::Text(t) => t,
            PromptPart::Image(_) => panic!("first part must be text"),
        }
    }

    #[test]
    fn no_history_yields_instruction_and_question() {
        let payload = assembler().build(
            &ConversationContext::History(vec![]),
            Some("What is photosynthesis?"),
            None,
        );
        let text = first_text(&payload);
        assert!(text.starts_with("You are a patient study tutor."));
        assert!(!text.contains("Recent conversation"));
        assert!(text.ends_with("Student question: What is photosynthesis?"));
        assert_eq!(payload.parts.len(), 1);
    }

    #[test]
    fn history_rendered_oldest_first_with_labels() {
        let context = ConversationContext::History(vec![
            TurnEntry::student("What is osmosis?"),
            TurnEntry::assistant("Movement of water across a membrane."),
        ]);
        let payload = assembler().build(&context, Some("And diffusion?"), None);
        let text = first_text(&payload);

        let student_pos = text.find("Student: What is osmosis?").unwrap();
        let tutor_pos = text.find("Tutor: Movement of water").unwrap();
        assert!(student_pos < tutor_pos);
        assert!(text.contains("Recent conversation:"));
        assert!(text.ends_with("Student question: And diffusion?"));
    }

    #[test]
    fn image_part_follows_text() {
        let image = ImageData {
            mime_type: "image/jpeg".into(),
            data: vec![1, 2, 3],
        };
        let payload = assembler().build(
            &ConversationContext::History(vec![]),
            Some("Solve this"),
            Some(image),
        );
        assert_eq!(payload.parts.len(), 2);
        assert!(matches!(payload.parts[0], PromptPart::Text(_)));
        assert!(matches!(payload.parts[1], PromptPart::Image(_)));
    }

    #[test]
    fn image_without_text_substitutes_default_question() {
        let image = ImageData {
            mime_type: "image/png".into(),
            data: vec![9],
        };
        let payload = assembler().build(&ConversationContext::History(vec![]), None, Some(image));
        assert!(first_text(&payload).contains(DEFAULT_IMAGE_QUESTION));
    }

    #[test]
    fn session_mode_sends_only_the_new_turn() {
        let handle = SessionHandle("dialog-7".into());
        let payload = assembler().build(
            &ConversationContext::Session(Some(handle.clone())),
            Some("Next question"),
            None,
        );
        assert_eq!(first_text(&payload), "Next question");
        assert_eq!(payload.session, Some(handle));
    }

    #[test]
    fn session_mode_without_handle_starts_fresh() {
        let payload = assembler().build(&ConversationContext::Session(None), Some("Hi"), None);
        assert!(payload.session.is_none());
    }
}
