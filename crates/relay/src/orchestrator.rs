//! The turn orchestrator — one user turn from admission to delivery.
//!
//! States: Idle → Admitted → Dispatched → Completed, or Idle → Rejected,
//! or Dispatched → Failed. Every turn reaches exactly one terminal state;
//! no retries are attempted — a failed turn requires the user to re-send.

use crate::chunker::{self, CONTINUATION_MARKER};
use crate::limiter::RateLimiter;
use crate::prompt::{DEFAULT_IMAGE_QUESTION, PromptAssembler};
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tutorbot_core::error::{ChannelError, Error, Result};
use tutorbot_core::frontend::{Frontend, MessageRef};
use tutorbot_core::session::{ConversationContext, ConversationStore};
use tutorbot_core::turn::{TurnRequest, UserId};
use tutorbot_core::Backend;

/// Default per-fragment size: Telegram's hard limit is 4096, keep a margin.
pub const DEFAULT_MAX_FRAGMENT_LEN: usize = 4000;
/// Default number of transcript entries supplied to prompt assembly.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const INPUT_PREVIEW_LEN: usize = 80;

const THINKING_POOL: &[&str] = &[
    "Thinking...",
    "Let me think about that...",
    "Processing your question...",
    "Looking into this...",
];

const ANALYZING_POOL: &[&str] = &[
    "Analyzing your image...",
    "Examining the image...",
    "Looking at your image...",
];

const RATE_LIMITED_MESSAGE: &str =
    "You're sending messages a little too fast. Please wait a moment and try again.";

const CONTENT_BLOCKED_MESSAGE: &str = "I couldn't answer that one — the request was declined by \
the content filter. Try rephrasing your question.";

const GENERIC_ERROR_MESSAGE: &str = "Sorry, I ran into a problem answering that. Please try \
rephrasing, or use /clear to start fresh and ask again.";

/// The terminal state one turn ends in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Rejected by admission control; no backend call was made.
    Rejected,
    /// Backend answered and all fragments were delivered.
    Completed { fragments: usize },
    /// Backend failed; one error message was delivered.
    Failed,
}

/// Composes rate limiting, session state, prompt assembly, the backend
/// call, and reply chunking into the full request/response cycle.
pub struct TurnOrchestrator {
    backend: Arc<dyn Backend>,
    frontend: Arc<dyn Frontend>,
    store: Arc<dyn ConversationStore>,
    limiter: RateLimiter,
    assembler: PromptAssembler,
    max_fragment_len: usize,
    history_window: usize,
    /// Serializes turns per user so overlapping turns cannot corrupt
    /// history ordering. Turns for different users stay concurrent.
    turn_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl TurnOrchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        frontend: Arc<dyn Frontend>,
        store: Arc<dyn ConversationStore>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            frontend,
            store,
            limiter: RateLimiter::default(),
            assembler: PromptAssembler::new(instruction),
            max_fragment_len: DEFAULT_MAX_FRAGMENT_LEN,
            history_window: DEFAULT_HISTORY_WINDOW,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default rate limiter.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Set the per-fragment delivery size.
    pub fn with_max_fragment_len(mut self, max: usize) -> Self {
        self.max_fragment_len = max;
        self
    }

    /// Set how many transcript entries feed prompt assembly.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Reset the user's conversation state (the `/clear` command).
    pub async fn reset(&self, user: &UserId) {
        self.store.reset(user).await;
    }

    /// Lazily create empty conversation state (the `/start` command).
    pub async fn touch(&self, user: &UserId) {
        let _ = self.store.get_or_create(user).await;
    }

    /// Process one turn to a terminal state.
    ///
    /// Errors returned here are delivery failures talking to the front
    /// end; backend failures are classified and reported to the user, not
    /// propagated.
    pub async fn process(&self, request: TurnRequest) -> Result<TurnOutcome> {
        if request.is_empty() {
            return Err(Error::EmptyTurn);
        }

        if !self.limiter.admit(&request.user_id, Utc::now()) {
            info!(user = %request.user_id, "Turn rejected by rate limiter");
            self.frontend
                .send(&request.chat_id, RATE_LIMITED_MESSAGE)
                .await?;
            return Ok(TurnOutcome::Rejected);
        }

        let lock = self.turn_lock(&request.user_id).await;
        let _guard = lock.lock().await;

        let pool = if request.image.is_some() {
            ANALYZING_POOL
        } else {
            THINKING_POOL
        };
        let status_text = pool
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(THINKING_POOL[0]);
        let status = self.frontend.send(&request.chat_id, status_text).await?;

        let mut context = self.store.get_or_create(&request.user_id).await;
        if matches!(context, ConversationContext::History(_)) {
            context = ConversationContext::History(
                self.store
                    .recent_window(&request.user_id, self.history_window)
                    .await,
            );
        }

        let question = request.text.as_deref().filter(|t| !t.is_empty());
        let payload = self
            .assembler
            .build(&context, question, request.image.clone());

        debug!(
            user = %request.user_id,
            backend = self.backend.name(),
            parts = payload.parts.len(),
            "Dispatching turn"
        );

        let result = self.backend.generate(payload).await;

        // The status message is cosmetic; its removal failing must not
        // affect the turn.
        self.discard_status(&request.chat_id, &status).await;

        match result {
            Ok(reply) => {
                let student_entry = match (&request.image, question) {
                    (Some(_), Some(text)) => format!("[Sent image] {text}"),
                    (Some(_), None) => format!("[Sent image] {DEFAULT_IMAGE_QUESTION}"),
                    (None, text) => text.unwrap_or_default().to_string(),
                };
                self.store
                    .record_turn(&request.user_id, &student_entry, &reply)
                    .await;

                // Fragments after the first carry the continuation marker,
                // so a reply that needs splitting is split with room for it
                // reserved; delivered messages never exceed the limit.
                let budget = if reply.text.len() <= self.max_fragment_len {
                    self.max_fragment_len
                } else {
                    self.max_fragment_len
                        .saturating_sub(CONTINUATION_MARKER.len() + 2)
                };
                let fragments = chunker::split(&reply.text, budget);
                for (i, fragment) in fragments.iter().enumerate() {
                    let rendered = if i == 0 {
                        fragment.clone()
                    } else {
                        format!("{CONTINUATION_MARKER}\n\n{fragment}")
                    };
                    self.frontend.send(&request.chat_id, &rendered).await?;
                }

                info!(
                    user = %request.user_id,
                    fragments = fragments.len(),
                    "Turn completed"
                );
                Ok(TurnOutcome::Completed {
                    fragments: fragments.len(),
                })
            }
            Err(err) => {
                let preview = input_preview(&request);
                warn!(
                    user = %request.user_id,
                    input = %preview,
                    error = %err,
                    "Turn failed"
                );
                let message = if err.is_content_blocked() {
                    CONTENT_BLOCKED_MESSAGE
                } else {
                    GENERIC_ERROR_MESSAGE
                };
                self.frontend.send(&request.chat_id, message).await?;
                Ok(TurnOutcome::Failed)
            }
        }
    }

    /// Best-effort removal of the ephemeral status message. A message that
    /// is already gone is expected; anything else is logged and swallowed.
    async fn discard_status(&self, chat_id: &str, message: &MessageRef) {
        match self.frontend.delete(chat_id, message).await {
            Ok(()) | Err(ChannelError::MessageNotFound) => {}
            Err(e) => debug!(error = %e, "Failed to remove status message"),
        }
    }

    async fn turn_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        // A count of one means no in-flight turn holds or awaits the lock;
        // a fresh lock serializes the next turn just as well.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn input_preview(request: &TurnRequest) -> String {
    let text = match (&request.text, &request.image) {
        (Some(t), Some(_)) => format!("[image] {t}"),
        (Some(t), None) => t.clone(),
        (None, Some(_)) => "[image]".into(),
        (None, None) => String::new(),
    };
    text.chars().take(INPUT_PREVIEW_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;
    use tutorbot_core::backend::{BackendReply, Payload};
    use tutorbot_core::error::BackendError;
    use tutorbot_core::frontend::InboundEvent;
    use tutorbot_core::turn::ImageData;
    use tutorbot_session::TranscriptStore;

    /// A backend returning canned results, capturing each payload.
    struct MockBackend {
        results: StdMutex<Vec<std::result::Result<BackendReply, BackendError>>>,
        payloads: StdMutex<Vec<Payload>>,
    }

    impl MockBackend {
        fn replying(text: &str) -> Self {
            Self::with_results(vec![Ok(BackendReply::text_only(text))])
        }

        fn with_results(
            mut results: Vec<std::result::Result<BackendReply, BackendError>>,
        ) -> Self {
            results.reverse();
            Self {
                results: StdMutex::new(results),
                payloads: StdMutex::new(Vec::new()),
            }
        }

        fn last_payload(&self) -> Payload {
            self.payloads.lock().unwrap().last().cloned().unwrap()
        }

        fn calls(&self) -> usize {
            self.payloads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(
            &self,
            payload: Payload,
        ) -> std::result::Result<BackendReply, BackendError> {
            self.payloads.lock().unwrap().push(payload);
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(BackendReply::text_only("fallback")))
        }
    }

    /// A front end that records sends and deletes.
    struct RecordingFrontend {
        sent: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<MessageRef>>,
        delete_result: StdMutex<Option<ChannelError>>,
        next_id: StdMutex<u64>,
    }

    impl RecordingFrontend {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
                deleted: StdMutex::new(Vec::new()),
                delete_result: StdMutex::new(None),
                next_id: StdMutex::new(0),
            }
        }

        fn failing_delete(error: ChannelError) -> Self {
            let this = Self::new();
            *this.delete_result.lock().unwrap() = Some(error);
            this
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Sent messages minus the ephemeral status message.
        fn delivered(&self) -> Vec<String> {
            self.sent().into_iter().skip(1).collect()
        }
    }

    #[async_trait]
    impl Frontend for RecordingFrontend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(
            &self,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<InboundEvent, ChannelError>>,
            ChannelError,
        > {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(
            &self,
            _chat_id: &str,
            text: &str,
        ) -> std::result::Result<MessageRef, ChannelError> {
            self.sent.lock().unwrap().push(text.to_string());
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            Ok(MessageRef(id.to_string()))
        }

        async fn delete(
            &self,
            _chat_id: &str,
            message: &MessageRef,
        ) -> std::result::Result<(), ChannelError> {
            if let Some(err) = self.delete_result.lock().unwrap().take() {
                return Err(err);
            }
            self.deleted.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        frontend: Arc<RecordingFrontend>,
        store: Arc<TranscriptStore>,
        orchestrator: TurnOrchestrator,
    }

    fn fixture(backend: MockBackend) -> Fixture {
        fixture_with(backend, RecordingFrontend::new())
    }

    fn fixture_with(backend: MockBackend, frontend: RecordingFrontend) -> Fixture {
        let backend = Arc::new(backend);
        let frontend = Arc::new(frontend);
        let store = Arc::new(TranscriptStore::new());
        let orchestrator = TurnOrchestrator::new(
            backend.clone(),
            frontend.clone(),
            store.clone(),
            "You are a patient study tutor.",
        );
        Fixture {
            backend,
            frontend,
            store,
            orchestrator,
        }
    }

    fn user() -> UserId {
        UserId::from("student-1")
    }

    fn turn(text: &str) -> TurnRequest {
        TurnRequest::text(user(), "chat-1", text)
    }

    #[tokio::test]
    async fn first_turn_has_instruction_and_no_history() {
        let fx = fixture(MockBackend::replying("Photosynthesis converts light into energy."));

        let outcome = fx.orchestrator.process(turn("What is photosynthesis?")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed { fragments: 1 });

        let payload = fx.backend.last_payload();
        let text = payload.text_content();
        assert!(text.starts_with("You are a patient study tutor."));
        assert!(!text.contains("Recent conversation"));
        assert!(text.contains("Student question: What is photosynthesis?"));

        // History grew by exactly one Student and one Assistant entry
        let window = fx.store.recent_window(&user(), 10).await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].text, "What is photosynthesis?");
        assert_eq!(
            window[1].text,
            "Photosynthesis converts light into energy."
        );
    }

    #[tokio::test]
    async fn second_turn_sees_prior_history() {
        let fx = fixture(MockBackend::with_results(vec![
            Ok(BackendReply::text_only("First answer.")),
            Ok(BackendReply::text_only("Second answer.")),
        ]));

        fx.orchestrator.process(turn("First question?")).await.unwrap();
        fx.orchestrator.process(turn("Second question?")).await.unwrap();

        let text = fx.backend.last_payload().text_content();
        assert!(text.contains("Recent conversation:"));
        assert!(text.contains("Student: First question?"));
        assert!(text.contains("Tutor: First answer."));
    }

    #[tokio::test]
    async fn rejected_turn_never_reaches_backend() {
        let fx = fixture(MockBackend::replying("ok"));
        let orchestrator = TurnOrchestrator::new(
            fx.backend.clone(),
            fx.frontend.clone(),
            fx.store.clone(),
            "instr",
        )
        .with_limiter(RateLimiter::new(1, 60));

        assert_eq!(
            orchestrator.process(turn("one")).await.unwrap(),
            TurnOutcome::Completed { fragments: 1 }
        );
        assert_eq!(
            orchestrator.process(turn("two")).await.unwrap(),
            TurnOutcome::Rejected
        );
        assert_eq!(fx.backend.calls(), 1);
        // Rejection delivered exactly one message, with no status message
        let sent = fx.frontend.sent();
        assert!(sent.last().unwrap().contains("wait a moment"));
    }

    #[tokio::test]
    async fn backend_failure_leaves_history_unchanged() {
        let fx = fixture(MockBackend::with_results(vec![Err(
            BackendError::Network("connection reset".into()),
        )]));

        let outcome = fx.orchestrator.process(turn("question")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Failed);

        // No partial append
        assert!(fx.store.recent_window(&user(), 10).await.is_empty());

        // Exactly one user-facing error message after the status message
        let delivered = fx.frontend.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("/clear"));
    }

    #[tokio::test]
    async fn content_block_gets_distinct_message() {
        let fx = fixture(MockBackend::with_results(vec![Err(
            BackendError::ContentBlocked {
                reason: "SAFETY".into(),
            },
        )]));

        fx.orchestrator.process(turn("question")).await.unwrap();
        let delivered = fx.frontend.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("rephrasing"));
        assert!(!delivered[0].contains("/clear"));
    }

    #[tokio::test]
    async fn image_only_turn_substitutes_default_question() {
        let fx = fixture(MockBackend::replying("It is a cell diagram."));
        let request = TurnRequest {
            user_id: user(),
            chat_id: "chat-1".into(),
            text: None,
            image: Some(ImageData {
                mime_type: "image/jpeg".into(),
                data: vec![1, 2, 3],
            }),
        };

        fx.orchestrator.process(request).await.unwrap();

        let text = fx.backend.last_payload().text_content();
        assert!(text.contains(DEFAULT_IMAGE_QUESTION));

        let window = fx.store.recent_window(&user(), 10).await;
        assert!(window[0].text.starts_with("[Sent image]"));
    }

    #[tokio::test]
    async fn empty_turn_is_an_error() {
        let fx = fixture(MockBackend::replying("unused"));
        let request = TurnRequest {
            user_id: user(),
            chat_id: "chat-1".into(),
            text: None,
            image: None,
        };
        assert!(matches!(
            fx.orchestrator.process(request).await,
            Err(Error::EmptyTurn)
        ));
        assert_eq!(fx.backend.calls(), 0);
    }

    #[tokio::test]
    async fn long_reply_is_chunked_with_continuation_markers() {
        let p1 = "a".repeat(3000);
        let p2 = "b".repeat(3000);
        let p3 = "c".repeat(3000);
        let reply = format!("{p1}\n\n{p2}\n\n{p3}");
        let fx = fixture(MockBackend::replying(&reply));

        let outcome = fx.orchestrator.process(turn("long one")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed { fragments: 3 });

        let delivered = fx.frontend.delivered();
        assert_eq!(delivered.len(), 3);
        assert!(!delivered[0].starts_with(CONTINUATION_MARKER));
        assert!(delivered[1].starts_with(CONTINUATION_MARKER));
        assert!(delivered[2].starts_with(CONTINUATION_MARKER));
    }

    #[tokio::test]
    async fn continuation_fragments_respect_the_hard_limit() {
        // A single 9000-char paragraph at the platform's exact limit:
        // the marker prefix must not push any delivered message over it.
        let fx = fixture(MockBackend::replying(&"a".repeat(9000)));
        let orchestrator = TurnOrchestrator::new(
            fx.backend.clone(),
            fx.frontend.clone(),
            fx.store.clone(),
            "instr",
        )
        .with_max_fragment_len(4096);

        orchestrator.process(turn("long one")).await.unwrap();

        let delivered = fx.frontend.delivered();
        assert!(delivered.len() >= 2);
        assert!(delivered[1].starts_with(CONTINUATION_MARKER));
        assert!(
            delivered.iter().all(|m| m.len() <= 4096),
            "delivered lengths: {:?}",
            delivered.iter().map(String::len).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn short_reply_is_not_shrunk_by_marker_reserve() {
        // A reply exactly at the limit fits in one unmarked message.
        let fx = fixture(MockBackend::replying(&"b".repeat(4000)));
        let outcome = fx.orchestrator.process(turn("q")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed { fragments: 1 });
        assert_eq!(fx.frontend.delivered()[0].len(), 4000);
    }

    #[tokio::test]
    async fn status_message_is_deleted_on_success() {
        let fx = fixture(MockBackend::replying("answer"));
        fx.orchestrator.process(turn("q")).await.unwrap();
        assert_eq!(fx.frontend.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_status_message_is_swallowed() {
        let fx = fixture_with(
            MockBackend::replying("answer"),
            RecordingFrontend::failing_delete(ChannelError::MessageNotFound),
        );
        let outcome = fx.orchestrator.process(turn("q")).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed { fragments: 1 });
    }

    #[tokio::test]
    async fn idle_turn_locks_are_evicted() {
        let fx = fixture(MockBackend::with_results(vec![
            Ok(BackendReply::text_only("one")),
            Ok(BackendReply::text_only("two")),
        ]));

        fx.orchestrator.process(turn("first")).await.unwrap();
        let second = TurnRequest::text(UserId::from("student-2"), "chat-2", "second");
        fx.orchestrator.process(second).await.unwrap();

        // The first user's idle lock was dropped when the second turn
        // came through.
        let locks = fx.orchestrator.turn_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&UserId::from("student-2")));
    }

    #[tokio::test]
    async fn reset_clears_prompt_history() {
        let fx = fixture(MockBackend::with_results(vec![
            Ok(BackendReply::text_only("first")),
            Ok(BackendReply::text_only("second")),
        ]));

        fx.orchestrator.process(turn("first question")).await.unwrap();
        fx.orchestrator.reset(&user()).await;
        fx.orchestrator.process(turn("fresh question")).await.unwrap();

        let text = fx.backend.last_payload().text_content();
        assert!(!text.contains("Recent conversation"));
        assert!(!text.contains("first question"));
    }
}
