//! The chat turn loop.
//!
//! One turn: append the user utterance, format the instruction prompt,
//! drive the generator, fold fragments into an accumulator while surfacing
//! each one to the render sink, then append the accumulator as the
//! assistant turn. The transcript grows by exactly two entries per accepted
//! turn.
//!
//! A mid-stream engine error or a cancellation still appends the partial
//! accumulator as the assistant turn, keeping the alternation invariant
//! intact for the turns that follow; the outcome records how the stream
//! ended so the UI can annotate the bubble.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chat::prompt;
use crate::chat::transcript::{Transcript, TranscriptError};
use crate::config::GenerationConfig;
use crate::engine::generate::{GenerationRequest, Generator, StreamEvent};

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("empty input")]
    EmptyInput,

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// How the fragment stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// The engine reached its stop sequence or token cap.
    Complete,

    /// The cancellation token fired mid-stream.
    Cancelled,

    /// The engine failed mid-stream; the partial text was kept.
    Error(String),
}

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The full assistant reply (concatenation of every fragment, in order).
    pub content: String,

    /// Number of fragments folded into `content`.
    pub fragments: usize,

    /// How the stream ended.
    pub finish: FinishReason,
}

/// Run one chat turn against `generator`, mutating `transcript` in place.
///
/// `on_fragment` is invoked once per arriving fragment, in arrival order.
/// This is the incremental-render hook.
pub async fn run_turn(
    transcript: &mut Transcript,
    generator: &dyn Generator,
    generation: &GenerationConfig,
    request_id: &str,
    input: &str,
    cancel: CancellationToken,
    mut on_fragment: impl FnMut(&str) + Send,
) -> Result<TurnOutcome, TurnError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TurnError::EmptyInput);
    }

    transcript.push_user(input)?;

    let request = GenerationRequest {
        request_id: request_id.to_string(),
        prompt: prompt::format_instruction(input),
        max_tokens: generation.max_tokens,
        stop: prompt::stop_sequences(),
        cancel: cancel.clone(),
    };

    debug!(request_id, turns = transcript.len(), "Turn started");

    let mut rx = generator.generate(request).await;

    let mut accumulator = String::new();
    let mut fragments = 0;
    let mut finish = FinishReason::Complete;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Fragment { text } => {
                fragments += 1;
                accumulator.push_str(&text);
                on_fragment(&text);
            }
            StreamEvent::Done { .. } => {
                if cancel.is_cancelled() {
                    finish = FinishReason::Cancelled;
                }
                break;
            }
            StreamEvent::Error(e) => {
                finish = FinishReason::Error(e);
                break;
            }
        }
    }

    transcript.push_assistant(accumulator.clone())?;

    info!(
        request_id,
        fragments,
        chars = accumulator.len(),
        finish = ?finish,
        "Turn complete"
    );

    Ok(TurnOutcome {
        content: accumulator,
        fragments,
        finish,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::transcript::Role;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Generator double that replays a scripted event sequence.
    struct Scripted {
        events: Vec<StreamEvent>,
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, _request: GenerationRequest) -> mpsc::Receiver<StreamEvent> {
            let (tx, rx) = mpsc::channel(32);
            let events = self.events.clone();
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            rx
        }
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_turn_appends_two_entries_and_concatenates() {
        let generator = Scripted {
            events: vec![
                fragment("fn reverse"),
                fragment("(s: &str)"),
                fragment(" { .. }"),
                StreamEvent::Done {
                    fragments: 3,
                    chars: 26,
                },
            ],
        };

        let mut transcript = Transcript::new();
        let mut seen = Vec::new();
        let outcome = run_turn(
            &mut transcript,
            &generator,
            &GenerationConfig::default(),
            "turn-1",
            "Write a function that reverses a string",
            CancellationToken::new(),
            |t| seen.push(t.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.finish, FinishReason::Complete);
        assert_eq!(outcome.fragments, 3);
        assert_eq!(outcome.content, "fn reverse(s: &str) { .. }");
        assert_eq!(seen.concat(), outcome.content);

        assert_eq!(transcript.len(), 2);
        let turns = transcript.turns();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "Write a function that reverses a string");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, outcome.content);
    }

    #[tokio::test]
    async fn test_empty_input_never_touches_transcript() {
        let generator = Scripted { events: vec![] };
        let mut transcript = Transcript::new();

        let err = run_turn(
            &mut transcript,
            &generator,
            &GenerationConfig::default(),
            "turn-1",
            "   ",
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TurnError::EmptyInput));
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_text() {
        let generator = Scripted {
            events: vec![
                fragment("Hel"),
                fragment("lo"),
                StreamEvent::Error("decode failed".to_string()),
            ],
        };

        let mut transcript = Transcript::new();
        let outcome = run_turn(
            &mut transcript,
            &generator,
            &GenerationConfig::default(),
            "turn-1",
            "hi",
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome.content, "Hello");
        assert_eq!(
            outcome.finish,
            FinishReason::Error("decode failed".to_string())
        );

        // Alternation holds for the next turn.
        assert_eq!(transcript.len(), 2);
        assert!(transcript.push_user("again").is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_turn_is_marked_and_kept() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let generator = Scripted {
            events: vec![
                fragment("par"),
                fragment("tial"),
                StreamEvent::Done {
                    fragments: 2,
                    chars: 7,
                },
            ],
        };

        let mut transcript = Transcript::new();
        let outcome = run_turn(
            &mut transcript,
            &generator,
            &GenerationConfig::default(),
            "turn-1",
            "hi",
            cancel,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome.finish, FinishReason::Cancelled);
        assert_eq!(outcome.content, "partial");
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_consecutive_turns_alternate() {
        let mut transcript = Transcript::new();

        for i in 0..3 {
            let generator = Scripted {
                events: vec![
                    fragment("reply"),
                    StreamEvent::Done {
                        fragments: 1,
                        chars: 5,
                    },
                ],
            };
            run_turn(
                &mut transcript,
                &generator,
                &GenerationConfig::default(),
            "turn-1",
                &format!("question {i}"),
                CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();
        }

        assert_eq!(transcript.len(), 6);
        for (i, turn) in transcript.turns().iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
    }
}
