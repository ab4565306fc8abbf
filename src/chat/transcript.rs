//! Append-only chat transcript.
//!
//! Turns strictly alternate user/assistant starting with user; the append
//! methods enforce the invariant so no caller can interleave roles. The
//! transcript lives and dies with its session; there is no persistence.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("expected a {expected:?} turn after {previous:?}")]
    RoleOrder {
        expected: Role,
        previous: Option<Role>,
    },
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message exchange unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Ordered history of turns for a session.
#[derive(Debug, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn. Valid only when the transcript is empty or the
    /// last turn is an assistant turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        match self.last_role() {
            None | Some(Role::Assistant) => {
                self.turns.push(Turn {
                    role: Role::User,
                    content: content.into(),
                });
                Ok(())
            }
            previous @ Some(Role::User) => Err(TranscriptError::RoleOrder {
                expected: Role::Assistant,
                previous,
            }),
        }
    }

    /// Append an assistant turn. Valid only directly after a user turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        match self.last_role() {
            Some(Role::User) => {
                self.turns.push(Turn {
                    role: Role::Assistant,
                    content: content.into(),
                });
                Ok(())
            }
            previous => Err(TranscriptError::RoleOrder {
                expected: Role::User,
                previous,
            }),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.turns.last().map(|t| t.role)
    }
}
