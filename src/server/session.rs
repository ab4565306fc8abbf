//! Server-side session store.
//!
//! What the original web framework kept in an implicit per-session global
//! becomes an explicit context here: each session owns its transcript and
//! the cancellation slot for an in-flight turn. Sessions are in-memory only
//! and vanish with the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::chat::transcript::{Transcript, Turn};

/// One chat session: a transcript plus the in-flight turn state.
pub struct Session {
    pub id: Uuid,
    transcript: Arc<Mutex<Transcript>>,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            transcript: Arc::new(Mutex::new(Transcript::new())),
            cancel: std::sync::Mutex::new(None),
        }
    }

    /// Claim the session for one turn.
    ///
    /// Returns the transcript guard (held for the duration of the turn; a
    /// second claim fails until it is released) and a fresh cancellation
    /// token, also stored so [`cancel_active`](Self::cancel_active) can
    /// reach it.
    pub fn try_begin_turn(&self) -> Option<(OwnedMutexGuard<Transcript>, CancellationToken)> {
        let guard = Arc::clone(&self.transcript).try_lock_owned().ok()?;
        let token = CancellationToken::new();
        *self.cancel_slot() = Some(token.clone());
        Some((guard, token))
    }

    /// Clear the cancellation slot once a turn finishes.
    pub fn end_turn(&self) {
        *self.cancel_slot() = None;
    }

    /// Fire the in-flight turn's cancellation token, if any.
    pub fn cancel_active(&self) -> bool {
        match self.cancel_slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a turn currently holds the transcript.
    pub fn turn_in_flight(&self) -> bool {
        self.transcript.try_lock().is_err()
    }

    /// Copy of the turns so far. Waits for an in-flight turn to finish.
    pub async fn transcript_snapshot(&self) -> Vec<Turn> {
        self.transcript.lock().await.turns().to_vec()
    }

    fn cancel_slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A poisoned slot only means a panicking turn task; the token inside
        // is still valid.
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// All live sessions, keyed by server-issued UUID.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return it.
    pub async fn create(&self) -> Arc<Session> {
        let id = Uuid::new_v4();
        let session = Arc::new(Session::new(id));
        self.sessions.write().await.insert(id, Arc::clone(&session));
        info!(session_id = %id, "Session created");
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
