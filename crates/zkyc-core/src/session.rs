//! Per-user conversation state for multi-step chat flows.

use crate::scratch::ScratchLocation;
use crate::types::ScratchFile;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub type UserId = i64;

/// Step a user is at in a chat flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    WaitingForDocument,
    WaitingForFirstFace,
    WaitingForSecondFace,
    WaitingForIdCard,
    WaitingForSelfie,
}

impl ConversationState {
    pub fn is_waiting(self) -> bool {
        self != Self::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingForDocument => "waiting_for_document",
            Self::WaitingForFirstFace => "waiting_for_first_face",
            Self::WaitingForSecondFace => "waiting_for_second_face",
            Self::WaitingForIdCard => "waiting_for_id_card",
            Self::WaitingForSelfie => "waiting_for_selfie",
        }
    }
}

/// First image of a two-step flow, kept alive across turns.
///
/// Owns its scratch location: dropping it releases the files.
#[derive(Debug)]
pub struct PendingImage {
    pub scratch: ScratchLocation,
    pub image: ScratchFile,
}

#[derive(Debug, Default)]
pub struct Session {
    pub state: ConversationState,
    pub pending: Option<PendingImage>,
}

impl Session {
    pub fn waiting(state: ConversationState) -> Self {
        Self {
            state,
            pending: None,
        }
    }

    pub fn with_pending(state: ConversationState, pending: PendingImage) -> Self {
        Self {
            state,
            pending: Some(pending),
        }
    }
}

/// Store of sessions keyed by user.
///
/// Each entry belongs to that user's in-flight turn. Two turns for the same
/// user racing each other are not guarded: the last `put` wins. Returned
/// sessions are handed back to the caller so their scratch locations are
/// released outside any store lock.
pub trait SessionStore: Send + Sync {
    /// Current state; `Idle` when the user has no session.
    fn state(&self, user: UserId) -> ConversationState;

    /// Replace the user's session, returning the previous one.
    fn put(&self, user: UserId, session: Session) -> Option<Session>;

    /// Remove and return the user's session.
    fn take(&self, user: UserId) -> Option<Session>;
}

/// Process-local store. Lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Session>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn state(&self, user: UserId) -> ConversationState {
        self.lock().get(&user).map(|s| s.state).unwrap_or_default()
    }

    fn put(&self, user: UserId, session: Session) -> Option<Session> {
        let mut sessions = self.lock();
        if session.state == ConversationState::Idle && session.pending.is_none() {
            return sessions.remove(&user);
        }
        sessions.insert(user, session)
    }

    fn take(&self, user: UserId) -> Option<Session> {
        self.lock().remove(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pending(root: &std::path::Path) -> PendingImage {
        let mut scratch = ScratchLocation::create(root).await.unwrap();
        let path = scratch.write("first.jpg", b"x").await.unwrap();
        PendingImage {
            scratch,
            image: ScratchFile {
                path,
                original_name: "first.jpg".into(),
            },
        }
    }

    #[test]
    fn test_unknown_user_is_idle() {
        let store = MemorySessionStore::new();
        assert_eq!(store.state(7), ConversationState::Idle);
        assert!(store.take(7).is_none());
    }

    #[test]
    fn test_put_and_take() {
        let store = MemorySessionStore::new();
        assert!(store
            .put(1, Session::waiting(ConversationState::WaitingForFirstFace))
            .is_none());
        assert_eq!(store.state(1), ConversationState::WaitingForFirstFace);
        assert_eq!(store.state(2), ConversationState::Idle);

        let taken = store.take(1).unwrap();
        assert_eq!(taken.state, ConversationState::WaitingForFirstFace);
        assert_eq!(store.state(1), ConversationState::Idle);
    }

    #[test]
    fn test_put_idle_clears() {
        let store = MemorySessionStore::new();
        store.put(1, Session::waiting(ConversationState::WaitingForIdCard));
        let prev = store.put(1, Session::default());
        assert!(prev.is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let store = MemorySessionStore::new();
        store.put(1, Session::waiting(ConversationState::WaitingForFirstFace));
        store.put(1, Session::waiting(ConversationState::WaitingForDocument));
        assert_eq!(store.state(1), ConversationState::WaitingForDocument);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_replaced_session_releases_scratch_when_dropped() {
        let root = tempfile::tempdir().unwrap();
        let store = MemorySessionStore::new();
        store.put(
            1,
            Session::with_pending(
                ConversationState::WaitingForSecondFace,
                pending(root.path()).await,
            ),
        );
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);

        drop(store.put(1, Session::waiting(ConversationState::WaitingForDocument)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConversationState::Idle.as_str(), "idle");
        assert_eq!(
            ConversationState::WaitingForSecondFace.as_str(),
            "waiting_for_second_face"
        );
        assert!(!ConversationState::Idle.is_waiting());
        assert!(ConversationState::WaitingForSelfie.is_waiting());
    }
}
