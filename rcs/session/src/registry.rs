use crate::session::{Inner, SessionHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Registry of all live sessions, shared between the engine and its users
///
/// Holds weak references, a session that finished its run is gone even if a
/// removal was lost.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Weak<Inner>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, inner: &Arc<Inner>) {
        let mut sessions = self.sessions.lock();

        // sessions whose driving future was dropped never removed
        // themselves, sweep their entries out here
        sessions.retain(|_, session| session.strong_count() != 0);

        sessions.insert(inner.id.to_string(), Arc::downgrade(inner));
    }

    /// Remove a session, idempotent
    pub(crate) fn remove(&self, id: &str) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        let inner = self.sessions.lock().get(id)?.upgrade()?;

        Some(SessionHandle::new(inner))
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, session)| session.strong_count() != 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|session| session.strong_count() != 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::session::{Direction, MediaKind, PauseCommand, SessionState};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn session(
        registry: &SessionRegistry,
        id: &str,
    ) -> (Arc<Inner>, UnboundedReceiver<PauseCommand>) {
        Inner::new(
            id.into(),
            "sip:bob@example.com".into(),
            Direction::Originating,
            MediaKind::Chat,
            SessionState::Init,
            registry.clone(),
            None,
        )
    }

    #[test]
    fn dropped_sessions_do_not_linger() {
        let registry = SessionRegistry::new();

        let first = session(&registry, "a");
        let second = session(&registry, "b");

        assert_eq!(registry.len(), 2);

        // the driving future was dropped without a terminal transition
        drop(first);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), vec!["b".to_string()]);
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());

        // an insert sweeps the dead entry out of the map
        let third = session(&registry, "c");
        assert_eq!(registry.sessions.lock().len(), 2);

        drop((second, third));
        assert!(registry.is_empty());
    }
}
