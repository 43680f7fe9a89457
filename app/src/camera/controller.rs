use std::sync::{Mutex, PoisonError};

use super::session::{ConnectionId, SessionId, SharedSessions};

//One concurrent stream a camera offers to the host
pub trait StreamController: Send + Sync {
    fn index(&self) -> usize;

    fn session_identifier(&self) -> Option<SessionId>;

    //Binds the controller to a session, false if it is busy
    fn try_claim(&self, session: &SessionId, connection: Option<&ConnectionId>) -> bool;

    fn release(&self, session: &SessionId);

    //Ends whatever session is bound, running or not
    fn force_stop(&self);

    fn handle_close_connection(&self, connection: &ConnectionId);
}

#[derive(Debug, Clone)]
struct Binding {
    session: SessionId,
    connection: Option<ConnectionId>,
}

pub struct StreamSlot {
    index: usize,
    sessions: SharedSessions,
    binding: Mutex<Option<Binding>>,
}

impl StreamSlot {
    pub(super) fn new(index: usize, sessions: SharedSessions) -> Self {
        Self {
            index,
            sessions,
            binding: Mutex::new(None),
        }
    }

    fn binding(&self) -> std::sync::MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamController for StreamSlot {
    fn index(&self) -> usize {
        self.index
    }

    fn session_identifier(&self) -> Option<SessionId> {
        self.binding().as_ref().map(|b| b.session.clone())
    }

    fn try_claim(&self, session: &SessionId, connection: Option<&ConnectionId>) -> bool {
        let mut binding = self.binding();
        match binding.as_ref() {
            Some(current) if &current.session != session => false,
            _ => {
                *binding = Some(Binding {
                    session: session.clone(),
                    connection: connection.cloned(),
                });
                true
            }
        }
    }

    fn release(&self, session: &SessionId) {
        let mut binding = self.binding();
        if binding.as_ref().is_some_and(|b| &b.session == session) {
            *binding = None;
        }
    }

    fn force_stop(&self) {
        let Some(binding) = self.binding().take() else {
            return;
        };

        tracing::warn!("Force stopping stream {} of session {}", self.index, binding.session);
        self.sessions.lock().discard(&binding.session);
    }

    fn handle_close_connection(&self, connection: &ConnectionId) {
        let affected = self
            .binding()
            .as_ref()
            .is_some_and(|b| b.connection.as_ref() == Some(connection));

        if affected {
            tracing::info!("Connection {} closed, stopping stream {}", connection, self.index);
            self.force_stop();
        }
    }
}
