use tokio::sync::broadcast;

use crate::core::models::IdentityUser;
use crate::error::Error;

const CAPACITY: usize = 16;

/// Notifications about the current session, for observers outside the call path.
#[derive(Debug, Clone, PartialEq)]
pub enum UserManagerEvent {
    UserLoaded(IdentityUser),
    UserUnloaded,
    /// Silent renewal failed after its retry; the stale user is left in place.
    SilentRenewError(Error),
    UserSignedOut,
}

pub(crate) struct Events {
    sender: broadcast::Sender<UserManagerEvent>,
}

impl Events {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    pub(crate) fn emit(&self, event: UserManagerEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<UserManagerEvent> {
        self.sender.subscribe()
    }
}
