//! Guest identity lifecycle and the authentication signal.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::value_objects::{AnonymousId, UserId};
use crate::storage::{KeyValueStorage, StorageError, GUEST_IDENTITY_KEY};

/// Anonymous token persisted in client storage.
///
/// Created lazily on the first guest mutation and kept until it is discarded
/// after a successful reconciliation.
#[derive(Clone)]
pub struct GuestIdentity {
    storage: Arc<dyn KeyValueStorage>,
}

impl GuestIdentity {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// The stored token, if any. Unparseable values read as absent.
    pub async fn current(&self) -> Result<Option<AnonymousId>, StorageError> {
        let raw = self.storage.read(GUEST_IDENTITY_KEY).await?;
        Ok(raw.as_deref().and_then(AnonymousId::parse))
    }

    pub async fn ensure(&self) -> Result<AnonymousId, StorageError> {
        if let Some(id) = self.current().await? {
            return Ok(id);
        }
        let id = AnonymousId::generate();
        self.storage.write(GUEST_IDENTITY_KEY, &id.to_string()).await?;
        tracing::debug!(guest = %id, "created anonymous identity");
        Ok(id)
    }

    pub async fn discard(&self) -> Result<(), StorageError> {
        self.storage.remove(GUEST_IDENTITY_KEY).await
    }
}

/// What changed when the auth layer reported a new identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthTransition {
    Unchanged,
    SignedIn(UserId),
    SignedOut(UserId),
    Switched { from: UserId, to: UserId },
}

impl AuthTransition {
    pub fn between(previous: Option<UserId>, next: Option<UserId>) -> Self {
        match (previous, next) {
            (None, Some(user)) => Self::SignedIn(user),
            (Some(user), None) => Self::SignedOut(user),
            (Some(from), Some(to)) if from != to => Self::Switched { from, to },
            _ => Self::Unchanged,
        }
    }
}

/// Current identity, or none; observers subscribe to changes.
#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    pub fn set(&self, user: Option<UserId>) -> AuthTransition {
        let previous = self.tx.send_replace(user.clone());
        AuthTransition::between(previous, user)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
