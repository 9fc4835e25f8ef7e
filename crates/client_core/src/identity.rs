use std::sync::Arc;

use shared::domain::Identity;
use storage::KeyValueStore;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ClientError;

pub const STUDENT_NAME_KEY: &str = "studentName";

/// The one display name this client works under, mirrored to the store.
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Identity>>,
}

impl IdentityStore {
    pub async fn open(store: Arc<dyn KeyValueStore>) -> Result<Self, ClientError> {
        let raw = store
            .get(STUDENT_NAME_KEY)
            .await
            .map_err(|source| ClientError::persistence(STUDENT_NAME_KEY, source))?;

        let current = match raw {
            Some(raw) => match Identity::parse(&raw) {
                Ok(identity) => Some(identity),
                Err(_) => {
                    warn!("identity: ignoring blank stored name");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            store,
            current: RwLock::new(current),
        })
    }

    pub async fn load(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }

    /// Trims and stores `raw_name`, replacing any previous identity. Memory
    /// is only updated once the store write has gone through.
    pub async fn set(&self, raw_name: &str) -> Result<Identity, ClientError> {
        let identity = Identity::parse(raw_name)?;

        let mut current = self.current.write().await;
        self.store
            .set(STUDENT_NAME_KEY, identity.name())
            .await
            .map_err(|source| ClientError::persistence(STUDENT_NAME_KEY, source))?;
        *current = Some(identity.clone());

        info!(name = identity.name(), "identity: stored");
        Ok(identity)
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
