use async_trait::async_trait;

use medseal::server::login::{CredentialStore, StoredCredential};
use medseal::ServerError;

use crate::db::{queries, DbPool};

/// Credential lookups against the `users` table.
#[derive(Clone)]
pub struct DbCredentialStore {
    db: DbPool,
}

impl DbCredentialStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn find_by_identity(&self, identity: &str) -> medseal::Result<Option<StoredCredential>> {
        let db = self.db.clone();
        let email = identity.to_string();

        let user = tokio::task::spawn_blocking(move || queries::find_user_by_email(&db, &email))
            .await
            .map_err(|e| {
                tracing::error!("Credential lookup task failed: {}", e);
                ServerError::WorkerFailed
            })?
            .map_err(|e| ServerError::Store(e.to_string()))?;

        user.map(|user| user.into_credential()).transpose()
    }
}
