use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{StoredUserProfile, UserProfileData},
    storage::{document::collections, DocumentStore, DocumentWrite},
};

pub struct ProfilesService {
    documents: Arc<dyn DocumentStore>,
}

impl ProfilesService {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Merge profile fields into `user_profiles/{user_id}` and mark the
    /// profile complete. `createdAt` is only stamped on the first save.
    pub async fn save_user_profile(&self, user_id: &str, data: &UserProfileData) -> AppResult<()> {
        let exists = self
            .documents
            .get(collections::USER_PROFILES, user_id)
            .await?
            .is_some();

        let mut write = DocumentWrite::from_record(data)?
            .field("profileCompleted", true)
            .server_timestamp("updatedAt")
            .merge();
        if !exists {
            write = write.server_timestamp("createdAt");
        }

        self.documents
            .set(collections::USER_PROFILES, user_id, write)
            .await?;

        tracing::debug!("Saved profile for user {}", user_id);
        Ok(())
    }

    pub async fn get_user_profile(&self, user_id: &str) -> AppResult<Option<StoredUserProfile>> {
        self.documents
            .get(collections::USER_PROFILES, user_id)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }
}
