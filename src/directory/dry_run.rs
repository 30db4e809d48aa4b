// Directory stand-in used when no management API is configured
use async_trait::async_trait;
use log::info;

use super::{AccountMutator, DirectoryError, UserIdentifier};

/// Logs the mutation it would have performed and succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunMutator;

#[async_trait]
impl AccountMutator for DryRunMutator {
    async fn delete_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        info!("🧪 [dry run] Would delete directory user: {user_id}");
        Ok(())
    }

    async fn block_user(&self, user_id: &UserIdentifier) -> Result<(), DirectoryError> {
        info!("🧪 [dry run] Would block directory user: {user_id}");
        Ok(())
    }

    async fn patch_user(&self, user_id: &UserIdentifier, email: &str) -> Result<(), DirectoryError> {
        info!("🧪 [dry run] Would set email of directory user {user_id} to {email}");
        Ok(())
    }
}
