//! Explicit per-request identity, passed into every service call.

use crate::error::{AppError, Result};
use crate::types::Role;
use crate::local_storage::LocalStorage;

/// Who is calling, and with which role. Built from verified token claims at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }
}

const SESSION_KEY: &str = "uid";

/// Client-side marker of the signed-in user. Created on sign-in, cleared on sign-out.
pub struct SessionMarker<'a, S: LocalStorage> {
    storage: &'a S,
}

impl<'a, S: LocalStorage> SessionMarker<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub async fn sign_in(&self, user_id: &str) -> Result<()> {
        self.storage.set(SESSION_KEY, user_id).await
    }

    pub async fn current_user(&self) -> Result<Option<String>> {
        Ok(self
            .storage
            .get(SESSION_KEY)
            .await?
            .filter(|uid| !uid.is_empty()))
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.storage.remove(SESSION_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_storage::MemoryStorage;

    #[test]
    fn only_admins_pass_the_admin_check() {
        assert!(Session::new("u1", Role::Admin).require_admin().is_ok());
        let err = Session::new("u2", Role::Student).require_admin().unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn marker_lifecycle() {
        let storage = MemoryStorage::default();
        let marker = SessionMarker::new(&storage);
        assert_eq!(marker.current_user().await.unwrap(), None);

        marker.sign_in("user-1").await.unwrap();
        assert_eq!(marker.current_user().await.unwrap(), Some("user-1".to_string()));

        marker.sign_out().await.unwrap();
        assert_eq!(marker.current_user().await.unwrap(), None);
    }
}
