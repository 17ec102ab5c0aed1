use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;
use crate::types::{Role, User};

/// Current user record
pub async fn get_me(store: &dyn Store, session: &Session) -> Result<User> {
    store
        .get_user(&session.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", session.user_id.clone()))
}

/// All users, oldest account first, optionally only one role. Admin only.
pub async fn list_users(store: &dyn Store, session: &Session, role: Option<Role>) -> Result<Vec<User>> {
    session.require_admin()?;
    let mut users: Vec<User> = store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| role.map(|r| u.role == r).unwrap_or(true))
        .collect();
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.user_id.cmp(&b.user_id)));
    Ok(users)
}

/// Promote or demote a user. Admin only.
pub async fn set_role(store: &dyn Store, session: &Session, user_id: &str, role: Role) -> Result<User> {
    session.require_admin()?;
    store.set_role(user_id, role).await?;
    tracing::info!(user_id, role = role.as_str(), admin = %session.user_id, "Role updated");
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::seed_user;

    #[tokio::test]
    async fn admins_manage_roles() {
        let store = MemoryStore::new();
        seed_user(&store, "a1", Role::Admin).await;
        seed_user(&store, "s1", Role::Student).await;
        seed_user(&store, "s2", Role::Student).await;
        let admin = Session::new("a1", Role::Admin);

        let students = list_users(&store, &admin, Some(Role::Student)).await.unwrap();
        assert_eq!(students.len(), 2);

        let promoted = set_role(&store, &admin, "s1", Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(list_users(&store, &admin, Some(Role::Admin)).await.unwrap().len(), 2);
        assert_eq!(list_users(&store, &admin, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn students_cannot_list_or_promote() {
        let store = MemoryStore::new();
        seed_user(&store, "s1", Role::Student).await;
        let student = Session::new("s1", Role::Student);

        assert!(matches!(list_users(&store, &student, None).await, Err(AppError::Forbidden(_))));
        assert!(matches!(
            set_role(&store, &student, "s1", Role::Admin).await,
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(get_me(&store, &student).await.unwrap().role, Role::Student);
    }

    #[tokio::test]
    async fn unknown_user_role_change_is_not_found() {
        let store = MemoryStore::new();
        let admin = Session::new("a1", Role::Admin);
        assert!(matches!(
            set_role(&store, &admin, "ghost", Role::Admin).await,
            Err(AppError::NotFound("user", _))
        ));
    }
}
