//! Persistence ports. `DynamoStore` backs them in production, `MemoryStore` in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BlogPost, Course, CourseProgress, Lecture, Profile, Resource, Role, User, UserProgress};

pub mod dynamo;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use dynamo::DynamoStore;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    /// `NotFound` when the user does not exist.
    async fn set_role(&self, user_id: &str, role: Role) -> Result<()>;
    /// Replaces the whole enrollment list. `NotFound` when the user does not exist.
    async fn set_enrollment(&self, user_id: &str, course_ids: &[String]) -> Result<()>;
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;
    /// Writes the profile, the full enrollment list, `profileCompleted = true` and the
    /// avatar as one all-or-nothing unit. `NotFound` when the user does not exist.
    async fn save_profile_with_enrollment(&self, profile: &Profile, course_ids: &[String]) -> Result<()>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>>;
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;
    /// Lectures of one course, in storage order.
    async fn list_lectures(&self, course_id: &str) -> Result<Vec<Lecture>>;
    /// Creates the course and all its lectures. Either everything is visible afterwards or nothing is.
    async fn create_course(&self, course: &Course, lectures: &[Lecture]) -> Result<()>;
    /// Overwrites course metadata. `NotFound` when the course does not exist.
    async fn update_course(&self, course: &Course) -> Result<()>;
    /// Deletes the course and its lectures. `NotFound` when the course does not exist.
    async fn delete_course(&self, course_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// All of a user's progress. Empty when the user never toggled anything.
    async fn get_progress(&self, user_id: &str) -> Result<UserProgress>;
    /// Adds or removes one lecture id in one course's completed set and stamps
    /// `last_accessed`. Other courses are untouched. Returns the course's entry after the write.
    async fn set_lecture_completed(
        &self,
        user_id: &str,
        course_id: &str,
        lecture_id: &str,
        completed: bool,
        accessed_at: &str,
    ) -> Result<CourseProgress>;
}

#[async_trait]
pub trait BlogStore: Send + Sync {
    async fn list_blogs(&self) -> Result<Vec<BlogPost>>;
    async fn get_blog(&self, blog_id: &str) -> Result<Option<BlogPost>>;
    async fn put_blog(&self, blog: &BlogPost) -> Result<()>;
    /// `NotFound` when the post does not exist.
    async fn delete_blog(&self, blog_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<Resource>>;
    async fn get_resource(&self, resource_id: &str) -> Result<Option<Resource>>;
    async fn put_resource(&self, resource: &Resource) -> Result<()>;
    /// `NotFound` when the resource does not exist.
    async fn delete_resource(&self, resource_id: &str) -> Result<()>;
}

/// Everything the services need from the document store.
pub trait Store: UserStore + CatalogStore + ProgressStore + BlogStore + ResourceStore {}

impl<T> Store for T where T: UserStore + CatalogStore + ProgressStore + BlogStore + ResourceStore {}
