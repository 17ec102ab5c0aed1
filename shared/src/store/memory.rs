use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{BlogStore, CatalogStore, ProgressStore, ResourceStore, UserStore};
use crate::error::{AppError, Result};
use crate::types::{BlogPost, Course, CourseProgress, Lecture, Profile, Resource, Role, User, UserProgress};

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, User>,
    profiles: HashMap<String, Profile>,
    courses: BTreeMap<String, Course>,
    lectures: HashMap<String, Vec<Lecture>>,
    progress: HashMap<String, BTreeMap<String, CourseProgress>>,
    blogs: BTreeMap<String, BlogPost>,
    resources: BTreeMap<String, Resource>,
}

/// In-process store with the same observable semantics as `DynamoStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `ExternalService` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn lecture_count(&self, course_id: &str) -> usize {
        self.lock().lectures.get(course_id).map(Vec::len).unwrap_or(0)
    }

    /// Lectures stored across every course, including any without a course item.
    pub fn total_lectures(&self) -> usize {
        self.lock().lectures.values().map(Vec::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("memory store unavailable".to_string()));
        }
        Ok(self.lock())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.check()?.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.check()?.users.get(user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.check()?.users.values().cloned().collect())
    }

    async fn set_role(&self, user_id: &str, role: Role) -> Result<()> {
        let mut inner = self.check()?;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::not_found("user", user_id))?;
        user.role = role;
        Ok(())
    }

    async fn set_enrollment(&self, user_id: &str, course_ids: &[String]) -> Result<()> {
        let mut inner = self.check()?;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::not_found("user", user_id))?;
        user.enrolled_courses = course_ids.to_vec();
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.check()?.profiles.get(user_id).cloned())
    }

    async fn save_profile_with_enrollment(&self, profile: &Profile, course_ids: &[String]) -> Result<()> {
        let mut inner = self.check()?;
        let user = inner
            .users
            .get_mut(&profile.user_id)
            .ok_or_else(|| AppError::not_found("user", profile.user_id.clone()))?;
        user.enrolled_courses = course_ids.to_vec();
        user.profile_completed = true;
        if profile.image_url.is_some() {
            user.avatar_url = profile.image_url.clone();
        }
        inner.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.check()?.courses.values().cloned().collect())
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self.check()?.courses.get(course_id).cloned())
    }

    async fn list_lectures(&self, course_id: &str) -> Result<Vec<Lecture>> {
        Ok(self.check()?.lectures.get(course_id).cloned().unwrap_or_default())
    }

    async fn create_course(&self, course: &Course, lectures: &[Lecture]) -> Result<()> {
        let mut inner = self.check()?;
        if inner.courses.contains_key(&course.course_id) {
            return Err(AppError::ExternalService(format!(
                "course {} already exists",
                course.course_id
            )));
        }
        inner.courses.insert(course.course_id.clone(), course.clone());
        inner.lectures.insert(course.course_id.clone(), lectures.to_vec());
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> Result<()> {
        let mut inner = self.check()?;
        match inner.courses.get_mut(&course.course_id) {
            Some(existing) => {
                *existing = course.clone();
                Ok(())
            }
            None => Err(AppError::not_found("course", course.course_id.clone())),
        }
    }

    async fn delete_course(&self, course_id: &str) -> Result<()> {
        let mut inner = self.check()?;
        if inner.courses.remove(course_id).is_none() {
            return Err(AppError::not_found("course", course_id));
        }
        inner.lectures.remove(course_id);
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_progress(&self, user_id: &str) -> Result<UserProgress> {
        let inner = self.check()?;
        Ok(UserProgress {
            user_id: user_id.to_string(),
            courses: inner.progress.get(user_id).cloned().unwrap_or_default(),
        })
    }

    async fn set_lecture_completed(
        &self,
        user_id: &str,
        course_id: &str,
        lecture_id: &str,
        completed: bool,
        accessed_at: &str,
    ) -> Result<CourseProgress> {
        let mut inner = self.check()?;
        let entry = inner
            .progress
            .entry(user_id.to_string())
            .or_default()
            .entry(course_id.to_string())
            .or_default();
        if completed {
            entry.completed_lecture_ids.insert(lecture_id.to_string());
        } else {
            entry.completed_lecture_ids.remove(lecture_id);
        }
        entry.last_accessed = Some(accessed_at.to_string());
        Ok(entry.clone())
    }
}

#[async_trait]
impl BlogStore for MemoryStore {
    async fn list_blogs(&self) -> Result<Vec<BlogPost>> {
        Ok(self.check()?.blogs.values().cloned().collect())
    }

    async fn get_blog(&self, blog_id: &str) -> Result<Option<BlogPost>> {
        Ok(self.check()?.blogs.get(blog_id).cloned())
    }

    async fn put_blog(&self, blog: &BlogPost) -> Result<()> {
        self.check()?.blogs.insert(blog.blog_id.clone(), blog.clone());
        Ok(())
    }

    async fn delete_blog(&self, blog_id: &str) -> Result<()> {
        match self.check()?.blogs.remove(blog_id) {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("blog", blog_id)),
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.check()?.resources.values().cloned().collect())
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Option<Resource>> {
        Ok(self.check()?.resources.get(resource_id).cloned())
    }

    async fn put_resource(&self, resource: &Resource) -> Result<()> {
        self.check()?
            .resources
            .insert(resource.resource_id.clone(), resource.clone());
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        match self.check()?.resources.remove(resource_id) {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("resource", resource_id)),
        }
    }
}
