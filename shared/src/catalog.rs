//! Course catalog reads, merged with the caller's own progress at read time.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::enrollment::clean_topics;
use crate::error::{AppError, Result};
use crate::progress::{compute_progress, Progress, ProgressStatus};
use crate::session::Session;
use crate::store::Store;
use crate::types::{Course, Lecture, UpdateCourseRequest, UserProgress, Year};

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LectureView {
    #[serde(flatten)]
    pub lecture: Lecture,
    pub is_completed: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    #[serde(flatten)]
    pub course: Course,
    pub lectures: Vec<LectureView>,
    pub progress: Progress,
    pub is_enrolled: bool,
    pub completed_lectures: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LearningSummary {
    pub enrolled_courses: usize,
    pub completed_lectures: usize,
    pub total_lectures: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
}

/// Sorts lectures by their position in `lectures_order`. Lectures missing from it
/// follow, by numeric `order` and then id.
pub fn order_lectures(mut lectures: Vec<Lecture>, lectures_order: &[String]) -> Vec<Lecture> {
    let position: HashMap<&str, usize> = lectures_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    lectures.sort_by(|a, b| {
        let pa = position.get(a.lecture_id.as_str());
        let pb = position.get(b.lecture_id.as_str());
        match (pa, pb) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => {
                let oa = a.order.unwrap_or(u32::MAX);
                let ob = b.order.unwrap_or(u32::MAX);
                oa.cmp(&ob).then_with(|| a.lecture_id.cmp(&b.lecture_id))
            }
        }
    });
    lectures
}

/// Composes one course with a user's completed set. The catalog entities are not modified.
pub fn build_view(
    course: Course,
    lectures: Vec<Lecture>,
    completed_ids: &BTreeSet<String>,
    enrolled: &[String],
) -> CourseView {
    let lectures: Vec<LectureView> = order_lectures(lectures, &course.lectures_order)
        .into_iter()
        .map(|lecture| LectureView {
            is_completed: completed_ids.contains(&lecture.lecture_id),
            lecture,
        })
        .collect();

    let progress = compute_progress(&lectures);
    let completed_lectures = lectures.iter().filter(|l| l.is_completed).count();
    let is_enrolled = enrolled.iter().any(|id| *id == course.course_id);

    CourseView {
        course,
        lectures,
        progress,
        is_enrolled,
        completed_lectures,
    }
}

fn completed_for<'a>(progress: &'a UserProgress, course_id: &str, empty: &'a BTreeSet<String>) -> &'a BTreeSet<String> {
    progress
        .courses
        .get(course_id)
        .map(|p| &p.completed_lecture_ids)
        .unwrap_or(empty)
}

async fn views_for(store: &dyn Store, session: &Session, courses: Vec<Course>) -> Result<Vec<CourseView>> {
    let enrolled = store
        .get_user(&session.user_id)
        .await?
        .map(|u| u.enrolled_courses)
        .unwrap_or_default();
    let progress = store.get_progress(&session.user_id).await?;
    let empty = BTreeSet::new();

    let mut views = Vec::with_capacity(courses.len());
    for course in courses {
        let lectures = store.list_lectures(&course.course_id).await?;
        let completed = completed_for(&progress, &course.course_id, &empty);
        views.push(build_view(course, lectures, completed, &enrolled));
    }
    Ok(views)
}

/// Every course in the catalog, annotated for the session's user.
pub async fn list_courses(store: &dyn Store, session: &Session) -> Result<Vec<CourseView>> {
    let courses = store.list_courses().await?;
    let views = views_for(store, session, courses).await?;
    tracing::debug!(user_id = %session.user_id, courses = views.len(), "Catalog loaded");
    Ok(views)
}

pub async fn get_course(store: &dyn Store, session: &Session, course_id: &str) -> Result<CourseView> {
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::not_found("course", course_id))?;
    let mut views = views_for(store, session, vec![course]).await?;
    views
        .pop()
        .ok_or_else(|| AppError::not_found("course", course_id))
}

/// Courses the user is enrolled in, optionally narrowed to one progress status.
pub async fn list_enrolled_courses(
    store: &dyn Store,
    session: &Session,
    status: Option<ProgressStatus>,
) -> Result<Vec<CourseView>> {
    let enrolled: HashSet<String> = store
        .get_user(&session.user_id)
        .await?
        .map(|u| u.enrolled_courses.into_iter().collect())
        .unwrap_or_default();
    if enrolled.is_empty() {
        return Ok(Vec::new());
    }

    let courses: Vec<Course> = store
        .list_courses()
        .await?
        .into_iter()
        .filter(|c| enrolled.contains(&c.course_id))
        .collect();

    Ok(views_for(store, session, courses)
        .await?
        .into_iter()
        .filter(|v| status.map(|s| v.progress.status == s).unwrap_or(true))
        .collect())
}

pub async fn learning_summary(store: &dyn Store, session: &Session) -> Result<LearningSummary> {
    let views = list_enrolled_courses(store, session, None).await?;
    let mut summary = LearningSummary {
        enrolled_courses: views.len(),
        ..Default::default()
    };
    for view in &views {
        summary.completed_lectures += view.completed_lectures;
        summary.total_lectures += view.lectures.len();
        match view.progress.status {
            ProgressStatus::NotStarted => summary.not_started += 1,
            ProgressStatus::InProgress => summary.in_progress += 1,
            ProgressStatus::Completed => summary.completed += 1,
        }
    }
    Ok(summary)
}

/// Partial metadata edit. Lectures and their order are left as ingested.
pub async fn update_course(
    store: &dyn Store,
    session: &Session,
    course_id: &str,
    req: UpdateCourseRequest,
) -> Result<Course> {
    session.require_admin()?;

    let mut course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::not_found("course", course_id))?;

    if let Some(title) = req.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("title must not be empty"));
        }
        course.title = title;
    }
    if let Some(description) = req.description {
        course.description = description;
    }
    if let Some(category) = req.category {
        course.category = category.trim().to_string();
    }
    if let Some(year) = req.year {
        course.year = Year::try_from(year)?;
    }
    if let Some(topics) = req.topics {
        course.topics = clean_topics(topics);
    }
    if let Some(thumbnail) = req.thumbnail {
        course.thumbnail = Some(thumbnail).filter(|t| !t.trim().is_empty());
    }
    course.updated_at = Some(chrono::Utc::now().to_rfc3339());

    store.update_course(&course).await?;
    tracing::info!(course_id, admin = %session.user_id, "Course updated");
    Ok(course)
}

pub async fn delete_course(store: &dyn Store, session: &Session, course_id: &str) -> Result<()> {
    session.require_admin()?;
    store.delete_course(course_id).await?;
    tracing::info!(course_id, admin = %session.user_id, "Course deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::set_lecture_completion;
    use crate::store::{CatalogStore, MemoryStore, UserStore};
    use crate::testing::{lecture, seed_course, seed_user};
    use crate::types::Role;

    #[test]
    fn lectures_follow_canonical_order_then_fallback() {
        let lectures = vec![
            lecture("a", Some(5)),
            lecture("b", Some(0)),
            lecture("c", None),
            lecture("d", Some(1)),
            lecture("e", Some(1)),
        ];
        let order = vec!["d".to_string(), "a".to_string(), "ghost".to_string()];
        let ids: Vec<String> = order_lectures(lectures, &order)
            .into_iter()
            .map(|l| l.lecture_id)
            .collect();
        assert_eq!(ids, vec!["d", "a", "b", "e", "c"]);
    }

    #[tokio::test]
    async fn views_carry_completion_and_enrollment() {
        let store = MemoryStore::new();
        seed_user(&store, "u1", Role::Student).await;
        seed_course(&store, "c1", 2, &["Algorithms"], 4).await;
        seed_course(&store, "c2", 3, &["Operating Systems"], 0).await;
        store.set_enrollment("u1", &["c1".to_string()]).await.unwrap();
        let session = Session::new("u1", Role::Student);

        set_lecture_completion(&store, &session, "c1", "c1-l0", true).await.unwrap();
        set_lecture_completion(&store, &session, "c1", "c1-l3", true).await.unwrap();

        let views = list_courses(&store, &session).await.unwrap();
        assert_eq!(views.len(), 2);
        let c1 = views.iter().find(|v| v.course.course_id == "c1").unwrap();
        assert!(c1.is_enrolled);
        assert_eq!(c1.progress.percent, 50);
        assert_eq!(c1.progress.status, ProgressStatus::InProgress);
        let c2 = views.iter().find(|v| v.course.course_id == "c2").unwrap();
        assert!(!c2.is_enrolled);
        assert_eq!(c2.progress.percent, 0);
        assert_eq!(c2.progress.status, ProgressStatus::NotStarted);

        // Shared lectures stay free of per-user state.
        let stored = store.list_lectures("c1").await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn enrolled_listing_filters_by_status() {
        let store = MemoryStore::new();
        seed_user(&store, "u1", Role::Student).await;
        seed_course(&store, "c1", 2, &["Algorithms"], 1).await;
        seed_course(&store, "c2", 2, &["Algorithms"], 2).await;
        seed_course(&store, "c3", 2, &["Algorithms"], 2).await;
        let ids: Vec<String> = ["c1", "c2", "c3"].iter().map(|s| s.to_string()).collect();
        store.set_enrollment("u1", &ids).await.unwrap();
        let session = Session::new("u1", Role::Student);

        set_lecture_completion(&store, &session, "c1", "c1-l0", true).await.unwrap();
        set_lecture_completion(&store, &session, "c2", "c2-l0", true).await.unwrap();

        let done = list_enrolled_courses(&store, &session, Some(ProgressStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].course.course_id, "c1");

        let summary = learning_summary(&store, &session).await.unwrap();
        assert_eq!(summary.enrolled_courses, 3);
        assert_eq!(summary.completed_lectures, 2);
        assert_eq!(summary.total_lectures, 5);
        assert_eq!((summary.not_started, summary.in_progress, summary.completed), (1, 1, 1));
    }

    #[tokio::test]
    async fn missing_course_is_not_found() {
        let store = MemoryStore::new();
        let err = get_course(&store, &Session::new("u1", Role::Student), "zzz")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn read_failure_is_retryable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = list_courses(&store, &Session::new("u1", Role::Student))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn course_edits_need_admin() {
        let store = MemoryStore::new();
        seed_course(&store, "c1", 2, &["Algorithms"], 2).await;
        let student = Session::new("u1", Role::Student);
        let admin = Session::new("a1", Role::Admin);

        let req = UpdateCourseRequest {
            title: Some("  Advanced Algorithms ".to_string()),
            topics: Some(vec![" Algorithms ".to_string(), "".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            update_course(&store, &student, "c1", req.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        let course = update_course(&store, &admin, "c1", req).await.unwrap();
        assert_eq!(course.title, "Advanced Algorithms");
        assert_eq!(course.topics, vec!["Algorithms".to_string()]);
        assert!(course.updated_at.is_some());

        delete_course(&store, &admin, "c1").await.unwrap();
        assert!(store.get_course("c1").await.unwrap().is_none());
        assert_eq!(store.lecture_count("c1"), 0);
        assert!(matches!(
            delete_course(&store, &admin, "c1").await,
            Err(AppError::NotFound("course", _))
        ));
    }

    #[tokio::test]
    async fn unknown_user_sees_nothing_enrolled() {
        let store = MemoryStore::new();
        seed_course(&store, "c1", 2, &["Algorithms"], 2).await;
        let session = Session::new("ghost", Role::Student);
        assert!(list_enrolled_courses(&store, &session, None).await.unwrap().is_empty());
        assert!(store.get_user("ghost").await.unwrap().is_none());
    }
}
