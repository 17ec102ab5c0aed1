//! Per-course progress aggregation and the lecture completion toggle.

use serde::Serialize;

use crate::catalog::{self, CourseView, LectureView};
use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not-started",
            ProgressStatus::InProgress => "in-progress",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<ProgressStatus> {
        match value {
            "not-started" => Some(ProgressStatus::NotStarted),
            "in-progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub percent: u8,
    pub status: ProgressStatus,
}

impl Progress {
    pub fn from_counts(completed: usize, total: usize) -> Self {
        if total == 0 || completed == 0 {
            return Progress {
                percent: 0,
                status: ProgressStatus::NotStarted,
            };
        }
        let completed = completed.min(total);
        // Integer form of round-half-away-from-zero for non-negative ratios.
        let percent = ((200 * completed + total) / (2 * total)) as u8;
        let status = if completed == total {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        };
        Progress { percent, status }
    }
}

/// Aggregate over an already-annotated lecture list.
pub fn compute_progress(lectures: &[LectureView]) -> Progress {
    let completed = lectures.iter().filter(|l| l.is_completed).count();
    Progress::from_counts(completed, lectures.len())
}

/// Marks or unmarks one lecture for the session's user and returns the refreshed
/// view of that course. Setting a state the lecture already has changes nothing
/// but `lastAccessed`.
pub async fn set_lecture_completion(
    store: &dyn Store,
    session: &Session,
    course_id: &str,
    lecture_id: &str,
    completed: bool,
) -> Result<CourseView> {
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| AppError::not_found("course", course_id))?;
    let lectures = store.list_lectures(course_id).await?;
    if !lectures.iter().any(|l| l.lecture_id == lecture_id) {
        return Err(AppError::not_found("lecture", lecture_id));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let updated = store
        .set_lecture_completed(&session.user_id, course_id, lecture_id, completed, &now)
        .await?;

    tracing::info!(
        user_id = %session.user_id,
        course_id,
        lecture_id,
        completed,
        completed_count = updated.completed_lecture_ids.len(),
        "Lecture completion updated"
    );

    let enrolled = store
        .get_user(&session.user_id)
        .await?
        .map(|u| u.enrolled_courses)
        .unwrap_or_default();

    Ok(catalog::build_view(
        course,
        lectures,
        &updated.completed_lecture_ids,
        &enrolled,
    ))
}
