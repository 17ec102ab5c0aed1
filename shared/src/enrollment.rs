//! Matching a student's year and topics against the catalog, and the profile
//! writes that keep `enrolledCourses` in step with it.
//!
//! Topics compare case-insensitively after trimming, both here and wherever a
//! topic list is cleaned before storage.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;
use crate::types::{Course, Profile, ProfileInput, Year};

/// Suggested topics offered per academic year.
const YEAR_1_TOPICS: &[&str] = &[
    "Introduction to Computing",
    "Calculus I",
    "Principles of Management",
    "Electrical Circuits",
    "Electronics",
    "Computer Programming II (Java)",
    "Calculus II",
    "Technical Writing Skills",
    "Introduction to Engineering",
];

const YEAR_2_TOPICS: &[&str] = &[
    "Introduction to Software Engineering",
    "Data Structures",
    "Discrete Mathematics",
    "Global Network Technology",
    "Computer Programming II",
    "Digital Logic Design",
    "Computer Organization and Assembly Language",
    "Software Requirements Engineering",
    "Advanced Programming (Python)",
    "Algorithms",
    "Principles of Statistics",
    "Linear Algebra",
    "Systems Analysis",
];

const YEAR_3_TOPICS: &[&str] = &[
    "Operating Systems",
    "Automata Theory",
    "Computer Networks",
    "Web Application Development",
    "Web Page Design",
    "Computer Graphics",
    "Database Systems",
    "Linear Algebra",
];

const YEAR_4_TOPICS: &[&str] = &[
    "Information Security",
    "Artificial Intelligence",
    "Software Project Management",
    "Advanced Software Design",
    "Human-Computer Interaction",
];

pub fn topics_for_year(year: Year) -> &'static [&'static str] {
    match year.get() {
        1 => YEAR_1_TOPICS,
        2 => YEAR_2_TOPICS,
        3 => YEAR_3_TOPICS,
        _ => YEAR_4_TOPICS,
    }
}

pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

/// Trims every topic, drops blanks and keeps the first spelling of each
/// case-insensitive duplicate.
pub fn clean_topics<I, S>(topics: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for topic in topics {
        let trimmed = topic.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(normalize_topic(trimmed)) {
            cleaned.push(trimmed.to_string());
        }
    }
    cleaned
}

/// Ids of courses in `year` sharing at least one topic with `topics`, in catalog order.
pub fn match_courses(courses: &[Course], year: Year, topics: &[String]) -> Vec<String> {
    let wanted: HashSet<String> = topics.iter().map(|t| normalize_topic(t)).collect();
    if wanted.is_empty() {
        return Vec::new();
    }
    courses
        .iter()
        .filter(|c| c.year == year)
        .filter(|c| c.topics.iter().any(|t| wanted.contains(&normalize_topic(t))))
        .map(|c| c.course_id.clone())
        .collect()
}

/// Recomputes the user's enrollment from scratch and replaces the stored list.
pub async fn recompute_enrollment(
    store: &dyn Store,
    user_id: &str,
    year: Year,
    topics: &[String],
) -> Result<Vec<String>> {
    let courses = store.list_courses().await?;
    let matched = match_courses(&courses, year, topics);
    store.set_enrollment(user_id, &matched).await?;
    tracing::info!(user_id, year = year.get(), enrolled = matched.len(), "Enrollment recomputed");
    Ok(matched)
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub profile: Profile,
    pub enrolled_courses: Vec<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum EnrollmentState {
    NoProfile,
    ProfileIncomplete,
    #[serde(rename_all = "camelCase")]
    ProfileComplete { enrolled_courses: Vec<String> },
}

fn validate_image_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| AppError::validation(format!("imageUrl is not a valid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(AppError::validation(format!("imageUrl scheme {} is not allowed", other))),
    }
}

/// Persists the profile together with its freshly matched enrollment in one write.
async fn save_profile(store: &dyn Store, profile: Profile) -> Result<ProfileUpdate> {
    let courses = store.list_courses().await?;
    let enrolled_courses = match_courses(&courses, profile.year, &profile.topics);
    store
        .save_profile_with_enrollment(&profile, &enrolled_courses)
        .await?;
    tracing::info!(
        user_id = %profile.user_id,
        year = profile.year.get(),
        topics = profile.topics.len(),
        enrolled = enrolled_courses.len(),
        "Profile saved"
    );
    Ok(ProfileUpdate {
        profile,
        enrolled_courses,
    })
}

/// Creates or replaces the caller's profile. Validation happens before any store access.
pub async fn complete_profile(store: &dyn Store, session: &Session, input: ProfileInput) -> Result<ProfileUpdate> {
    let phone = input.phone.as_deref().map(str::trim).unwrap_or_default();
    if phone.is_empty() {
        return Err(AppError::validation("phone is required"));
    }
    let year = Year::try_from(input.year.ok_or_else(|| AppError::validation("year is required"))?)?;
    let topics = clean_topics(&input.topics);
    if topics.is_empty() {
        return Err(AppError::validation("select at least one topic"));
    }
    let new_image = input
        .image_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .map(validate_image_url)
        .transpose()?;

    let image_url = match new_image {
        Some(url) => Some(url),
        None => store
            .get_profile(&session.user_id)
            .await?
            .and_then(|p| p.image_url),
    };

    let profile = Profile {
        user_id: session.user_id.clone(),
        phone: phone.to_string(),
        year,
        topics,
        image_url,
        updated_at: chrono::Utc::now().to_rfc3339(),
    };
    save_profile(store, profile).await
}

/// Adds interest topics to a completed profile and re-enrolls.
pub async fn add_topics(store: &dyn Store, session: &Session, topics: Vec<String>) -> Result<ProfileUpdate> {
    let additions = clean_topics(&topics);
    if additions.is_empty() {
        return Err(AppError::validation("select at least one topic"));
    }
    let mut profile = store
        .get_profile(&session.user_id)
        .await?
        .ok_or_else(|| AppError::validation("complete your profile before adding topics"))?;

    profile.topics = clean_topics(profile.topics.iter().chain(additions.iter()));
    profile.updated_at = chrono::Utc::now().to_rfc3339();
    save_profile(store, profile).await
}

pub async fn get_profile(store: &dyn Store, session: &Session) -> Result<Profile> {
    store
        .get_profile(&session.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("profile", session.user_id.clone()))
}

/// `NoProfile` until a profile is stored. A stored profile whose user record is
/// missing or not yet flagged as completed reads as `ProfileIncomplete`.
pub async fn enrollment_state(store: &dyn Store, session: &Session) -> Result<EnrollmentState> {
    if store.get_profile(&session.user_id).await?.is_none() {
        return Ok(EnrollmentState::NoProfile);
    }
    match store.get_user(&session.user_id).await? {
        Some(user) if user.profile_completed => Ok(EnrollmentState::ProfileComplete {
            enrolled_courses: user.enrolled_courses,
        }),
        _ => Ok(EnrollmentState::ProfileIncomplete),
    }
}
