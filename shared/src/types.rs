use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::AppError;

// ========== ROLE ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    /// Unknown or missing roles fall back to student.
    pub fn parse(value: &str) -> Role {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }
}

// ========== ACADEMIC YEAR ==========
/// Academic year of study, 1 through 4
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Year(u8);

impl Year {
    pub const ALL: [Year; 4] = [Year(1), Year(2), Year(3), Year(4)];

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Year {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=4).contains(&value) {
            Ok(Year(value))
        } else {
            Err(AppError::validation(format!(
                "year must be between 1 and 4, got {}",
                value
            )))
        }
    }
}

impl From<Year> for u8 {
    fn from(year: Year) -> u8 {
        year.0
    }
}

impl std::fmt::Display for Year {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    /// Cache derived from profile and catalog; rewritten whole on every profile save.
    pub enrolled_courses: Vec<String>,
    pub profile_completed: bool,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// ========== PROFILE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub phone: String,
    pub year: Year,
    pub topics: Vec<String>,
    pub image_url: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub phone: Option<String>,
    pub year: Option<u8>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddTopicsRequest {
    pub topics: Vec<String>,
}

// ========== COURSE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub year: Year,
    pub topics: Vec<String>,
    /// Canonical lecture ordering.
    pub lectures_order: Vec<String>,
    pub total_lectures: u32,
    pub thumbnail: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub playlist_url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub year: Option<u8>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub year: Option<u8>,
    pub topics: Option<Vec<String>>,
    pub thumbnail: Option<String>,
}

// ========== LECTURE ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
    pub lecture_id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    /// Rendered as `H:MM:SS` or `M:SS`
    pub duration: String,
    /// Zero-based position at ingestion; only consulted when `lectures_order` lacks the id.
    pub order: Option<u32>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub completed: bool,
}

// ========== PROGRESS ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub completed_lecture_ids: BTreeSet<String>,
    pub last_accessed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    pub courses: BTreeMap<String, CourseProgress>,
}

impl UserProgress {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            courses: BTreeMap::new(),
        }
    }

    pub fn is_completed(&self, course_id: &str, lecture_id: &str) -> bool {
        self.courses
            .get(course_id)
            .map(|p| p.completed_lecture_ids.contains(lecture_id))
            .unwrap_or(false)
    }
}

// ========== BLOG ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub blog_id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub read_time: String,
    /// Publication date, `YYYY-MM-DD`
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub read_time: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogRequest {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub read_time: Option<String>,
}

// ========== RESOURCE ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceType {
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "Video")]
    Video,
    #[default]
    #[serde(rename = "Link")]
    Link,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Pdf => "PDF",
            ResourceType::Video => "Video",
            ResourceType::Link => "Link",
        }
    }

    pub fn parse(value: &str) -> Option<ResourceType> {
        match value {
            "PDF" => Some(ResourceType::Pdf),
            "Video" => Some(ResourceType::Video),
            "Link" => Some(ResourceType::Link),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
}
