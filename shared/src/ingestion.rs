//! Admin course creation from a video playlist.
//!
//! Everything is fetched and validated first. The store is only called once the
//! whole course is known, and its `create_course` is all-or-nothing, so a
//! failure at any point leaves no trace in the catalog.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::enrollment::clean_topics;
use crate::error::{AppError, Result};
use crate::session::Session;
use crate::store::Store;
use crate::types::{Course, CreateCourseRequest, Lecture, Year};

/// Upper bound on playlist pages, so a misbehaving continuation token cannot loop forever.
const MAX_PAGES: usize = 100;

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("valid duration regex")
});

static PLAYLIST_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid playlist id regex"));

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaylistItem {
    pub video_id: Option<String>,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistItem>,
    pub next_page_token: Option<String>,
}

/// The third-party video platform the catalog is ingested from.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// One page of playlist items. `page_token` is `None` for the first page.
    async fn playlist_page(&self, playlist_id: &str, page_token: Option<String>) -> Result<PlaylistPage>;
    /// ISO-8601 duration of one video, or `None` when the platform has no details for it.
    async fn video_duration(&self, video_id: &str) -> Result<Option<String>>;
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Reads the `list` query parameter of a playlist URL.
pub fn extract_playlist_id(playlist_url: &str) -> Result<String> {
    let invalid = || AppError::InvalidPlaylistUrl(playlist_url.to_string());
    let parsed = url::Url::parse(playlist_url.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
        .filter(|id| PLAYLIST_ID.is_match(id))
        .ok_or_else(invalid)
}

/// Total seconds of an ISO-8601 duration such as `PT1H5M30S` or `P1DT2M`.
pub fn parse_iso_duration(raw: &str) -> Result<u64> {
    let invalid = || AppError::InvalidDuration(raw.to_string());
    let caps = ISO_DURATION.captures(raw.trim()).ok_or_else(invalid)?;
    if (1..=4).all(|i| caps.get(i).is_none()) {
        return Err(invalid());
    }

    let part = |i: usize| -> Result<u64> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
            .unwrap_or(Ok(0))
    };
    let days = part(1)?;
    let hours = part(2)?;
    let minutes = part(3)?;
    let seconds = part(4)?;

    days.checked_mul(86_400)
        .and_then(|d| d.checked_add(hours.checked_mul(3_600)?))
        .and_then(|t| t.checked_add(minutes.checked_mul(60)?))
        .and_then(|t| t.checked_add(seconds))
        .ok_or_else(invalid)
}

/// `H:MM:SS` when there is at least one hour, `M:SS` otherwise.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Walks every page of the playlist and builds lectures in playlist order.
/// Items without a video id or without details are skipped, and a repeated
/// video keeps its first position.
async fn fetch_lectures(videos: &dyn VideoPlatform, playlist_id: &str) -> Result<Vec<Lecture>> {
    let mut lectures = Vec::new();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    for page_number in 1..=MAX_PAGES {
        let page = videos.playlist_page(playlist_id, page_token.take()).await?;
        tracing::debug!(playlist_id, page_number, items = page.items.len(), "Fetched playlist page");

        for item in page.items {
            let video_id = match item.video_id.filter(|id| !id.is_empty()) {
                Some(id) => id,
                None => continue,
            };
            if seen.contains(&video_id) {
                tracing::debug!(video_id, "Skipping repeated playlist entry");
                continue;
            }
            let raw_duration = match videos.video_duration(&video_id).await? {
                Some(d) => d,
                None => {
                    tracing::warn!(video_id, "No details for playlist video, skipping");
                    continue;
                }
            };
            let duration = format_duration(parse_iso_duration(&raw_duration)?);

            lectures.push(Lecture {
                video_url: watch_url(&video_id),
                lecture_id: video_id.clone(),
                title: item.title,
                description: item.description,
                duration,
                order: Some(lectures.len() as u32),
                thumbnail: item.thumbnail,
            });
            seen.insert(video_id);
        }

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => return Ok(lectures),
        }
    }

    Err(AppError::ExternalService(format!(
        "playlist {} still had pages after {} requests",
        playlist_id, MAX_PAGES
    )))
}

pub async fn create_course_from_playlist(
    store: &dyn Store,
    videos: &dyn VideoPlatform,
    session: &Session,
    req: CreateCourseRequest,
) -> Result<Course> {
    session.require_admin()?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("course title is required"));
    }
    let year = Year::try_from(req.year.ok_or_else(|| AppError::validation("course year is required"))?)?;
    if req.playlist_url.trim().is_empty() {
        return Err(AppError::validation("playlist URL is required"));
    }
    let playlist_id = extract_playlist_id(&req.playlist_url)?;

    let lectures = fetch_lectures(videos, &playlist_id).await?;
    if lectures.is_empty() {
        return Err(AppError::validation(format!(
            "playlist {} has no playable videos",
            playlist_id
        )));
    }

    let thumbnail = req
        .thumbnail
        .filter(|t| !t.trim().is_empty())
        .or_else(|| lectures.first().and_then(|l| l.thumbnail.clone()));

    let course = Course {
        course_id: uuid::Uuid::new_v4().to_string(),
        title,
        description: req.description,
        category: req.category.trim().to_string(),
        year,
        topics: clean_topics(&req.topics),
        lectures_order: lectures.iter().map(|l| l.lecture_id.clone()).collect(),
        total_lectures: lectures.len() as u32,
        thumbnail,
        created_at: chrono::Utc::now().to_rfc3339(),
        updated_at: None,
    };

    store.create_course(&course, &lectures).await?;
    tracing::info!(
        course_id = %course.course_id,
        playlist_id,
        lectures = lectures.len(),
        admin = %session.user_id,
        "Course created from playlist"
    );
    Ok(course)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CatalogStore, MemoryStore};
    use crate::types::Role;
    use mockall::predicate::eq;

    fn admin() -> Session {
        Session::new("admin-1", Role::Admin)
    }

    fn request() -> CreateCourseRequest {
        CreateCourseRequest {
            playlist_url: "https://www.youtube.com/playlist?list=PLabc123".to_string(),
            title: "Operating Systems".to_string(),
            year: Some(3),
            topics: vec!["Operating Systems".to_string()],
            ..Default::default()
        }
    }

    fn item(video_id: Option<&str>) -> PlaylistItem {
        PlaylistItem {
            video_id: video_id.map(str::to_string),
            title: format!("Video {}", video_id.unwrap_or("?")),
            description: String::new(),
            thumbnail: video_id.map(|id| format!("https://i.ytimg.com/vi/{}/default.jpg", id)),
        }
    }

    #[test]
    fn durations_render_like_a_player() {
        assert_eq!(format_duration(parse_iso_duration("PT1H5M30S").unwrap()), "1:05:30");
        assert_eq!(format_duration(parse_iso_duration("PT4M7S").unwrap()), "4:07");
        assert_eq!(format_duration(parse_iso_duration("PT45S").unwrap()), "0:45");
        assert_eq!(format_duration(parse_iso_duration("PT2H").unwrap()), "2:00:00");
        assert_eq!(format_duration(parse_iso_duration("P1DT1M").unwrap()), "24:01:00");
    }

    #[test]
    fn malformed_durations_are_rejected() {
        for raw in ["", "P", "PT", "1H5M", "PT5X", "garbage"] {
            assert!(
                matches!(parse_iso_duration(raw), Err(AppError::InvalidDuration(_))),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn playlist_id_comes_from_list_parameter() {
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=xyz&list=PL_a-1").unwrap(),
            "PL_a-1"
        );
        for bad in [
            "https://www.youtube.com/watch?v=xyz",
            "https://www.youtube.com/playlist?list=",
            "not a url",
            "ftp://youtube.com/playlist?list=PL1",
        ] {
            assert!(matches!(extract_playlist_id(bad), Err(AppError::InvalidPlaylistUrl(_))));
        }
    }

    #[tokio::test]
    async fn builds_ordered_lectures_across_pages() {
        let store = MemoryStore::new();
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_playlist_page()
            .with(eq("PLabc123"), eq(None::<String>))
            .returning(|_, _| {
                Ok(PlaylistPage {
                    items: vec![item(Some("v1")), item(None), item(Some("v2"))],
                    next_page_token: Some("p2".to_string()),
                })
            });
        videos
            .expect_playlist_page()
            .with(eq("PLabc123"), eq(Some("p2".to_string())))
            .returning(|_, _| {
                Ok(PlaylistPage {
                    items: vec![item(Some("v1")), item(Some("gone")), item(Some("v3"))],
                    next_page_token: None,
                })
            });
        videos.expect_video_duration().returning(|id| {
            Ok(match id {
                "gone" => None,
                "v1" => Some("PT1H5M30S".to_string()),
                _ => Some("PT9M2S".to_string()),
            })
        });

        let course = create_course_from_playlist(&store, &videos, &admin(), request())
            .await
            .unwrap();

        assert_eq!(course.lectures_order, vec!["v1", "v2", "v3"]);
        assert_eq!(course.total_lectures, 3);
        let lectures = store.list_lectures(&course.course_id).await.unwrap();
        let v1 = lectures.iter().find(|l| l.lecture_id == "v1").unwrap();
        assert_eq!(v1.duration, "1:05:30");
        assert_eq!(v1.video_url, "https://www.youtube.com/watch?v=v1");
        assert_eq!(v1.order, Some(0));
        let v3 = lectures.iter().find(|l| l.lecture_id == "v3").unwrap();
        assert_eq!(v3.order, Some(2));
        assert_eq!(
            course.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/v1/default.jpg")
        );
    }

    #[tokio::test]
    async fn failure_midway_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_playlist_page()
            .with(eq("PLabc123"), eq(None::<String>))
            .returning(|_, _| {
                Ok(PlaylistPage {
                    items: vec![item(Some("v1"))],
                    next_page_token: Some("p2".to_string()),
                })
            });
        videos
            .expect_playlist_page()
            .with(eq("PLabc123"), eq(Some("p2".to_string())))
            .returning(|_, _| Err(AppError::ExternalService("quota exceeded".to_string())));
        videos
            .expect_video_duration()
            .returning(|_| Ok(Some("PT3M".to_string())));

        let err = create_course_from_playlist(&store, &videos, &admin(), request())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.list_courses().await.unwrap().is_empty());
        assert_eq!(store.total_lectures(), 0);
    }

    #[tokio::test]
    async fn malformed_duration_aborts() {
        let store = MemoryStore::new();
        let mut videos = MockVideoPlatform::new();
        videos.expect_playlist_page().returning(|_, _| {
            Ok(PlaylistPage {
                items: vec![item(Some("v1")), item(Some("v2"))],
                next_page_token: None,
            })
        });
        videos.expect_video_duration().returning(|id| {
            Ok(Some(if id == "v2" { "3 minutes" } else { "PT3M" }.to_string()))
        });

        let err = create_course_from_playlist(&store, &videos, &admin(), request())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDuration(_)));
        assert!(store.list_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_happens_before_any_fetch() {
        let store = MemoryStore::new();
        // No expectations: any call to the platform fails the test.
        let videos = MockVideoPlatform::new();

        let mut no_title = request();
        no_title.title = "  ".to_string();
        let mut no_year = request();
        no_year.year = None;
        let mut bad_year = request();
        bad_year.year = Some(9);
        let mut bad_url = request();
        bad_url.playlist_url = "https://www.youtube.com/watch?v=abc".to_string();

        for (req, expect_status) in [(no_title, 400), (no_year, 400), (bad_year, 400), (bad_url, 400)] {
            let err = create_course_from_playlist(&store, &videos, &admin(), req)
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), expect_status);
        }

        let err = create_course_from_playlist(&store, &videos, &Session::new("s1", Role::Student), request())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn runaway_pagination_is_cut_off() {
        let store = MemoryStore::new();
        let mut videos = MockVideoPlatform::new();
        videos.expect_playlist_page().times(MAX_PAGES).returning(|_, _| {
            Ok(PlaylistPage {
                items: Vec::new(),
                next_page_token: Some("again".to_string()),
            })
        });

        let err = create_course_from_playlist(&store, &videos, &admin(), request())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
