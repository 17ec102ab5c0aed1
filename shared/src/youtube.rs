//! YouTube Data API v3 client behind the `VideoPlatform` port.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::ingestion::{PlaylistItem, PlaylistPage, VideoPlatform};

const PAGE_SIZE: &str = "50";

pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalService(format!(
                "YouTube {} returned {}: {}",
                endpoint, status, body
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItemResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    thumbnails: Option<Thumbnails>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

impl From<PlaylistItemsResponse> for PlaylistPage {
    fn from(response: PlaylistItemsResponse) -> Self {
        let items = response
            .items
            .into_iter()
            .filter_map(|item| item.snippet)
            .map(|snippet| PlaylistItem {
                video_id: snippet.resource_id.and_then(|r| r.video_id),
                title: snippet.title,
                description: snippet.description,
                thumbnail: snippet.thumbnails.and_then(|t| t.default).map(|t| t.url),
            })
            .collect();
        PlaylistPage {
            items,
            next_page_token: response.next_page_token,
        }
    }
}

fn first_duration(response: VideosResponse) -> Option<String> {
    response
        .items
        .into_iter()
        .next()
        .and_then(|v| v.content_details)
        .and_then(|c| c.duration)
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn playlist_page(&self, playlist_id: &str, page_token: Option<String>) -> Result<PlaylistPage> {
        let mut query = vec![
            ("part", "snippet"),
            ("maxResults", PAGE_SIZE),
            ("playlistId", playlist_id),
        ];
        if let Some(token) = page_token.as_deref() {
            query.push(("pageToken", token));
        }
        let response: PlaylistItemsResponse = self.get_json("playlistItems", &query).await?;
        Ok(response.into())
    }

    async fn video_duration(&self, video_id: &str) -> Result<Option<String>> {
        let response: VideosResponse = self
            .get_json("videos", &[("part", "contentDetails"), ("id", video_id)])
            .await?;
        Ok(first_duration(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_response_maps_to_items() {
        let raw = serde_json::json!({
            "nextPageToken": "CAUQAA",
            "items": [
                {
                    "snippet": {
                        "title": "Lecture 1",
                        "description": "Intro",
                        "thumbnails": { "default": { "url": "https://i.ytimg.com/vi/a/default.jpg" } },
                        "resourceId": { "kind": "youtube#video", "videoId": "a" }
                    }
                },
                { "snippet": { "title": "Deleted video", "resourceId": {} } },
                { "id": "no-snippet" }
            ]
        });
        let page: PlaylistPage = serde_json::from_value::<PlaylistItemsResponse>(raw).unwrap().into();
        assert_eq!(page.next_page_token.as_deref(), Some("CAUQAA"));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].video_id.as_deref(), Some("a"));
        assert_eq!(
            page.items[0].thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/a/default.jpg")
        );
        assert_eq!(page.items[1].video_id, None);
    }

    #[test]
    fn missing_video_details_read_as_none() {
        let empty: VideosResponse = serde_json::from_value(serde_json::json!({ "items": [] })).unwrap();
        assert_eq!(first_duration(empty), None);

        let found: VideosResponse = serde_json::from_value(serde_json::json!({
            "items": [{ "contentDetails": { "duration": "PT12M3S" } }]
        }))
        .unwrap();
        assert_eq!(first_duration(found).as_deref(), Some("PT12M3S"));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = YouTubeClient::new("key", "https://www.googleapis.com/youtube/v3/");
        assert_eq!(client.base_url, "https://www.googleapis.com/youtube/v3");
    }
}
