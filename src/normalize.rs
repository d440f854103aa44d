//! Maps the upstream item shapes onto [`NormalizedVideo`].
//!
//! Search results, video listings and playlist items nest the video id and
//! channel fields in different places. Everything here is pure: an item
//! without a usable id yields `None` and the batch carries on without it.

use crate::models::{NormalizedVideo, VideoStatistics};
use chrono::{DateTime, Utc};
use serde_json::Value;
use url::Url;

/// Which listing an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Search,
    Video,
    PlaylistItem,
}

// Highest resolution first
const THUMBNAIL_PREFERENCE: [&str; 4] = ["maxres", "high", "medium", "default"];

pub fn normalize(raw: &Value, kind: SourceKind) -> Option<NormalizedVideo> {
    let id = extract_id(raw, kind)?;

    let (channel_name, channel_id) = match kind {
        SourceKind::PlaylistItem => (
            first_str(raw, &["/snippet/videoOwnerChannelTitle", "/snippet/channelTitle"]),
            first_str(raw, &["/snippet/videoOwnerChannelId", "/snippet/channelId"]),
        ),
        SourceKind::Search | SourceKind::Video => (
            first_str(raw, &["/snippet/channelTitle", "/channelTitle"]),
            first_str(raw, &["/snippet/channelId", "/channelId"]),
        ),
    };

    let published = match kind {
        SourceKind::PlaylistItem => first_str(
            raw,
            &["/contentDetails/videoPublishedAt", "/snippet/publishedAt"],
        ),
        SourceKind::Search | SourceKind::Video => {
            first_str(raw, &["/snippet/publishedAt", "/publishedAt"])
        }
    };

    let thumbnail_url = raw
        .pointer("/snippet/thumbnails")
        .or_else(|| raw.get("thumbnails"))
        .and_then(best_thumbnail);

    Some(NormalizedVideo {
        id,
        title: first_str(raw, &["/snippet/title", "/title"]).unwrap_or_default(),
        channel_name: channel_name.unwrap_or_default(),
        channel_id: channel_id.unwrap_or_default(),
        thumbnail_url,
        published_at: published.as_deref().and_then(parse_timestamp),
        statistics: raw.get("statistics").and_then(parse_statistics),
    })
}

// Normalizes `payload.items`, dropping whatever has no id
pub fn normalize_items(payload: &Value, kind: SourceKind) -> Vec<NormalizedVideo> {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| normalize(item, kind))
                .collect()
        })
        .unwrap_or_default()
}

/// Finds the video id wherever this item shape keeps it.
///
/// Accepted shapes: a bare id string, `{id: "..."}`, `{videoId: "..."}`,
/// `{id: {videoId: "..."}}`, a watch / short link under `url`, and for
/// playlist items `snippet.resourceId.videoId` or `contentDetails.videoId`.
pub fn extract_id(raw: &Value, kind: SourceKind) -> Option<String> {
    let found = match raw {
        Value::String(s) => id_from_text(s),
        Value::Object(_) => {
            let playlist = match kind {
                SourceKind::PlaylistItem => first_str(
                    raw,
                    &["/snippet/resourceId/videoId", "/contentDetails/videoId"],
                ),
                _ => None,
            };

            playlist
                .or_else(|| match raw.get("id") {
                    Some(Value::String(id)) => Some(id.clone()),
                    Some(nested @ Value::Object(_)) => first_str(nested, &["/videoId"]),
                    _ => None,
                })
                .or_else(|| first_str(raw, &["/videoId"]))
                .or_else(|| raw.get("url").and_then(Value::as_str).and_then(id_from_url))
        }
        _ => None,
    };

    found
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn id_from_text(text: &str) -> Option<String> {
    if text.contains("://") {
        id_from_url(text)
    } else {
        Some(text.to_string())
    }
}

fn id_from_url(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;

    if url.host_str() == Some("youtu.be") {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    url.query_pairs()
        .find(|(name, _)| name == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

pub fn best_thumbnail(thumbnails: &Value) -> Option<String> {
    THUMBNAIL_PREFERENCE.iter().find_map(|size| {
        thumbnails
            .get(*size)
            .and_then(|t| t.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    })
}

fn parse_statistics(stats: &Value) -> Option<VideoStatistics> {
    if !stats.is_object() {
        return None;
    }

    Some(VideoStatistics {
        view_count: stats.get("viewCount").and_then(parse_count),
        like_count: stats.get("likeCount").and_then(parse_count),
    })
}

// The API sends counts as strings
fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn first_str(raw: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| raw.pointer(p).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_supported_id_shape_yields_the_id() {
        let shapes = [
            json!("abc"),
            json!({ "videoId": "abc" }),
            json!({ "id": { "videoId": "abc" } }),
            json!({ "url": "https://x?v=abc" }),
        ];
        for shape in shapes {
            let video = normalize(&shape, SourceKind::Search)
                .unwrap_or_else(|| panic!("no id for {}", shape));
            assert_eq!(video.id, "abc");
        }
    }

    #[test]
    fn item_without_id_is_dropped() {
        assert!(normalize(&json!({ "snippet": { "title": "x" } }), SourceKind::Video).is_none());
        assert!(normalize(&json!({ "id": "" }), SourceKind::Video).is_none());
        assert!(normalize(&json!({ "url": "https://x/watch" }), SourceKind::Video).is_none());
        assert!(normalize(&json!(42), SourceKind::Video).is_none());
        // channel hit in a search listing
        let channel = json!({ "id": { "kind": "youtube#channel", "channelId": "UC1" } });
        assert!(normalize(&channel, SourceKind::Search).is_none());
    }

    #[test]
    fn short_links_are_understood() {
        assert_eq!(
            extract_id(&json!("https://youtu.be/xyz987"), SourceKind::Video).as_deref(),
            Some("xyz987")
        );
    }

    #[test]
    fn video_listing_item() {
        let item = json!({
            "id": "vid1",
            "snippet": {
                "title": "Title",
                "channelTitle": "Chan",
                "channelId": "UC123",
                "publishedAt": "2024-03-01T12:00:00Z",
                "thumbnails": {
                    "default": { "url": "d.jpg" },
                    "medium": { "url": "m.jpg" },
                    "high": { "url": "h.jpg" }
                }
            },
            "statistics": { "viewCount": "1200", "likeCount": "34" }
        });

        let video = normalize(&item, SourceKind::Video).unwrap();
        assert_eq!(video.title, "Title");
        assert_eq!(video.channel_name, "Chan");
        assert_eq!(video.channel_id, "UC123");
        assert_eq!(video.thumbnail_url.as_deref(), Some("h.jpg"));
        assert_eq!(
            video.published_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-03-01T12:00:00+00:00")
        );
        assert_eq!(
            video.statistics,
            Some(VideoStatistics {
                view_count: Some(1200),
                like_count: Some(34),
            })
        );
    }

    #[test]
    fn playlist_item_uses_resource_id_and_owner_channel() {
        let item = json!({
            "id": "UExPTEFZTElTVElURU0",
            "snippet": {
                "title": "In a playlist",
                "channelTitle": "Playlist Owner",
                "channelId": "UCowner",
                "videoOwnerChannelTitle": "Uploader",
                "videoOwnerChannelId": "UCuploader",
                "resourceId": { "kind": "youtube#video", "videoId": "real-id" }
            },
            "contentDetails": { "videoId": "real-id" }
        });

        let video = normalize(&item, SourceKind::PlaylistItem).unwrap();
        assert_eq!(video.id, "real-id");
        assert_eq!(video.channel_name, "Uploader");
        assert_eq!(video.channel_id, "UCuploader");
        assert!(video.statistics.is_none());
    }

    #[test]
    fn thumbnail_preference_order() {
        let all = json!({
            "default": { "url": "d" },
            "maxres": { "url": "max" },
            "high": { "url": "h" }
        });
        assert_eq!(best_thumbnail(&all).as_deref(), Some("max"));
        assert_eq!(
            best_thumbnail(&json!({ "default": { "url": "d" } })).as_deref(),
            Some("d")
        );
        assert_eq!(best_thumbnail(&json!({})), None);
    }

    #[test]
    fn batch_skips_bad_items() {
        let payload = json!({
            "items": [
                { "id": { "videoId": "a" } },
                { "id": { "channelId": "UC1" } },
                { "id": { "videoId": "b" } }
            ]
        });
        let ids: Vec<String> = normalize_items(&payload, SourceKind::Search)
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(normalize_items(&json!({}), SourceKind::Search).is_empty());
    }
}
