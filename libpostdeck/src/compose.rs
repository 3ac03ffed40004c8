//! Content composition
//!
//! Turns the stored fields of a [`Post`] into the text and media lists sent to
//! every platform. Composition never fails: malformed stored JSON is logged
//! and read as empty.

use serde::Serialize;
use tracing::warn;

use crate::types::Post;

/// An ordered, duplicate-free list of media URLs (possibly empty)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaList(Vec<String>);

impl MediaList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a URL unless it is blank or already present
    pub fn push(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() || self.0.iter().any(|existing| existing == url) {
            return;
        }
        self.0.push(url.to_string());
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> FromIterator<&'a str> for MediaList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut list = MediaList::new();
        for url in iter {
            list.push(url);
        }
        list
    }
}

/// Outbound text and media for one post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComposedContent {
    pub text: String,
    pub images: MediaList,
    pub videos: MediaList,
}

pub fn compose(post: &Post) -> ComposedContent {
    ComposedContent {
        text: compose_text(&post.content, post.hashtags.as_deref()),
        images: merge_media(post.image_url.as_deref(), post.images.as_deref(), "images"),
        videos: merge_media(post.video_url.as_deref(), post.videos.as_deref(), "videos"),
    }
}

/// Post content followed by its hashtags, separated by a single space
pub fn compose_text(content: &str, hashtags: Option<&str>) -> String {
    let content = content.trim();
    let tags = parse_hashtags(hashtags.unwrap_or_default()).join(" ");

    match (content.is_empty(), tags.is_empty()) {
        (_, true) => content.to_string(),
        (true, false) => tags,
        (false, false) => format!("{} {}", content, tags),
    }
}

/// Normalize a stored hashtag field into `#tag` tokens
///
/// Accepts a JSON array of strings or a comma/whitespace separated list.
/// Leading `#` characters are stripped before re-adding exactly one.
pub fn parse_hashtags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<String> = if raw.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Ignoring malformed hashtag array: {}", e);
                Vec::new()
            }
        }
    } else {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(str::to_string)
            .collect()
    };

    let mut tags: Vec<String> = Vec::new();
    for token in tokens {
        let bare = token.trim().trim_start_matches('#').trim();
        if bare.is_empty() {
            continue;
        }
        let tag = format!("#{}", bare);
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Primary URL first, then the stored JSON array, deduplicated
pub fn merge_media(primary: Option<&str>, extra_json: Option<&str>, field: &str) -> MediaList {
    let mut list = MediaList::new();

    if let Some(primary) = primary {
        list.push(primary);
    }

    for url in parse_url_array(extra_json, field) {
        list.push(&url);
    }

    list
}

fn parse_url_array(raw: Option<&str>, field: &str) -> Vec<String> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Vec::new(),
    };

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(url) => Some(url),
                _ => None,
            })
            .collect(),
        // A bare JSON string is a single URL
        Ok(serde_json::Value::String(url)) => vec![url],
        Ok(serde_json::Value::Null) => Vec::new(),
        Ok(other) => {
            warn!("Ignoring {} field with unexpected JSON type: {}", field, other);
            Vec::new()
        }
        Err(e) => {
            warn!("Ignoring malformed {} JSON: {}", field, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_media(
        image_url: Option<&str>,
        images: Option<&str>,
        video_url: Option<&str>,
        videos: Option<&str>,
    ) -> Post {
        let mut post = Post::new("user-1".to_string(), "Launch day".to_string());
        post.image_url = image_url.map(str::to_string);
        post.images = images.map(str::to_string);
        post.video_url = video_url.map(str::to_string);
        post.videos = videos.map(str::to_string);
        post
    }

    #[test]
    fn test_text_without_hashtags() {
        assert_eq!(compose_text("Hello world", None), "Hello world");
        assert_eq!(compose_text("Hello world", Some("")), "Hello world");
    }

    #[test]
    fn test_text_with_comma_separated_hashtags() {
        assert_eq!(
            compose_text("Hello", Some("rust, #async,tokio")),
            "Hello #rust #async #tokio"
        );
    }

    #[test]
    fn test_text_with_json_hashtags() {
        assert_eq!(
            compose_text("Hello", Some(r###"["#rust", "release", "##double"]"###)),
            "Hello #rust #release #double"
        );
    }

    #[test]
    fn test_text_only_hashtags() {
        assert_eq!(compose_text("  ", Some("one two")), "#one #two");
    }

    #[test]
    fn test_hashtags_deduplicated() {
        assert_eq!(parse_hashtags("rust,#rust, rust"), vec!["#rust"]);
    }

    #[test]
    fn test_malformed_hashtag_json_is_ignored() {
        assert!(parse_hashtags("[\"rust\"").is_empty());
    }

    #[test]
    fn test_primary_image_first_and_deduplicated() {
        let post = post_with_media(Some("a.png"), Some(r#"["a.png","b.png"]"#), None, None);
        let composed = compose(&post);

        assert_eq!(composed.images.as_slice(), ["a.png", "b.png"]);
        assert_eq!(composed.images.first(), Some("a.png"));
    }

    #[test]
    fn test_array_order_preserved_first_occurrence_wins() {
        let post = post_with_media(
            Some("c.png"),
            Some(r#"["a.png","c.png","b.png","a.png"]"#),
            None,
            None,
        );
        assert_eq!(compose(&post).images.as_slice(), ["c.png", "a.png", "b.png"]);
    }

    #[test]
    fn test_invalid_images_json_keeps_primary() {
        let post = post_with_media(Some("hero.png"), Some("not json ["), None, None);
        let composed = compose(&post);

        assert_eq!(composed.images.as_slice(), ["hero.png"]);
    }

    #[test]
    fn test_invalid_images_json_without_primary_is_empty() {
        let post = post_with_media(None, Some("{{"), None, None);
        assert!(compose(&post).images.is_empty());
    }

    #[test]
    fn test_non_string_array_entries_skipped() {
        let post = post_with_media(None, Some(r#"["a.png", 3, null, "", "b.png"]"#), None, None);
        assert_eq!(compose(&post).images.as_slice(), ["a.png", "b.png"]);
    }

    #[test]
    fn test_videos_symmetric_with_images() {
        let post = post_with_media(None, None, Some("v1.mp4"), Some(r#"["v2.mp4","v1.mp4"]"#));
        let composed = compose(&post);

        assert_eq!(composed.videos.as_slice(), ["v1.mp4", "v2.mp4"]);
        assert!(composed.images.is_empty());
    }

    #[test]
    fn test_no_media_at_all() {
        let composed = compose(&post_with_media(None, None, None, None));
        assert!(composed.images.is_empty());
        assert!(composed.videos.is_empty());
        assert_eq!(composed.images.first(), None);
    }

    #[test]
    fn test_composition_is_idempotent() {
        let post = post_with_media(
            Some("a.png"),
            Some(r#"["b.png","a.png"]"#),
            Some("v.mp4"),
            Some("garbage"),
        );
        assert_eq!(compose(&post), compose(&post));
    }

    #[test]
    fn test_media_list_push_ignores_blank_and_duplicates() {
        let list: MediaList = ["a", " ", "a", "b "].into_iter().collect();
        assert_eq!(list.as_slice(), ["a", "b"]);
        assert_eq!(list.len(), 2);
    }
}
