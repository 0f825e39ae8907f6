//! Data model for the remote archive API.
//!
//! These types mirror the JSON shapes served by kemono-style sites. The
//! engine never paginates the API itself; callers hand it creators, posts,
//! and attachment lists that have already been fetched and filtered.

use serde::Deserialize;

/// A content-publishing entity (channel/user) whose posts are downloaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Creator {
    pub id: String,
    pub name: String,
    pub service: String,
    #[serde(default)]
    pub indexed: f64,
    #[serde(default)]
    pub updated: f64,
    #[serde(default)]
    pub favorited: i64,
}

impl Creator {
    #[must_use]
    pub fn new(service: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Returns the `service:id` pair used to key per-creator settings.
    #[must_use]
    pub fn pair_string(&self) -> String {
        format!("{}:{}", self.service, self.id)
    }
}

/// A remote attachment reference belonging to a post.
///
/// `path` is the server-relative location (which usually embeds the file's
/// content hash), `name` the display name the uploader chose.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct File {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

impl File {
    /// Builds the request URL fragment for this attachment, carrying the
    /// display name as an `f` query parameter so the server suggests it
    /// on download.
    #[must_use]
    pub fn url(&self) -> String {
        let (stem, ext) = split_extension(&self.name);
        let escaped: String = url::form_urlencoded::byte_serialize(stem.as_bytes()).collect();
        format!("{}?f={escaped}{ext}", self.path)
    }

    /// Extracts the content-hash token embedded in the attachment path.
    ///
    /// Archive paths look like `/aa/bb/<sha256-hex>.ext`; the stem of the
    /// final segment is the file's content hash. Returns `None` when the
    /// path is too shallow to carry one, in which case completeness cannot
    /// be verified and the file is always re-downloaded.
    #[must_use]
    pub fn hash_token(&self) -> Option<String> {
        let segment = self.path.split('/').nth(3)?;
        let (stem, _) = split_extension(segment);
        if stem.is_empty() {
            return None;
        }
        Some(stem.to_string())
    }

    /// Tags this file with its ordinal position in the post's work queue.
    #[must_use]
    pub fn with_index(self, index: usize) -> FileWithIndex {
        FileWithIndex { index, file: self }
    }
}

/// A [`File`] plus the zero-based ordinal assigned when a post's
/// attachment list is flattened into a work queue. Naming policies such as
/// `<index>-<name>` key off this ordinal.
#[derive(Debug, Clone)]
pub struct FileWithIndex {
    pub index: usize,
    pub file: File,
}

/// A single content item belonging to a creator.
///
/// Timestamps are kept in the API's string form; the engine only needs
/// the published date for directory naming.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub edited: String,
    #[serde(default)]
    pub added: String,
    #[serde(default)]
    pub file: File,
    #[serde(default)]
    pub attachments: Vec<File>,
    #[serde(default)]
    pub shared_file: bool,
    #[serde(default)]
    pub embed: serde_json::Value,
}

impl Post {
    /// The published date as `YYYYMMDD`, or an empty string when the API
    /// did not provide one.
    #[must_use]
    pub fn published_compact(&self) -> String {
        self.published
            .split('T')
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| *c != '-')
            .collect()
    }
}

/// Flattens an attachment list into an indexed work queue.
///
/// Ordinals are assigned per kind partition: images and non-images are
/// numbered independently, so `0-cover.jpg` and `0-notes.zip` can coexist
/// under index-prefixed naming policies.
#[must_use]
pub fn add_index_to_attachments(attachments: Vec<File>) -> Vec<FileWithIndex> {
    let mut files = Vec::with_capacity(attachments.len());
    let mut images = 0;
    let mut others = 0;
    for attachment in attachments {
        if is_image(&attachment.path) {
            files.push(attachment.with_index(images));
            images += 1;
        } else {
            files.push(attachment.with_index(others));
            others += 1;
        }
    }
    files
}

fn is_image(filename: &str) -> bool {
    let (_, ext) = split_extension(filename);
    matches!(
        ext,
        ".jpg" | ".png" | ".gif" | ".webp" | ".bmp" | ".tiff" | ".svg" | ".ico" | ".jpeg"
            | ".jfif"
    )
}

/// Splits `name.ext` into (`name`, `.ext`); the extension is empty when
/// the final segment carries no dot.
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
