//! Save-path policy and directory-name sanitization.
//!
//! The engine treats output-path computation as a caller-supplied black
//! box ([`SavePathFn`]); this module provides the default policy and the
//! sanitization helpers it is built from.

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{Creator, File, Post, split_extension};

/// Resolves the absolute destination path for one attachment.
///
/// Pure function of (creator, post, ordinal, file); must not touch the
/// filesystem.
pub type SavePathFn = Arc<dyn Fn(&Creator, &Post, usize, &File) -> PathBuf + Send + Sync>;

/// Maximum length of a single sanitized path entry.
const MAX_ENTRY_LEN: usize = 200;

/// Default save-path policy: `./download/<creator>/<post dir>/<file>`.
///
/// The on-disk file name prefers the uploader's display name for zip
/// archives (hash-named zips are useless to humans) and the hash-named
/// server path otherwise, so unchanged files keep stable names across
/// runs.
#[must_use]
pub fn default_save_path(creator: &Creator, post: &Post, _index: usize, file: &File) -> PathBuf {
    let (_, mut ext) = split_extension(&file.name);
    if ext.is_empty() {
        ext = split_extension(&file.path).1;
    }
    let name = if ext == ".zip" {
        file.name.clone()
    } else {
        base_name(&file.path).to_string()
    };
    PathBuf::from("./download")
        .join(sanitize_entry(&creator.name))
        .join(sanitize_entry(&post_directory_name(post)))
        .join(sanitize_entry(&name))
}

/// Formats the per-post directory name: `[YYYYMMDD] [id] title`.
#[must_use]
pub fn post_directory_name(post: &Post) -> String {
    format!("[{}] [{}] {}", post.published_compact(), post.id, post.title)
}

/// Replaces characters that are invalid in a directory entry, trims
/// whitespace, and caps the length.
///
/// On Windows the reserved set is larger and a trailing dot is illegal;
/// on other platforms a leading dot would hide the entry, so it is
/// shifted behind an underscore.
#[must_use]
pub fn sanitize_entry(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if cfg!(windows) {
        sanitize_windows(name)
    } else {
        sanitize_unix(name)
    }
}

fn sanitize_windows(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    let mut entry = truncate_chars(mapped.trim(), MAX_ENTRY_LEN);
    if entry.ends_with('.') {
        entry.pop();
        entry.push('_');
    }
    entry
}

fn sanitize_unix(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | '\n' | '\r' | '\t') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let entry = truncate_chars(mapped.trim(), MAX_ENTRY_LEN);
    match entry.strip_prefix('.') {
        Some(rest) => format!("_{rest}"),
        None => entry,
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        Post {
            id: "555".to_string(),
            title: "rough sketches".to_string(),
            published: "2022-11-30T00:00:00".to_string(),
            ..Post::default()
        }
    }

    #[test]
    fn test_post_directory_name_format() {
        assert_eq!(
            post_directory_name(&sample_post()),
            "[20221130] [555] rough sketches"
        );
    }

    #[test]
    fn test_default_save_path_uses_hash_name_for_images() {
        let creator = Creator {
            name: "artist".to_string(),
            ..Creator::default()
        };
        let file = File {
            name: "cover art.png".to_string(),
            path: "/1a/2b/deadbeef.png".to_string(),
        };
        let path = default_save_path(&creator, &sample_post(), 0, &file);
        assert_eq!(
            path,
            PathBuf::from("./download/artist/[20221130] [555] rough sketches/deadbeef.png")
        );
    }

    #[test]
    fn test_default_save_path_keeps_display_name_for_zip() {
        let creator = Creator {
            name: "artist".to_string(),
            ..Creator::default()
        };
        let file = File {
            name: "pack.zip".to_string(),
            path: "/3c/4d/cafebabe.zip".to_string(),
        };
        let path = default_save_path(&creator, &sample_post(), 0, &file);
        assert!(path.ends_with("pack.zip"), "got {}", path.display());
    }

    #[test]
    fn test_default_save_path_extension_falls_back_to_path() {
        let creator = Creator::default();
        let file = File {
            name: "archive".to_string(),
            path: "/3c/4d/cafebabe.zip".to_string(),
        };
        let path = default_save_path(&creator, &sample_post(), 0, &file);
        // name has no extension, path says .zip, so display name wins
        assert!(path.ends_with("archive"), "got {}", path.display());
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_entry("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_entry("  padded  "), "padded");
    }

    #[test]
    #[cfg(not(windows))]
    fn test_sanitize_leading_dot_is_shifted() {
        assert_eq!(sanitize_entry(".hidden"), "_hidden");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_entry(&long).chars().count(), 200);
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_entry(""), "");
    }
}
