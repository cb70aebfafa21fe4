//! Filename sanitization, destination deconfliction and mime/extension mapping.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() || is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Last path component of an advertised name, sanitized. Empty if nothing usable remains.
#[must_use]
pub fn clean_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = sanitize_filename(last);
    if cleaned.trim_matches('_').is_empty() {
        String::new()
    } else {
        cleaned
    }
}

/// Picks a free destination in `dir` and reserves its staging file.
///
/// `file.pdf` is tried first, then `file-1.pdf`, `file-2.pdf`, ... The
/// extension is everything after the last dot; names without a dot get the
/// counter appended. A candidate is free when neither the destination nor
/// its `<prefix><name>` staging file exists. The staging file is created
/// empty with `create_new`, so concurrent sessions never share one.
///
/// Returns `(destination, staging)`.
///
/// # Errors
///
/// Returns the I/O error of a staging file creation that failed for any
/// reason other than the file already existing.
pub fn reserve_unique_path(
    dir: &Path,
    filename: &str,
    staging_prefix: &str,
) -> std::io::Result<(PathBuf, PathBuf)> {
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };

    let mut index: u64 = 0;
    loop {
        let candidate = if index == 0 {
            filename.to_string()
        } else {
            format!("{stem}-{index}{ext}")
        };
        index += 1;

        let destination = dir.join(&candidate);
        if destination.exists() {
            continue;
        }
        let staging = dir.join(format!("{staging_prefix}{candidate}"));
        match OpenOptions::new().write(true).create_new(true).open(&staging) {
            Ok(_) => return Ok((destination, staging)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Guess file extension (without the dot) from a mime type.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match mime.as_str() {
        "text/html" => "html",
        "text/plain" => "txt",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/pdf" => "pdf",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        "text/css" => "css",
        "text/javascript" | "application/javascript" => "js",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => return None,
    };
    Some(ext)
}

/// Guess a mime type from a file name's extension.
#[must_use]
pub fn content_type_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "txt" | "log" | "md" => "text/plain",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "css" => "text/css",
        "js" => "text/javascript",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}
