//! Download request record, validation, and file-name derivation.
//!
//! A [`DownloadRequest`] is what the controller hands to the download
//! manager. The manager owns the transfer; nothing here performs I/O.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Well-known public directory that receives downloads.
pub const DIRECTORY_DOWNLOADS: &str = "Downloads";

/// Asset fetched by the `download` command unless configured otherwise.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://rus.hitmotop.com/get/music/20250519/Artur_Pirozhkov_-_Samo_Sobojj_79186666.mp3";

/// MIME type assumed for the default asset.
pub const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

/// Notification title used for every request built by [`DownloadRequest::new`].
pub const DEFAULT_TITLE: &str = "MP3 Download";

/// Name used when neither the header nor the URL yield one.
pub const FALLBACK_FILE_NAME: &str = "downloadfile";

/// Extension appended when the MIME type is unknown or absent.
const DEFAULT_EXTENSION: &str = "bin";

/// Known `(mime_type, extension)` pairs. The first entry for a MIME type
/// is its preferred extension.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("audio/wav", "wav"),
    ("audio/flac", "flac"),
    ("audio/aac", "aac"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("image/jpeg", "jpg"),
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("text/html", "html"),
    ("text/html", "htm"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/json", "json"),
];

// ---------------------------------------------------------------------------
// Request record
// ---------------------------------------------------------------------------

/// Whether and when the download manager surfaces a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVisibility {
    /// Shown while running, removed on completion.
    Visible,
    /// Shown while running and after completion.
    VisibleNotifyCompleted,
    /// Shown only once the download completes.
    VisibleNotifyOnlyCompletion,
    /// Never shown.
    Hidden,
}

impl NotificationVisibility {
    /// Whether completion should be announced.
    pub fn notifies_completion(self) -> bool {
        matches!(
            self,
            Self::VisibleNotifyCompleted | Self::VisibleNotifyOnlyCompletion
        )
    }
}

/// A request handed to the download manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub description: String,
    pub mime_type: Option<String>,
    pub notification: NotificationVisibility,
    /// Public directory name, resolved by the manager against its storage root.
    pub destination_dir: String,
    pub destination_file_name: String,
    pub allow_metered: bool,
    pub allow_roaming: bool,
}

impl DownloadRequest {
    /// Build a request for `url` with the standard title, description,
    /// destination and network policy.
    ///
    /// The file name is derived from the URL via [`guess_file_name`].
    pub fn new(url: &str, mime_type: Option<&str>) -> Result<Self, CoreError> {
        validate_download_url(url)?;
        let url = url.trim();
        let file_name = guess_file_name(url, None, mime_type);

        Ok(Self {
            url: url.to_string(),
            title: DEFAULT_TITLE.to_string(),
            description: format!("Downloading {file_name}"),
            mime_type: mime_type.map(str::to_string),
            notification: NotificationVisibility::VisibleNotifyCompleted,
            destination_dir: DIRECTORY_DOWNLOADS.to_string(),
            destination_file_name: file_name,
            allow_metered: true,
            allow_roaming: true,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_notification(mut self, notification: NotificationVisibility) -> Self {
        self.notification = notification;
        self
    }

    /// Override the public directory and file name.
    pub fn with_destination(
        mut self,
        directory: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        self.destination_dir = directory.into();
        self.destination_file_name = file_name.into();
        self
    }

    pub fn with_metered(mut self, allowed: bool) -> Self {
        self.allow_metered = allowed;
        self
    }

    pub fn with_roaming(mut self, allowed: bool) -> Self {
        self.allow_roaming = allowed;
        self
    }

    /// Check every field the download manager relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_download_url(&self.url)?;
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation(
                "Download title must not be empty".to_string(),
            ));
        }
        validate_path_component("destination directory", &self.destination_dir)?;
        validate_path_component("file name", &self.destination_file_name)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Network policy
// ---------------------------------------------------------------------------

/// Current state of the network the download would run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub metered: bool,
    pub roaming: bool,
}

/// Reject a request whose network policy forbids the current conditions.
pub fn check_network_policy(
    request: &DownloadRequest,
    conditions: NetworkConditions,
) -> Result<(), CoreError> {
    if conditions.metered && !request.allow_metered {
        return Err(CoreError::PermissionDenied(
            "Download is not allowed over a metered network".to_string(),
        ));
    }
    if conditions.roaming && !request.allow_roaming {
        return Err(CoreError::PermissionDenied(
            "Download is not allowed while roaming".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a download URL is non-empty and starts with `http`.
pub fn validate_download_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Download URL must not be empty".to_string(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Download URL must start with http:// or https://, got: '{trimmed}'"
        )));
    }
    Ok(())
}

/// A single path component: non-empty, no separators, not `.` or `..`.
fn validate_path_component(what: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
    {
        return Err(CoreError::Validation(format!(
            "Invalid {what}: '{value}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// File-name derivation
// ---------------------------------------------------------------------------

/// Derive a file name for a download.
///
/// Order of preference: the `filename` parameter of an `attachment`
/// Content-Disposition, the last path segment of the URL, then
/// [`FALLBACK_FILE_NAME`]. A missing extension is filled in from
/// `mime_type`; an extension that contradicts a known `mime_type` is
/// replaced.
pub fn guess_file_name(
    url: &str,
    content_disposition: Option<&str>,
    mime_type: Option<&str>,
) -> String {
    let name = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| last_path_segment(url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    apply_extension(name, mime_type)
}

/// Extract the `filename` parameter from an `attachment` disposition.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut parts = value.split(';');
    let disposition = parts.next()?.trim();
    if !disposition.eq_ignore_ascii_case("attachment") {
        return None;
    }

    parts
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, raw)| raw.trim().trim_matches('"'))
        .and_then(strip_directories)
}

/// Preferred extension for a MIME type, if known.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let mime = normalize_mime(mime_type);
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

/// MIME type registered for an extension, if known.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(m, _)| *m)
}

/// Lowercase the type and drop any parameters (`; charset=...`).
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase()
}

/// Last non-empty path segment of `url`, percent-decoded.
fn last_path_segment(url: &str) -> Option<String> {
    let clean = url.split(['?', '#']).next().unwrap_or(url);

    let path = match clean.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => clean,
    };

    let segment = path.rsplit('/').find(|s| !s.is_empty())?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    strip_directories(&decoded)
}

/// Keep only the part after the last path separator.
fn strip_directories(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn apply_extension(name: String, mime_type: Option<&str>) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => {
            let Some(mime) = mime_type else {
                return name;
            };
            let current = mime_for_extension(&name[dot + 1..]);
            match (current, extension_for_mime(mime)) {
                (Some(current), Some(wanted)) if current != normalize_mime(mime) => {
                    format!("{}.{wanted}", &name[..dot])
                }
                _ => name,
            }
        }
        _ => {
            let ext = match mime_type {
                Some(mime) => extension_for_mime(mime).unwrap_or_else(|| {
                    if normalize_mime(mime).starts_with("text/") {
                        "txt"
                    } else {
                        DEFAULT_EXTENSION
                    }
                }),
                None => DEFAULT_EXTENSION,
            };
            format!("{}.{ext}", name.trim_end_matches('.'))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
