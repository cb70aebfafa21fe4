//! Share advertisement exchanged between peers.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentity;

/// File description carried by an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Hashes of the content.
    pub hashes: ContentIdentity,
    /// File name without directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<SystemTime>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Audio amplitude envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitudes: Option<Vec<u8>>,
}

impl FileDescriptor {
    /// Descriptor with only hashes set.
    #[must_use]
    pub fn new(hashes: ContentIdentity) -> Self {
        Self {
            hashes,
            name: None,
            size: None,
            mime_type: None,
            modified: None,
            description: None,
            amplitudes: None,
        }
    }
}

/// A shared file as announced to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAdvertisement {
    /// What is shared.
    pub file: FileDescriptor,
    /// Where to get it, highest priority first.
    pub sources: Vec<String>,
}

impl ShareAdvertisement {
    /// Preferred source, if any.
    #[must_use]
    pub fn primary_source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_advertisement_json_skips_missing_fields() {
        let mut file = FileDescriptor::new(ContentIdentity::of_bytes(b"abc"));
        file.name = Some("a.txt".to_string());
        let advertisement = ShareAdvertisement {
            file,
            sources: vec!["https://h/a.txt".to_string()],
        };

        let json = serde_json::to_string(&advertisement).unwrap();
        assert!(json.contains("\"name\":\"a.txt\""), "Expected name in: {json}");
        assert!(!json.contains("mime_type"), "Unexpected mime in: {json}");

        let decoded: ShareAdvertisement = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, advertisement);
        assert_eq!(decoded.primary_source(), Some("https://h/a.txt"));
    }
}
