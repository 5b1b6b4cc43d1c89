//! Media descriptors referenced by tiers.

use std::collections::BTreeMap;
use std::path::Path;

/// An audio or video resource a transcription refers to.
///
/// Media are opaque: only the location and mime type are known, nothing is
/// ever decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct Media {
    pub id: String,
    pub url: String,
    pub mime_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl Media {
    /// Creates a media with a fresh id and a mime type guessed from the url.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let mime_type = guess_mime_type(&url);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            mime_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Guesses a mime type from the extension of a file name or url.
pub fn guess_mime_type(url: &str) -> String {
    let ext = Path::new(url)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "wav" | "wave" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "aif" | "aiff" => "audio/aiff",
        "m4a" => "audio/mp4",
        "mp4" | "m4v" => "video/mp4",
        "mpg" | "mpeg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "audio/wav",
    };
    mime.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(Media::new("file:///corpus/a.MP3").mime_type, "audio/mpeg");
        assert_eq!(Media::new("talk.mp4").mime_type, "video/mp4");
        assert_eq!(Media::new("unknown").mime_type, "audio/wav");
    }
}
