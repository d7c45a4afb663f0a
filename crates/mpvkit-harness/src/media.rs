//! Scripted media for the fake engine
//!
//! Tests describe what a URL "contains" instead of shipping real media files.

/// Leading bytes that make a custom-protocol stream count as playable media
pub const FAKE_MEDIA_MAGIC: &[u8] = b"MPVKIT-FAKE-MEDIA";

/// Description of a playable entry
#[derive(Debug, Clone, PartialEq)]
pub struct FakeMedia {
    pub has_video: bool,
    pub has_audio: bool,
    pub duration: f64,
    pub title: Option<String>,
    /// Subtitle lines shown in order while the entry plays
    pub subtitles: Vec<String>,
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self {
            has_video: true,
            has_audio: true,
            duration: 3.0,
            title: None,
            subtitles: Vec::new(),
        }
    }
}

impl FakeMedia {
    pub fn video() -> Self {
        Self::default()
    }

    /// Video track only, like a silent test clip
    pub fn video_only() -> Self {
        Self {
            has_audio: false,
            ..Self::default()
        }
    }

    pub fn audio_only() -> Self {
        Self {
            has_video: false,
            ..Self::default()
        }
    }

    pub fn with_title<T: Into<String>>(mut self, title: T) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subtitles<S: Into<String>>(mut self, lines: Vec<S>) -> Self {
        self.subtitles = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Bytes a custom stream can serve so the fake engine accepts it as media
    pub fn stream_bytes(payload: &[u8]) -> Vec<u8> {
        let mut bytes = FAKE_MEDIA_MAGIC.to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }
}

/// One key binding parsed from a `define-section` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SectionBinding {
    pub key: String,
    pub command: Vec<String>,
}

/// Parse `define-section` contents: one `KEY COMMAND ARGS...` entry per line
pub(crate) fn parse_section(contents: &str) -> Vec<SectionBinding> {
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?.to_string();
            let command: Vec<String> = parts.map(str::to_string).collect();
            if command.is_empty() {
                None
            } else {
                Some(SectionBinding { key, command })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_section() {
        let bindings = parse_section("a script-binding client/kb_1\nCtrl+Shift+b playlist-clear\n\n");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].key, "a");
        assert_eq!(bindings[0].command, vec!["script-binding", "client/kb_1"]);
        assert_eq!(bindings[1].command, vec!["playlist-clear"]);
    }

    #[test]
    fn test_stream_bytes_carry_magic() {
        assert!(FakeMedia::stream_bytes(b"xyz").starts_with(FAKE_MEDIA_MAGIC));
    }
}
