//! Property Type Table
//!
//! Static lookup `name -> (kind, access)` consumed by the codec. Names are stored
//! in hyphen form; underscore spellings and the `options/` prefix resolve to the
//! same entry. Properties missing from the table are handled generically.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ----------------------------------------------------------------------------
// Descriptor Types
// ----------------------------------------------------------------------------

/// Declared value type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// `yes`/`no` boolean
    Flag,
    /// Integer that may also hold keyword strings such as `auto` or `no`
    Integer,
    Float,
    String,
    /// Text that is not guaranteed to be valid UTF-8
    Bytes,
    /// Comma separated list, always surfaced as a sequence
    CommaList,
    /// Structured node value (maps, lists)
    Node,
}

/// Declared access rights of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    pub readable: bool,
    pub writable: bool,
}

impl Access {
    pub const READ_ONLY: Access = Access {
        readable: true,
        writable: false,
    };
    pub const WRITE_ONLY: Access = Access {
        readable: false,
        writable: true,
    };
    pub const READ_WRITE: Access = Access {
        readable: true,
        writable: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub access: Access,
}

// ----------------------------------------------------------------------------
// Table
// ----------------------------------------------------------------------------

use Access as A;
use PropertyKind as K;

const R: Access = A::READ_ONLY;
const W: Access = A::WRITE_ONLY;
const RW: Access = A::READ_WRITE;

static PROPERTIES: &[(&str, PropertyKind, Access)] = &[
    ("osd-level", K::Integer, RW),
    ("osd-scale", K::Float, RW),
    ("loop", K::String, RW),
    ("loop-file", K::String, RW),
    ("loop-playlist", K::String, RW),
    ("speed", K::Float, RW),
    ("filename", K::String, R),
    ("file-size", K::Integer, R),
    ("path", K::String, R),
    ("media-title", K::String, R),
    ("stream-pos", K::Integer, RW),
    ("stream-end", K::Integer, R),
    ("length", K::Float, R),
    ("duration", K::Float, R),
    ("avsync", K::Float, R),
    ("total-avsync-change", K::Float, R),
    ("drop-frame-count", K::Integer, R),
    ("percent-pos", K::Float, RW),
    ("ratio-pos", K::Float, RW),
    ("time-pos", K::Float, RW),
    ("time-start", K::Float, R),
    ("time-remaining", K::Float, R),
    ("playtime-remaining", K::Float, R),
    ("chapter", K::Integer, RW),
    ("edition", K::Integer, RW),
    ("disc-titles", K::Integer, R),
    ("disc-title", K::String, RW),
    ("disc-menu-active", K::Flag, R),
    ("chapters", K::Integer, R),
    ("editions", K::Integer, R),
    ("angle", K::Integer, RW),
    ("pause", K::Flag, RW),
    ("core-idle", K::Flag, R),
    ("idle-active", K::Flag, R),
    ("cache", K::Integer, R),
    ("cache-size", K::Integer, RW),
    ("pause-for-cache", K::Flag, R),
    ("eof-reached", K::Flag, R),
    ("pts-association-mode", K::String, RW),
    ("hr-seek", K::Flag, RW),
    ("volume", K::Float, RW),
    ("mute", K::Flag, RW),
    ("audio-delay", K::Float, RW),
    ("audio-format", K::String, R),
    ("audio-codec", K::String, R),
    ("audio-bitrate", K::Float, R),
    ("audio-samplerate", K::Integer, R),
    ("audio-channels", K::String, R),
    ("aid", K::Integer, RW),
    ("audio", K::Integer, RW),
    ("balance", K::Integer, RW),
    ("fullscreen", K::Flag, RW),
    ("fs", K::Flag, RW),
    ("deinterlace", K::Flag, RW),
    ("colormatrix", K::String, RW),
    ("colormatrix-input-range", K::String, RW),
    ("colormatrix-output-range", K::String, RW),
    ("colormatrix-primaries", K::String, RW),
    ("ontop", K::Flag, RW),
    ("border", K::Flag, RW),
    ("framedrop", K::String, RW),
    ("gamma", K::Float, RW),
    ("brightness", K::Integer, RW),
    ("contrast", K::Integer, RW),
    ("saturation", K::Integer, RW),
    ("hue", K::Integer, RW),
    ("hwdec", K::String, RW),
    ("panscan", K::Float, RW),
    ("video-format", K::String, R),
    ("video-codec", K::String, R),
    ("video-bitrate", K::Float, R),
    ("width", K::Integer, R),
    ("height", K::Integer, R),
    ("dwidth", K::Integer, R),
    ("dheight", K::Integer, R),
    ("fps", K::Float, R),
    ("estimated-vf-fps", K::Float, R),
    ("window-scale", K::Float, RW),
    ("video-aspect", K::String, RW),
    ("osd-width", K::Integer, R),
    ("osd-height", K::Integer, R),
    ("osd-par", K::Float, R),
    ("vid", K::Integer, RW),
    ("video", K::Integer, RW),
    ("video-align-x", K::Float, RW),
    ("video-align-y", K::Float, RW),
    ("video-pan-x", K::Integer, RW),
    ("video-pan-y", K::Integer, RW),
    ("video-zoom", K::Float, RW),
    ("video-unscaled", K::Flag, W),
    ("program", K::Integer, W),
    ("sid", K::Integer, RW),
    ("secondary-sid", K::Integer, RW),
    ("sub", K::Integer, RW),
    ("sub-delay", K::Float, RW),
    ("sub-pos", K::Integer, RW),
    ("sub-visibility", K::Flag, RW),
    ("sub-forced-only", K::Flag, RW),
    ("sub-scale", K::Float, RW),
    ("sub-text", K::Bytes, R),
    ("ass-use-margins", K::Flag, RW),
    ("ass-vsfilter-aspect-compat", K::Flag, RW),
    ("ass-style-override", K::String, RW),
    ("stream-capture", K::String, RW),
    ("tv-brightness", K::Integer, RW),
    ("tv-contrast", K::Integer, RW),
    ("tv-saturation", K::Integer, RW),
    ("tv-hue", K::Integer, RW),
    ("playlist-pos", K::Integer, RW),
    ("playlist-count", K::Integer, R),
    ("seekable", K::Flag, R),
    ("cursor-autohide", K::Integer, RW),
    ("cursor-autohide-fs-only", K::Flag, RW),
    ("alang", K::CommaList, RW),
    ("slang", K::CommaList, RW),
    ("vlang", K::CommaList, RW),
    ("external-files", K::CommaList, RW),
    ("property-list", K::CommaList, R),
    ("option-list", K::CommaList, R),
    ("track-list", K::Node, R),
    ("playlist", K::Node, R),
    ("metadata", K::Node, R),
    ("chapter-list", K::Node, R),
];

fn table() -> &'static HashMap<&'static str, PropertyDescriptor> {
    static TABLE: OnceLock<HashMap<&'static str, PropertyDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        PROPERTIES
            .iter()
            .map(|&(name, kind, access)| (name, PropertyDescriptor { name, kind, access }))
            .collect()
    })
}

// ----------------------------------------------------------------------------
// Lookup
// ----------------------------------------------------------------------------

/// Hyphen-form name with any `options/` prefix removed
pub fn canonical_name(name: &str) -> String {
    name.strip_prefix("options/")
        .unwrap_or(name)
        .replace('_', "-")
}

/// Engine path for a property name: underscores become hyphens, prefixes are kept
pub fn engine_name(name: &str) -> String {
    name.replace('_', "-")
}

pub fn lookup(name: &str) -> Option<&'static PropertyDescriptor> {
    table().get(canonical_name(name).as_str())
}

pub fn kind_of(name: &str) -> Option<PropertyKind> {
    lookup(name).map(|d| d.kind)
}

/// Every known property, in table order
pub fn all() -> impl Iterator<Item = PropertyDescriptor> {
    PROPERTIES
        .iter()
        .map(|&(name, kind, access)| PropertyDescriptor { name, kind, access })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_aliases() {
        let by_hyphen = lookup("core-idle").unwrap();
        let by_underscore = lookup("core_idle").unwrap();
        assert_eq!(by_hyphen, by_underscore);
        assert_eq!(by_hyphen.kind, PropertyKind::Flag);
        assert_eq!(by_hyphen.access, Access::READ_ONLY);

        assert_eq!(kind_of("options/slang"), Some(PropertyKind::CommaList));
        assert_eq!(kind_of("no-such-property"), None);
    }

    #[test]
    fn test_table_has_unique_names() {
        assert_eq!(table().len(), PROPERTIES.len());
        assert!(all().any(|d| d.name == "vid" && d.kind == PropertyKind::Integer));
    }
}
