//! Feature flags a service may advertise in its `FEATURES` response

use std::fmt;

use serde::{Serialize, Serializer};

/// An interned feature flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// A feature not known here
    Unknown,
    /// `FileLoad`: the service loads files and reports them with `FILE`
    FileLoad,
    /// `PlayStop`: the service understands `play` and `stop`
    PlayStop,
    /// `Seek`
    Seek,
    /// `End`: the service announces the end of a file with `END`
    End,
    /// `TimeReport`: the service reports elapsed time with `TIME`
    TimeReport,
    /// `Playlist`
    Playlist,
    /// `Playlist.AutoAdvance`
    PlaylistAutoAdvance,
    /// `Playlist.TextItems`
    PlaylistTextItems,
}

impl Feature {
    /// Look up the feature for a string (case-sensitive)
    ///
    /// Returns [`Feature::Unknown`] for anything outside the vocabulary.
    pub fn lookup(feature: &str) -> Self {
        match feature {
            "FileLoad" => Feature::FileLoad,
            "PlayStop" => Feature::PlayStop,
            "Seek" => Feature::Seek,
            "End" => Feature::End,
            "TimeReport" => Feature::TimeReport,
            "Playlist" => Feature::Playlist,
            "Playlist.AutoAdvance" => Feature::PlaylistAutoAdvance,
            "Playlist.TextItems" => Feature::PlaylistTextItems,
            _ => Feature::Unknown,
        }
    }

    /// The string form of this feature
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Unknown => "<UNKNOWN FEATURE>",
            Feature::FileLoad => "FileLoad",
            Feature::PlayStop => "PlayStop",
            Feature::Seek => "Seek",
            Feature::End => "End",
            Feature::TimeReport => "TimeReport",
            Feature::Playlist => "Playlist",
            Feature::PlaylistAutoAdvance => "Playlist.AutoAdvance",
            Feature::PlaylistTextItems => "Playlist.TextItems",
        }
    }

    /// Whether this is the unknown-feature tag
    pub fn is_unknown(&self) -> bool {
        *self == Feature::Unknown
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
