use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An opaque playable unit as handed over by the track resolver.
///
/// `identifier` is the stable identity; two queue entries with the same
/// identifier are the same song queued twice. `position` is only meaningful
/// on tracks reported back by the engine and is never written by the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Duration in milliseconds. 0 for streams.
    pub length: u64,
    pub is_stream: bool,
    /// Playback position in milliseconds, as last reported by the engine.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub uri: Option<String>,
}

impl Track {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>, length: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            author: "Unknown".to_string(),
            length: length.as_millis() as u64,
            is_stream: false,
            position: 0,
            uri: None,
        }
    }

    pub fn stream(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            is_stream: true,
            ..Self::new(identifier, title, Duration::ZERO)
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// The same track as the engine would report it at `position_ms`.
    pub fn at_position(mut self, position_ms: u64) -> Self {
        self.position = position_ms;
        self
    }

    pub fn length(&self) -> Duration {
        Duration::from_millis(self.length)
    }

    /// Time left until the end when playing at `position_ms`.
    /// `None` for streams, which have no end.
    pub fn remaining(&self, position_ms: u64) -> Option<Duration> {
        if self.is_stream || self.length == 0 {
            return None;
        }
        Some(Duration::from_millis(self.length.saturating_sub(position_ms)))
    }

    pub fn is_seekable_to(&self, position_ms: u64) -> bool {
        !self.is_stream && position_ms <= self.length
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining() {
        let track = Track::new("abc", "Song", Duration::from_secs(200));
        assert_eq!(track.remaining(195_000), Some(Duration::from_secs(5)));
        assert_eq!(track.remaining(250_000), Some(Duration::ZERO));
        assert_eq!(Track::stream("radio", "Radio").remaining(10_000), None);
    }

    #[test]
    fn test_seekable() {
        let track = Track::new("abc", "Song", Duration::from_secs(10));
        assert!(track.is_seekable_to(10_000));
        assert!(!track.is_seekable_to(10_001));
        assert!(!Track::stream("radio", "Radio").is_seekable_to(0));
    }

    #[test]
    fn test_identity_is_not_title() {
        let a = Track::new("id-1", "Same Title", Duration::from_secs(60));
        let b = Track::new("id-2", "Same Title", Duration::from_secs(60));
        assert_ne!(a, b);
        assert_eq!(a.clone().at_position(5_000).identifier, a.identifier);
    }
}
