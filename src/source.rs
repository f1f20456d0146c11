//! Hosted-video source references.
//!
//! The player container carries the share link of the hosted video. Supported shapes:
//!
//! - `https://vimeo.com/1154941604`
//! - `https://vimeo.com/1154941604/fb7da4d87b` (unlisted, with privacy hash)
//! - `https://player.vimeo.com/video/1154941604?h=fb7da4d87b`
//!
//! A reference that matches none of these means the playback state machine never starts.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

static SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"vimeo\.com/(?:video/)?(\d+)(?:/|\?h=)?(\w+)?")
        .expect("static source pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSource {
    pub id: String,
    pub hash: Option<String>,
}

impl PlayerSource {
    pub fn parse(reference: &str) -> Option<PlayerSource> {
        let captures = SOURCE_RE.captures(reference)?;
        let source = PlayerSource {
            id: captures.get(1)?.as_str().to_string(),
            hash: captures.get(2).map(|m| m.as_str().to_string()),
        };
        tracing::debug!("[Source] parsed {reference} -> {source}");
        Some(source)
    }

    /// URL for the embeddable player frame.
    pub fn embed_url(&self) -> String {
        match &self.hash {
            Some(hash) => format!("https://player.vimeo.com/video/{}?h={}", self.id, hash),
            None => format!("https://player.vimeo.com/video/{}", self.id),
        }
    }
}

impl Display for PlayerSource {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.hash {
            Some(hash) => write!(f, "{}/{}", self.id, hash),
            None => write!(f, "{}", self.id),
        }
    }
}
