//! Persisted per-member documents.
//!
//! The member store only offers whole-field reads and writes, so each document is stored as one
//! JSON string under a custom field and rewritten wholesale on every change. Unknown top-level
//! keys are carried through untouched so a newer writer's data survives an older one.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-member record of per-asset viewing state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressDocument {
    #[serde(default)]
    pub watched: Vec<AssetProgress>,
    /// Cached expected asset count per topic id.
    #[serde(default)]
    pub topic_totals: BTreeMap<String, u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressDocument {
    pub fn get(&self, id: &str) -> Option<&AssetProgress> {
        self.watched.iter().find(|asset| asset.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AssetProgress> {
        self.watched.iter_mut().find(|asset| asset.id == id)
    }

    /// Records tagged with `topic`.
    pub fn in_topic<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a AssetProgress> + 'a {
        self.watched
            .iter()
            .filter(move |asset| asset.topics.iter().any(|t| t == topic))
    }

    /// Collapse duplicate ids left behind by older writers, keeping the first occurrence.
    pub(crate) fn dedup_ids(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        self.watched.retain(|asset| seen.insert(asset.id.clone()));
    }

    /// Restore full percent and a zero resume position on completed records. Older writers
    /// kept updating both after completion.
    pub(crate) fn normalize_completed(&mut self) {
        for asset in self.watched.iter_mut().filter(|asset| asset.completed) {
            asset.started = true;
            asset.percent_watched = 100;
            asset.last_position = 0.0;
        }
    }
}

/// Viewing state of one asset for one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetProgress {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "lenient_percent")]
    pub percent_watched: u8,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub last_position: f64,
}

impl AssetProgress {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        AssetProgress {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Round and clamp any JSON number into 0..=100.
fn lenient_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(clamp_percent(value))
}

fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if value.is_finite() { value.max(0.0) } else { 0.0 })
}

pub(crate) fn clamp_percent(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

/// Per-member record of discrete action counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDocument {
    #[serde(default)]
    pub downloads: Vec<DownloadEntry>,
    #[serde(default)]
    pub clicks: Vec<ClickEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub first_downloaded: String,
    #[serde(default)]
    pub last_downloaded: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEntry {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub first_clicked: String,
    #[serde(default)]
    pub last_clicked: String,
}

fn one() -> u32 {
    1
}
