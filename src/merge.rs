//! Progress merge engine.
//!
//! The store cannot patch, so every write-through is a read-modify-write of the in-memory
//! document loaded at page-view start: find or create the asset record, apply only the fields the
//! update carries, then hand the whole document to the store adapter.
use crate::document::{AssetProgress, ProgressDocument};
use serde::{Deserialize, Serialize};

/// Field-level update for one asset. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_watched: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_position: Option<f64>,
}

impl ProgressPatch {
    pub fn started() -> Self {
        ProgressPatch {
            started: Some(true),
            ..Default::default()
        }
    }

    pub fn position(seconds: f64, percent: u8) -> Self {
        ProgressPatch {
            last_position: Some(seconds.max(0.0)),
            percent_watched: Some(percent.min(100)),
            ..Default::default()
        }
    }

    /// Mastery: full percent, resume position discarded.
    pub fn completed() -> Self {
        ProgressPatch {
            started: Some(true),
            completed: Some(true),
            percent_watched: Some(100),
            last_position: Some(0.0),
        }
    }
}

/// Page context stamped on a record the first time it is created.
#[derive(Debug, Clone, Copy)]
pub struct AssetContext<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub topics: &'a [String],
}

/// Find-or-create the record for `ctx.id` and apply `patch` to it.
///
/// - topics are assigned once: an existing non-empty topic list is never replaced, and an
///   update without topics never clears one;
/// - `started` only ever goes from false to true;
/// - a completed record ignores anything that would lower its percent, move its resume
///   position, or clear completion.
///
/// Returns the record after the patch.
pub fn apply_patch<'d>(
    doc: &'d mut ProgressDocument,
    ctx: AssetContext<'_>,
    patch: &ProgressPatch,
) -> &'d AssetProgress {
    let index = match doc.watched.iter().position(|asset| asset.id == ctx.id) {
        Some(index) => index,
        None => {
            tracing::debug!("[Merge] new record for '{}'", ctx.id);
            doc.watched.push(AssetProgress::new(ctx.id, ctx.title));
            doc.watched.len() - 1
        }
    };
    let record = &mut doc.watched[index];

    if record.topics.is_empty() && !ctx.topics.is_empty() {
        record.topics = ctx.topics.to_vec();
    }
    if record.title.is_empty() && !ctx.title.is_empty() {
        record.title = ctx.title.to_string();
    }
    if patch.started == Some(true) {
        record.started = true;
    }

    if record.completed {
        if patch.completed.is_some() || patch.percent_watched.is_some() {
            tracing::trace!("[Merge] '{}' already completed, keeping mastery", ctx.id);
        }
    } else {
        if let Some(percent) = patch.percent_watched {
            record.percent_watched = percent.min(100);
        }
        if let Some(position) = patch.last_position {
            record.last_position = position.max(0.0);
        }
        if patch.completed == Some(true) {
            record.completed = true;
            record.started = true;
            record.percent_watched = 100;
            record.last_position = 0.0;
        }
    }
    &doc.watched[index]
}
