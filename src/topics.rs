//! Topic roll-ups.
//!
//! A read-only aggregation of the asset records tagged with a topic. The expected number of
//! assets in a topic is whatever is larger: the total cached in the progress document, or the
//! number of asset entries the listing currently renders. The cache is refreshed only when the
//! rendered count differs from it, which keeps write volume bounded.
use crate::{document::ProgressDocument, page::Indicator, render::IndicatorView};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicRollup {
    pub completed: u32,
    pub in_progress: u32,
    /// Sum of percents over every started or completed asset.
    pub percent_sum: u32,
    pub total: u32,
}

impl TopicRollup {
    pub fn compute(doc: &ProgressDocument, topic: &str, rendered_count: usize) -> Self {
        let mut rollup = TopicRollup::default();
        for asset in doc.in_topic(topic) {
            if asset.completed {
                rollup.completed += 1;
                rollup.percent_sum += 100;
            } else if asset.started {
                rollup.in_progress += 1;
                rollup.percent_sum += u32::from(asset.percent_watched);
            }
        }
        let cached = doc.topic_totals.get(topic).copied().unwrap_or(0);
        let rendered = u32::try_from(rendered_count).unwrap_or(u32::MAX);
        // Never report fewer assets than the member has already touched.
        rollup.total = cached
            .max(rendered)
            .max(rollup.completed + rollup.in_progress);
        rollup
    }

    /// Rounded mean percent across assets that are not in the not-started state.
    pub fn average_percent(&self) -> u8 {
        let active = self.completed + self.in_progress;
        if active == 0 {
            return 0;
        }
        (f64::from(self.percent_sum) / f64::from(active)).round().min(100.0) as u8
    }

    pub fn view(&self) -> IndicatorView {
        if self.total > 0 && self.completed >= self.total {
            IndicatorView::Completed
        } else if self.completed == 0 && self.in_progress == 0 {
            IndicatorView::NotStarted
        } else {
            let percent = self.average_percent();
            IndicatorView::InProgress {
                percent,
                label: format!("{percent}% ({}/{})", self.completed, self.total),
            }
        }
    }
}

/// Render every topic indicator and collect the topic totals that should be cached.
///
/// `rendered_count` reports how many asset entries the page shows for a topic. Returns the
/// number of indicators rendered and the totals that changed.
pub fn render_topics<I, F>(
    doc: &ProgressDocument,
    indicators: &[I],
    rendered_count: F,
) -> (usize, BTreeMap<String, u32>)
where
    I: Indicator,
    F: Fn(&str) -> usize,
{
    let mut rendered = 0;
    let mut changed = BTreeMap::new();
    for indicator in indicators {
        let Some(topic) = indicator.key().filter(|t| !t.is_empty()) else {
            tracing::debug!("[Topics] no topic id found for indicator");
            continue;
        };
        let observed = rendered_count(&topic);
        let rollup = TopicRollup::compute(doc, &topic, observed);
        rollup.view().apply(indicator);
        rendered += 1;

        let observed = u32::try_from(observed).unwrap_or(u32::MAX);
        if observed > 0 && doc.topic_totals.get(&topic) != Some(&observed) {
            changed.insert(topic, observed);
        }
    }
    (rendered, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AssetProgress;

    fn asset(id: &str, topic: &str, started: bool, completed: bool, percent: u8) -> AssetProgress {
        AssetProgress {
            id: id.to_string(),
            topics: vec![topic.to_string()],
            started,
            completed,
            percent_watched: percent,
            ..Default::default()
        }
    }

    #[test]
    fn one_complete_one_partial() {
        let mut doc = ProgressDocument::default();
        doc.watched.push(asset("a", "t", true, true, 100));
        doc.watched.push(asset("b", "t", true, false, 40));
        doc.watched.push(asset("c", "other", true, true, 100));
        let rollup = TopicRollup::compute(&doc, "t", 2);
        assert_eq!(rollup.average_percent(), 70);
        assert_eq!(
            rollup.view(),
            IndicatorView::InProgress {
                percent: 70,
                label: "70% (1/2)".to_string()
            }
        );
    }

    #[test]
    fn total_prefers_larger_of_cache_and_rendered() {
        let mut doc = ProgressDocument::default();
        doc.watched.push(asset("a", "t", true, true, 100));
        doc.topic_totals.insert("t".to_string(), 3);
        assert_eq!(TopicRollup::compute(&doc, "t", 1).total, 3);
        assert_eq!(TopicRollup::compute(&doc, "t", 5).total, 5);
    }

    #[test]
    fn fully_complete_and_untouched_topics() {
        let mut doc = ProgressDocument::default();
        doc.watched.push(asset("a", "t", true, true, 100));
        assert_eq!(TopicRollup::compute(&doc, "t", 1).view(), IndicatorView::Completed);
        assert_eq!(TopicRollup::compute(&doc, "u", 4).view(), IndicatorView::NotStarted);
        // No cache and nothing rendered: the touched assets are the total.
        assert_eq!(TopicRollup::compute(&doc, "t", 0).view(), IndicatorView::Completed);
    }

    #[test]
    fn not_started_assets_do_not_dilute_average() {
        let mut doc = ProgressDocument::default();
        doc.watched.push(asset("a", "t", true, false, 25));
        doc.watched.push(asset("b", "t", false, false, 0));
        let rollup = TopicRollup::compute(&doc, "t", 3);
        assert_eq!(rollup.average_percent(), 25);
        assert_eq!(rollup.total, 3);
    }
}
