//! Asset and topic identity from page context.
//!
//! Pure functions of page state. They never fail: anything unusable degrades to an empty id or
//! an empty topic list.
use crate::page::Page;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetIdentity {
    pub asset_id: String,
    pub topics: Vec<String>,
}

impl AssetIdentity {
    pub fn resolve<P: Page>(page: &P) -> Self {
        let identity = AssetIdentity {
            asset_id: asset_id_from_path(&page.location_path()),
            topics: topic_ids(page.topic_tags()),
        };
        tracing::debug!(
            "[Identity] asset '{}' topics {:?}",
            identity.asset_id,
            identity.topics
        );
        identity
    }

    pub fn is_empty(&self) -> bool {
        self.asset_id.is_empty()
    }

    /// First topic on the page, used to attribute activity entries.
    pub fn primary_topic(&self) -> &str {
        self.topics.first().map(String::as_str).unwrap_or_default()
    }
}

/// Final non-empty segment of a navigation path. Accepts bare paths or full URLs; query string
/// and fragment are ignored.
pub fn asset_id_from_path(location: &str) -> String {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    path.split('/')
        .rev()
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Ordered, de-duplicated topic ids with blanks removed.
pub fn topic_ids<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut topics: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !topics.iter().any(|t| t == tag) {
            topics.push(tag.to_string());
        }
    }
    topics
}
