use chrono::{DateTime, Utc};
use feed_rs::model::Link;
use feed_rs::parser;
use thiserror::Error;

/// One item as published by the feed, before ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    /// `published`, falling back to `updated` (Atom feeds often carry only that)
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not RSS, Atom or JSON Feed
    #[error("not a valid feed: {0}")]
    NotAValidFeed(String),
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed into items, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError::NotAValidFeed(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = item_link(&entry.links);
            let published = entry.published.or(entry.updated);
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());

            FeedItem {
                title,
                link,
                published,
            }
        })
        .collect();

    Ok(items)
}

/// Prefer the `alternate` link (the article page) over `self`/`enclosure`.
fn item_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}
