//! Autocomplete over a server's collection names.

mod cache;
mod haystack;

pub use cache::{CollectionSearchCache, CollectionSource, DEFAULT_MAX_RESULTS, DEFAULT_TTL};
pub use haystack::{pattern, Haystack, Span};
