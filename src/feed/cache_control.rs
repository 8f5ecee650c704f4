use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL};

/// Upper bound on how long a feed may ask to be left alone (6 hours).
pub const DEFAULT_CACHE_SECS: i64 = 21_600;

/// Compute the next time a feed may be fetched.
///
/// Honors `max-age`, then `s-maxage`, from every `Cache-Control` header on the
/// response. Either is capped at `default_cache_secs`; if neither is a positive
/// integer the default applies. A cool-down past the representable range
/// saturates at the latest representable time.
pub fn calculate_not_until(
    headers: &HeaderMap,
    now: DateTime<Utc>,
    default_cache_secs: i64,
) -> DateTime<Utc> {
    let mut max_age = 0i64;
    let mut s_maxage = 0i64;

    for value in headers.get_all(CACHE_CONTROL) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for directive in value.split(',') {
            let Some((key, raw)) = directive.split_once('=') else {
                continue;
            };
            let seconds = parse_seconds(raw);
            match key.trim().to_ascii_lowercase().as_str() {
                "max-age" => max_age = seconds,
                "s-maxage" => s_maxage = seconds,
                _ => {}
            }
        }
    }

    let interval = if max_age > 0 {
        max_age.min(default_cache_secs)
    } else if s_maxage > 0 {
        s_maxage.min(default_cache_secs)
    } else {
        default_cache_secs
    };

    Duration::try_seconds(interval)
        .and_then(|interval| now.checked_add_signed(interval))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Unparseable values count as zero.
fn parse_seconds(raw: &str) -> i64 {
    raw.trim()
        .trim_matches('"')
        .parse::<i64>()
        .unwrap_or(0)
}
