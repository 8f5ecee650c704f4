use regex::Regex;

/// Half-open byte range `[start, end)` of one name inside the search buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start.max(start) < self.end.min(end)
    }
}

/// Build the match pattern for raw user input.
///
/// Empty input matches the whole buffer; anything else is a literal,
/// case-insensitive substring.
pub fn pattern(input: &str) -> Result<Regex, regex::Error> {
    if input.is_empty() {
        Regex::new("(?s).*")
    } else {
        Regex::new(&format!("(?i){}", regex::escape(input)))
    }
}

/// All collection names of one server packed into a single buffer.
///
/// Matching runs once over the whole buffer instead of once per name. A match
/// that straddles two adjacent names selects both.
#[derive(Debug, Clone)]
pub struct Haystack {
    search: String,
    lower: String,
    spans: Vec<Span>,
}

impl Haystack {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut search = String::new();
        let mut spans = Vec::with_capacity(names.len());
        for name in names {
            let start = search.len();
            search.push_str(name.as_ref());
            spans.push(Span {
                start,
                end: search.len(),
            });
        }

        let lower = lowercase_aligned(&search);
        Self {
            search,
            lower,
            spans,
        }
    }

    /// Names overlapped by any non-overlapping match of `re`, in buffer
    /// order, each at most once.
    pub fn find_all(&self, re: &Regex) -> Vec<&str> {
        let mut found = Vec::new();
        let mut last: Option<usize> = None;

        for m in re.find_iter(&self.lower) {
            let first = self.spans.partition_point(|span| span.end <= m.start());
            for (idx, span) in self.spans.iter().enumerate().skip(first) {
                if span.start >= m.end() {
                    break;
                }
                if !span.overlaps(m.start(), m.end()) || last.is_some_and(|l| l >= idx) {
                    continue;
                }
                found.push(&self.search[span.start..span.end]);
                last = Some(idx);
            }
        }
        found
    }
}

/// Lower-case `s` without moving any byte offsets: a character whose
/// lower-case form has a different UTF-8 length is kept as it is.
fn lowercase_aligned(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) if l.len_utf8() == c.len_utf8() => out.push(l),
            _ => out.push(c),
        }
    }
    out
}
