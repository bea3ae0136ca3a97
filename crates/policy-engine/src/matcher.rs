//! Ordered include/exclude glob matching.
//!
//! A pattern list is evaluated left to right against a list of items. Plain
//! patterns add their matches to the working set; patterns prefixed with `!`
//! remove theirs. If the *first* pattern is negated the working set starts
//! out as every item, so `["!*watch"]` reads as "everything except watches".
//! An empty pattern list matches nothing.
//!
//! Patterns use shell-style wildcards: `*`, `?` and `[...]` classes (`[!...]`
//! negates). Matching is case-sensitive and `/` is an ordinary character.
//! There is no `{a,b}` alternation and no escape character.
//!
//! ```rust
//! use policy_engine::matcher::match_patterns;
//!
//! let m = match_patterns(
//!     &["i*", "!*watch", "apple watch"],
//!     &["iphone", "ipad", "iwatch", "apple watch"],
//! );
//! assert_eq!(m.include(), ["iphone", "ipad", "apple watch"]);
//! assert_eq!(m.exclude(), ["iwatch"]);
//! ```

use std::fmt::Write as _;

use regex::Regex;

/// Prefix that turns a pattern into an exclusion.
pub const NEGATION_PREFIX: char = '!';

/// One compiled entry of a pattern list.
#[derive(Debug, Clone)]
struct CompiledPattern {
    negated: bool,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Glob(Regex),
    /// Contains a character class that admits no character, e.g. `[z-a]`.
    Never,
    Literal(String),
}

impl CompiledPattern {
    fn compile(raw: &str) -> Self {
        let (negated, body) = match raw.strip_prefix(NEGATION_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let kind = match translate(body) {
            None => PatternKind::Never,
            Some(source) => match Regex::new(&source) {
                Ok(re) => PatternKind::Glob(re),
                Err(e) => {
                    tracing::warn!(
                        pattern = raw,
                        error = %e,
                        "failed to compile glob; matching it literally"
                    );
                    PatternKind::Literal(body.to_string())
                }
            },
        };

        Self { negated, kind }
    }

    fn is_match(&self, item: &str) -> bool {
        match &self.kind {
            PatternKind::Glob(re) => re.is_match(item),
            PatternKind::Never => false,
            PatternKind::Literal(literal) => literal == item,
        }
    }
}

/// Translate a shell-style pattern into an anchored regex.
///
/// `*` matches any run of characters (`/` included), `?` any one character
/// and `[...]` one character of a class, negated by a leading `!`. A `]`
/// directly after `[` or `[!` belongs to the class, and `-` forms a range
/// unless it is first or last. A `[` with no closing `]` is literal, as is
/// every other character, `{` and `}` included.
///
/// Returns `None` when some class admits no character, since the pattern
/// then matches nothing.
fn translate(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from(r"\A(?s:");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i..end])?);
                    i = end + 1;
                }
                None => out.push_str(r"\["),
            },
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push_str(r")\z");
    Some(out)
}

/// Index of the `]` closing a class whose body starts at `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    chars[j..].iter().position(|&c| c == ']').map(|p| j + p)
}

fn translate_class(body: &[char]) -> Option<String> {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };

    let mut set = String::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            let (lo, hi) = (body[k], body[k + 2]);
            // Reversed ranges are dropped.
            if lo <= hi {
                let _ = write!(set, r"\x{{{:x}}}-\x{{{:x}}}", lo as u32, hi as u32);
            }
            k += 3;
        } else {
            let _ = write!(set, r"\x{{{:x}}}", body[k] as u32);
            k += 1;
        }
    }

    match (set.is_empty(), negated) {
        (true, true) => Some(".".to_string()),
        (true, false) => None,
        (false, true) => Some(format!("[^{set}]")),
        (false, false) => Some(format!("[{set}]")),
    }
}

/// A pattern list compiled once and matched many times.
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    patterns: Vec<CompiledPattern>,
}

impl CompiledPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| CompiledPattern::compile(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match every item against the pattern list.
    pub fn matches<S: AsRef<str>>(&self, items: &[S]) -> PatternMatches {
        let starts_full = self.patterns.first().is_some_and(|p| p.negated);

        let mut included = Vec::with_capacity(items.len());
        let mut touched = Vec::with_capacity(items.len());

        for item in items {
            let item = item.as_ref();
            let mut inc = starts_full;
            let mut seen = false;
            for pattern in &self.patterns {
                if pattern.is_match(item) {
                    seen = true;
                    inc = !pattern.negated;
                }
            }
            included.push(inc);
            touched.push(seen);
        }

        PatternMatches {
            items: items.iter().map(|i| i.as_ref().to_string()).collect(),
            included,
            touched,
        }
    }

    /// Whether the pattern list selects `item`.
    pub fn includes(&self, item: &str) -> bool {
        self.matches(&[item]).contains(item)
    }
}

/// Result of matching a pattern list against a list of items.
///
/// Every accessor returns items in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatches {
    items: Vec<String>,
    included: Vec<bool>,
    touched: Vec<bool>,
}

impl PatternMatches {
    /// Items currently selected.
    pub fn include(&self) -> Vec<&str> {
        self.select(|i| self.included[i])
    }

    /// Items touched by some pattern but ultimately excluded.
    pub fn exclude(&self) -> Vec<&str> {
        self.select(|i| self.touched[i] && !self.included[i])
    }

    /// Union of [`include`](Self::include) and [`exclude`](Self::exclude).
    pub fn matched(&self) -> Vec<&str> {
        self.select(|i| self.touched[i] || self.included[i])
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items
            .iter()
            .zip(&self.included)
            .any(|(it, inc)| *inc && it == item)
    }

    /// True when nothing is included.
    pub fn is_empty(&self) -> bool {
        !self.included.iter().any(|inc| *inc)
    }

    fn select(&self, keep: impl Fn(usize) -> bool) -> Vec<&str> {
        self.items
            .iter()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .map(|(_, item)| item.as_str())
            .collect()
    }
}

/// Compile `patterns` and match them against `items` in one go.
pub fn match_patterns<P: AsRef<str>, I: AsRef<str>>(
    patterns: &[P],
    items: &[I],
) -> PatternMatches {
    CompiledPatterns::new(patterns).matches(items)
}
