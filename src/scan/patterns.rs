use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::unify::RawMatch;

/// Which pattern set an engine scans with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Five independent passes: bare, double-quoted and single-quoted URLs,
    /// then single-quoted and bare email addresses.
    #[default]
    Classic,
    /// One pass with `url` and `email` alternatives.
    Combined,
}

// Pattern order matters: it is the tie-break order for identical matches
// and everything from `CLASSIC_EMAIL_THRESHOLD` on is an email pattern.
const CLASSIC_SOURCES: [&str; 5] = [
    r"(?i)(?:(?:https?|ftp|file)://|www\.|ftp\.)[-A-Z0-9+\&@#/%?=\~_|$!:,.;]*[-A-Z0-9+\&@#/%=\~_|$]",
    r#"(?i)"(?:(?:https?|ftp|file)://|www\.|ftp\.)[^"\r\n]+"?"#,
    r"(?i)'(?:(?:https?|ftp|file)://|www\.|ftp\.)[^'\r\n]+'?",
    r"(?i)'((?:mailto:)?[A-Z0-9._%+-]+@[A-Z0-9._%-]+\.[A-Z]{2,4})'",
    r"(?i)((?:mailto:)?[A-Z0-9._%+-]+@[A-Z0-9._%-]+\.[A-Z]{2,4})\b",
];

const CLASSIC_EMAIL_THRESHOLD: usize = 3;

// One level of balanced parentheses is allowed inside a URL so links such as
// `https://en.wikipedia.org/wiki/Rust_(programming_language)` stay whole.
const COMBINED_SOURCE: &str = concat!(
    r"(?i)(?P<url>(?:(?:https?|ftp|file)://|www\.|ftp\.)",
    r"(?:\([-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[-A-Z0-9+\&@#/%=\~_|$?!:,.;])*",
    r"(?:\([-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[-A-Z0-9+\&@#/%=\~_|$]))",
    r"|(?P<email>(?:mailto:)?[A-Z0-9._%+-]+@[A-Z0-9._%-]+\.[A-Z]{2,4}\b)",
);

const COMBINED_EMAIL_SOURCE: usize = 1;

static CLASSIC: LazyLock<PatternSet> = LazyLock::new(|| PatternSet {
    kind: PatternKind::Classic,
    patterns: CLASSIC_SOURCES
        .iter()
        .map(|src| Regex::new(src).expect("valid url pattern"))
        .collect(),
    email_threshold: CLASSIC_EMAIL_THRESHOLD,
});

static COMBINED: LazyLock<PatternSet> = LazyLock::new(|| PatternSet {
    kind: PatternKind::Combined,
    patterns: vec![Regex::new(COMBINED_SOURCE).expect("valid combined url pattern")],
    email_threshold: COMBINED_EMAIL_SOURCE,
});

/// A precompiled, read-only collection of URL and email matchers.
///
/// `Regex` keeps its scratch space in an internal pool, so one set can be
/// shared by every engine and worker thread in the process.
#[derive(Debug)]
pub struct PatternSet {
    kind: PatternKind,
    patterns: Vec<Regex>,
    email_threshold: usize,
}

impl PatternSet {
    pub fn classic() -> &'static PatternSet {
        &CLASSIC
    }

    pub fn combined() -> &'static PatternSet {
        &COMBINED
    }

    pub fn for_kind(kind: PatternKind) -> &'static PatternSet {
        match kind {
            PatternKind::Classic => Self::classic(),
            PatternKind::Combined => Self::combined(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Raw matches with a source index at or above this value are emails.
    pub fn email_threshold(&self) -> usize {
        self.email_threshold
    }

    /// Runs every pattern over `text`, in pattern order.
    pub fn find_all(&self, text: &str) -> Vec<RawMatch> {
        match self.kind {
            PatternKind::Classic => self
                .patterns
                .iter()
                .enumerate()
                .flat_map(|(source, re)| {
                    re.find_iter(text)
                        .map(move |m| RawMatch::new(source, m.start(), m.len()))
                })
                .collect(),
            PatternKind::Combined => self.patterns[0]
                .captures_iter(text)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let source = if caps.name("email").is_some() {
                        COMBINED_EMAIL_SOURCE
                    } else {
                        0
                    };
                    Some(RawMatch::new(source, whole.start(), whole.len()))
                })
                .collect(),
        }
    }
}
