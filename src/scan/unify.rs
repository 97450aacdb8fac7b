/// One pattern's hit against one scanned region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMatch {
    /// Index of the pattern that produced the match.
    pub source: usize,
    pub start: usize,
    pub len: usize,
}

impl RawMatch {
    pub fn new(source: usize, start: usize, len: usize) -> Self {
        Self { source, start, len }
    }

    fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A classified match that survived unification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnifiedMatch {
    pub start: usize,
    pub len: usize,
    pub is_email: bool,
}

impl UnifiedMatch {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Merges raw matches from any number of patterns into one ordered,
/// overlap-free list.
///
/// Candidates are ordered by start, then longest first, then by their
/// position in `raw` (pattern evaluation order). A sweep then keeps a
/// candidate only if it begins at or after the end of the last kept one.
/// Consequences:
///
/// - exact duplicates keep the first-seen pattern;
/// - a match contained in another is dropped, whichever pattern saw it first;
/// - of two partially overlapping matches the earlier-starting one wins.
///
/// Empty matches are ignored.
pub fn unify(raw: &[RawMatch], email_threshold: usize) -> Vec<UnifiedMatch> {
    let mut candidates: Vec<&RawMatch> = raw.iter().filter(|m| m.len > 0).collect();
    // Stable sort: ties on (start, len) keep the input order.
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.len.cmp(&a.len)));

    let mut unified: Vec<UnifiedMatch> = Vec::with_capacity(candidates.len());
    let mut covered_to = 0;

    for candidate in candidates {
        if candidate.start < covered_to {
            continue;
        }
        covered_to = candidate.end();
        unified.push(UnifiedMatch {
            start: candidate.start,
            len: candidate.len,
            is_email: candidate.source >= email_threshold,
        });
    }

    unified
}
