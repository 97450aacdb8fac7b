/// A published URL or email annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch {
    /// Byte offset of the match in the buffer.
    pub start_index: usize,
    /// The matched text as it appears in the buffer, quotes included.
    pub contents: String,
    pub is_mail_to_link: bool,
    /// Target length of [`UrlMatch::human_readable_contents`]; `None` means unlimited.
    pub display_length: Option<usize>,
}

const MAILTO: &str = "mailto:";
const ELLIPSIS: &str = "...";

impl UrlMatch {
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn end_index(&self) -> usize {
        self.start_index + self.contents.len()
    }

    /// Inclusive on both ends, so a pointer resting just after the last
    /// character still counts as over the link.
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start_index && position <= self.end_index()
    }

    /// The contents in a form suitable for handing to a URL opener.
    pub fn tidy_contents(&self) -> String {
        let tidy = trim_link(&self.contents);
        if self.is_mail_to_link && !tidy.starts_with(MAILTO) {
            format!("{MAILTO}{tidy}")
        } else {
            tidy.to_string()
        }
    }

    /// The contents for display: quotes and `mailto:` removed, middle
    /// elided when a display length is set.
    pub fn human_readable_contents(&self) -> String {
        let readable = trim_link(&self.contents).replace(MAILTO, "");
        match self.display_length {
            Some(limit) => ellipsize(&readable, limit),
            None => readable,
        }
    }
}

fn trim_link(contents: &str) -> &str {
    contents.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn ellipsize(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count < limit + ELLIPSIS.len() {
        return text.to_string();
    }

    let part = limit.saturating_sub(ELLIPSIS.len()) / 2;
    let head: String = text.chars().take(part).collect();
    let tail: String = text.chars().skip(count - part).collect();
    format!("{head}{ELLIPSIS}{tail}")
}
