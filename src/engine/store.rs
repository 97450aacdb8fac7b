use std::ops::Range;

use smallvec::SmallVec;

use crate::error::Result;
use crate::host::TextBuffer;
use crate::model::channel::StyleChannel;
use crate::model::config::EngineSettings;
use crate::model::url_match::UrlMatch;
use crate::scan::UnifiedMatch;

/// The paint layers one engine writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleChannels {
    /// Plain underline.
    pub url: StyleChannel,
    /// Text foreground.
    pub text: StyleChannel,
    /// Cleared under every match before the URL channels are painted, so
    /// e.g. spell-check squiggles do not show through links.
    pub clear: SmallVec<[StyleChannel; 4]>,
}

impl Default for StyleChannels {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl StyleChannels {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let mut channels = Self {
            url: settings.url_channel,
            text: settings.text_channel,
            clear: SmallVec::new(),
        };
        for &channel in &settings.clear_channels {
            channels.append_clear(channel);
        }
        channels
    }

    /// Returns false if `channel` was already listed.
    pub fn append_clear(&mut self, channel: StyleChannel) -> bool {
        if self.clear.contains(&channel) {
            return false;
        }
        self.clear.push(channel);
        true
    }

    /// Validating form of [`StyleChannels::append_clear`].
    pub fn append_clear_id(&mut self, id: u32) -> Result<bool> {
        Ok(self.append_clear(StyleChannel::new(id)?))
    }

    fn url_channels(&self) -> [StyleChannel; 2] {
        [self.url, self.text]
    }
}

/// The published matches of one engine, sorted by start and disjoint.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    matches: Vec<UrlMatch>,
}

impl AnnotationStore {
    pub fn matches(&self) -> &[UrlMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The first match with `start_index <= position <= end_index`.
    pub fn match_at(&self, position: usize) -> Option<&UrlMatch> {
        let idx = self.matches.partition_point(|m| m.end_index() < position);
        self.matches.get(idx).filter(|m| m.contains(position))
    }

    pub fn replace(&mut self, matches: Vec<UrlMatch>) {
        self.matches = matches;
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }

    pub fn set_display_length(&mut self, display_length: Option<usize>) {
        for m in &mut self.matches {
            m.display_length = display_length;
        }
    }
}

/// Clears both URL channels over `region` and under every previously
/// published match, so paint never outlives the store.
pub fn clear_paint(
    buffer: &mut dyn TextBuffer,
    channels: &StyleChannels,
    region: Range<usize>,
    published: &[UrlMatch],
) {
    let text_len = buffer.text_len();
    let region = region.start.min(text_len)..region.end.min(text_len);

    for channel in channels.url_channels() {
        buffer.clear_style_range(channel, region.start, region.len());
        for m in published {
            let start = m.start_index.min(text_len);
            let end = m.end_index().min(text_len);
            if start < end {
                buffer.clear_style_range(channel, start, end - start);
            }
        }
    }
}

/// Paints `found` (offsets relative to `region_text`) and returns the
/// matches to publish, shifted to buffer offsets.
pub fn paint_matches(
    buffer: &mut dyn TextBuffer,
    channels: &StyleChannels,
    region_text: &str,
    region_start: usize,
    found: &[UnifiedMatch],
    display_length: Option<usize>,
) -> Vec<UrlMatch> {
    let mut published = Vec::with_capacity(found.len());

    for m in found {
        let Some(contents) = region_text.get(m.start..m.end()) else {
            continue;
        };
        let start = region_start + m.start;

        for &channel in &channels.clear {
            buffer.clear_style_range(channel, start, m.len);
        }
        for channel in channels.url_channels() {
            buffer.paint_style_range(channel, start, m.len);
        }

        published.push(UrlMatch {
            start_index: start,
            contents: contents.to_string(),
            is_mail_to_link: m.is_email,
            display_length,
        });
    }

    published
}

/// Removes both URL channels from the whole buffer.
pub fn clear_all_paint(buffer: &mut dyn TextBuffer, channels: &StyleChannels) {
    let text_len = buffer.text_len();
    for channel in channels.url_channels() {
        buffer.clear_style_range(channel, 0, text_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::buffer::RopeBuffer;
    use crate::scan::{PatternSet, scan_text};

    const SAMPLE: &str = "Visit http://example.com/page or email me at a@b.com";

    fn ch(id: u32) -> StyleChannel {
        StyleChannel::new(id).unwrap()
    }

    fn published(text: &str) -> Vec<UrlMatch> {
        let mut buffer = RopeBuffer::from_text(text);
        let found = scan_text(PatternSet::classic(), text);
        paint_matches(&mut buffer, &StyleChannels::default(), text, 0, &found, None)
    }

    #[test]
    fn append_clear_ignores_duplicates_and_validates() {
        let mut channels = StyleChannels::default();
        assert!(channels.append_clear_id(8).unwrap());
        assert!(!channels.append_clear_id(8).unwrap());
        assert!(channels.append_clear_id(32).is_err());
        assert_eq!(channels.clear.as_slice(), &[ch(8)]);
    }

    #[test]
    fn paint_publishes_sample_matches() {
        let mut buffer = RopeBuffer::from_text(SAMPLE);
        buffer.paint_style_range(ch(4), 0, SAMPLE.len());
        let mut channels = StyleChannels::default();
        channels.append_clear(ch(4));

        let found = scan_text(PatternSet::classic(), SAMPLE);
        let published = paint_matches(&mut buffer, &channels, SAMPLE, 0, &found, Some(10));

        assert_eq!(published.len(), 2);
        assert_eq!(published[0].start_index, 6);
        assert_eq!(published[0].contents, "http://example.com/page");
        assert!(!published[0].is_mail_to_link);
        assert_eq!(published[1].start_index, 45);
        assert_eq!(published[1].contents, "a@b.com");
        assert!(published[1].is_mail_to_link);
        assert_eq!(published[1].display_length, Some(10));

        for channel in [StyleChannel::URL, StyleChannel::URL_TEXT] {
            assert_eq!(buffer.styles.ranges(channel), &[6..29, 45..52]);
        }
        assert_eq!(buffer.styles.ranges(ch(4)), &[0..6, 29..45]);
    }

    #[test]
    fn region_offsets_are_shifted() {
        let mut buffer = RopeBuffer::from_text("0123456789 see www.example.org");
        let region_text = "see www.example.org";
        let found = scan_text(PatternSet::classic(), region_text);
        let published = paint_matches(
            &mut buffer,
            &StyleChannels::default(),
            region_text,
            11,
            &found,
            None,
        );
        assert_eq!(published[0].start_index, 15);
        assert_eq!(buffer.styles.ranges(StyleChannel::URL), &[15..30]);
    }

    #[test]
    fn clear_removes_region_and_stale_matches() {
        let text = "www.a.com and www.b.com and www.c.com";
        let mut buffer = RopeBuffer::from_text(text);
        let channels = StyleChannels::default();
        let found = scan_text(PatternSet::classic(), text);
        let old = paint_matches(&mut buffer, &channels, text, 0, &found, None);
        assert_eq!(old.len(), 3);

        // A scan of only the middle third still clears the outer matches.
        clear_paint(&mut buffer, &channels, 10..20, &old);
        assert!(buffer.styles.ranges(StyleChannel::URL).is_empty());
        assert!(buffer.styles.ranges(StyleChannel::URL_TEXT).is_empty());
    }

    #[test]
    fn clear_clamps_to_buffer() {
        let mut buffer = RopeBuffer::from_text("short");
        let stale = UrlMatch {
            start_index: 3,
            contents: "www.gone.example".into(),
            is_mail_to_link: false,
            display_length: None,
        };
        buffer.paint_style_range(StyleChannel::URL, 0, 5);
        clear_paint(&mut buffer, &StyleChannels::default(), 0..100, &[stale]);
        assert!(buffer.styles.ranges(StyleChannel::URL).is_empty());
    }

    #[test]
    fn match_at_is_inclusive() {
        let mut store = AnnotationStore::default();
        store.replace(published(SAMPLE));

        assert_eq!(store.match_at(5), None);
        assert_eq!(store.match_at(6).unwrap().start_index, 6);
        assert_eq!(store.match_at(29).unwrap().start_index, 6);
        assert_eq!(store.match_at(30), None);
        assert!(store.match_at(52).unwrap().is_mail_to_link);
        assert_eq!(store.match_at(53), None);
    }

    #[test]
    fn match_at_prefers_first_of_adjacent_matches() {
        let mut store = AnnotationStore::default();
        store.replace(vec![
            UrlMatch {
                start_index: 0,
                contents: "a@b.com".into(),
                is_mail_to_link: true,
                display_length: None,
            },
            UrlMatch {
                start_index: 7,
                contents: "www.x.org".into(),
                is_mail_to_link: false,
                display_length: None,
            },
        ]);
        assert!(store.match_at(7).unwrap().is_mail_to_link);
        assert!(!store.match_at(8).unwrap().is_mail_to_link);
    }

    #[test]
    fn display_length_applies_to_published_matches() {
        let mut store = AnnotationStore::default();
        store.replace(published(SAMPLE));
        store.set_display_length(Some(10));
        assert_eq!(store.matches()[0].human_readable_contents(), "htt...age");
    }
}
