use std::time::{Duration, Instant};

use crate::model::config::EngineSettings;

/// Which part of the buffer a scan reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRegion {
    Document,
    /// The lines on screen; match offsets are shifted by the region start.
    Visible,
}

/// What caused a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Content,
    Viewport,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub trigger: Trigger,
    pub region: ScanRegion,
}

/// The staleness flags and debounce window of one engine.
///
/// Setting a flag restarts the window, so a burst of edits is scanned once,
/// after the buffer has been quiet for the flag's interval.
#[derive(Debug, Clone)]
pub struct ScanSchedule {
    content_dirty: bool,
    viewport_dirty: bool,
    content_interval: Duration,
    viewport_interval: Duration,
    full_document: bool,
    suspended: bool,
    window_start: Instant,
    generation: u64,
}

impl ScanSchedule {
    pub fn new(settings: &EngineSettings, now: Instant) -> Self {
        Self {
            content_dirty: false,
            viewport_dirty: false,
            content_interval: settings.content_interval,
            viewport_interval: settings.viewport_interval,
            full_document: settings.full_document,
            suspended: false,
            window_start: now,
            generation: 0,
        }
    }

    /// Bumps the content generation, so any scan reading older text is
    /// discarded before it paints.
    pub fn mark_content_dirty(&mut self, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.request_rescan(now);
    }

    /// Ignored in full-document mode, where the viewport never changes what
    /// is painted.
    pub fn mark_viewport_dirty(&mut self, now: Instant) {
        if self.full_document {
            return;
        }
        self.viewport_dirty = true;
        self.window_start = now;
    }

    /// Schedules a rescan without invalidating scans already in flight.
    pub fn request_rescan(&mut self, now: Instant) {
        self.content_dirty = true;
        self.window_start = now;
    }

    pub fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
    }

    pub fn set_content_interval(&mut self, interval: Duration) {
        self.content_interval = interval;
    }

    pub fn set_viewport_interval(&mut self, interval: Duration) {
        self.viewport_interval = interval;
    }

    pub fn set_full_document(&mut self, full_document: bool) {
        self.full_document = full_document;
        if full_document {
            self.viewport_dirty = false;
        }
    }

    pub fn content_interval(&self) -> Duration {
        self.content_interval
    }

    pub fn viewport_interval(&self) -> Duration {
        self.viewport_interval
    }

    pub fn full_document(&self) -> bool {
        self.full_document
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_dirty(&self) -> bool {
        self.content_dirty || self.viewport_dirty
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Decides whether a scan is due at `now` and takes the flag it consumes.
    ///
    /// Content wins over viewport. Content scans read the whole document in
    /// either mode, so they take both flags.
    pub fn poll(&mut self, now: Instant) -> Option<ScanRequest> {
        if self.suspended {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if self.content_dirty && elapsed > self.content_interval {
            self.content_dirty = false;
            self.viewport_dirty = false;
            return Some(ScanRequest {
                trigger: Trigger::Content,
                region: ScanRegion::Document,
            });
        }

        if self.viewport_dirty && !self.full_document && elapsed > self.viewport_interval {
            self.viewport_dirty = false;
            return Some(ScanRequest {
                trigger: Trigger::Viewport,
                region: ScanRegion::Visible,
            });
        }

        None
    }

    /// Takes every flag for an immediate whole-document scan.
    pub fn take_manual(&mut self) -> ScanRequest {
        self.content_dirty = false;
        self.viewport_dirty = false;
        ScanRequest {
            trigger: Trigger::Manual,
            region: ScanRegion::Document,
        }
    }

    /// Puts back the flag a failed scan took.
    pub fn restore(&mut self, request: ScanRequest) {
        match request.trigger {
            Trigger::Content | Trigger::Manual => self.content_dirty = true,
            Trigger::Viewport => self.viewport_dirty = true,
        }
    }

    /// Starts a new window once a scan attempt is over.
    pub fn finish(&mut self, now: Instant) {
        self.window_start = now;
    }
}
