//! The incremental rescan engine.
//!
//! Data flow for one scan: a staleness flag is set by a notification, the
//! schedule decides a scan is due, the region is read on the buffer's
//! owning thread, patterns run on the calling thread (the worker, normally),
//! and the result is painted and published on the owning thread again.

pub mod scheduler;
pub mod store;
pub mod supervisor;
mod worker;

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result, panic_message};
use crate::host::{BufferHost, TextBuffer, with_buffer};
use crate::lock;
use crate::model::channel::StyleChannel;
use crate::model::config::{EngineSettings, StopPolicy};
use crate::model::url_match::UrlMatch;
use crate::scan::{PatternKind, PatternSet, UnifiedMatch, scan_text};
use crate::time_source::{RealTimeSource, SharedTimeSource};

pub use scheduler::{ScanRegion, ScanRequest, ScanSchedule, Trigger};
pub use store::{AnnotationStore, StyleChannels};
pub use supervisor::{EngineKey, Supervisor};

use worker::WorkerSlot;

/// Receives scan and teardown errors that have no caller to return to.
pub type ErrorReporter = Arc<dyn Fn(&Error) + Send + Sync>;

/// How often an owning-thread caller retries a busy scan lock.
const SCAN_LOCK_SPIN: Duration = Duration::from_millis(1);

/// Result of one scan attempt that got as far as the apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Applied { matches: usize },
    /// The text changed after it was read. Nothing was painted.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No worker; scans only happen through `tick` or `mark_urls`.
    Idle,
    Running,
    Suspended,
    /// Disposed.
    Stopped,
    /// A stop request timed out and the worker was left behind.
    Abandoned,
}

/// A runtime setting that changed. Passed to
/// [`UrlEngine::apply_config_change`] by each setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    ContentInterval,
    ViewportInterval,
    FullDocument,
    Patterns,
    UrlChannel { previous: StyleChannel },
    TextChannel { previous: StyleChannel },
    ClearChannels,
    DisplayLength,
    PollQuantum,
    StopPolicy,
}

struct EngineState {
    schedule: ScanSchedule,
    styles: StyleChannels,
    patterns: PatternKind,
    display_length: Option<usize>,
    poll_quantum: Duration,
    stop_policy: StopPolicy,
}

/// Text read for one scan, with the content generation it was read at.
struct Snapshot {
    text: String,
    start: usize,
    generation: u64,
}

impl Snapshot {
    fn read(buffer: &dyn TextBuffer, region: ScanRegion, generation: u64) -> Self {
        let (start, end) = match region {
            ScanRegion::Document => (0, buffer.text_len()),
            ScanRegion::Visible => visible_span(buffer),
        };
        let text = match region {
            ScanRegion::Document => buffer.text(),
            ScanRegion::Visible => buffer.text_range(start, end - start),
        };
        Self {
            text,
            start,
            generation,
        }
    }

    fn range(&self) -> Range<usize> {
        self.start..self.start + self.text.len()
    }
}

fn visible_span(buffer: &dyn TextBuffer) -> (usize, usize) {
    let text_len = buffer.text_len();
    let (first, count) = buffer.visible_line_range();
    let start = buffer.line_start_offset(first).min(text_len);
    let end = match count.checked_sub(1) {
        Some(extra) => {
            let last = first + extra;
            buffer.line_start_offset(last) + buffer.line_len(last)
        }
        None => start,
    };
    (start, end.clamp(start, text_len))
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between an engine handle, its worker and the supervisor.
pub(crate) struct EngineInner {
    host: Arc<dyn BufferHost>,
    time: SharedTimeSource,
    state: Mutex<EngineState>,
    store: RwLock<AnnotationStore>,
    scan_lock: Mutex<()>,
    worker: Mutex<WorkerSlot>,
    reporter: RwLock<Option<ErrorReporter>>,
    disposed: AtomicBool,
}

impl EngineInner {
    fn poll_quantum(&self) -> Duration {
        lock(&self.state).poll_quantum
    }

    fn generation(&self) -> u64 {
        lock(&self.state).schedule.generation()
    }

    pub(crate) fn report(&self, err: &Error) {
        let reporter = read_lock(&self.reporter).clone();
        if let Some(reporter) = reporter {
            reporter(err);
        }
    }

    pub(crate) fn start_worker(self: &Arc<Self>) -> Result<()> {
        let mut slot = lock(&self.worker);
        if matches!(*slot, WorkerSlot::Running(_)) {
            return Ok(());
        }
        let handle = worker::spawn(Arc::clone(self))?;
        debug!(worker = handle.name(), "scan worker spawned");
        *slot = WorkerSlot::Running(handle);
        Ok(())
    }

    /// Stops the worker if there is one. Abandonment is logged and reported
    /// here as well as returned.
    pub(crate) fn stop_worker(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *lock(&self.worker), WorkerSlot::Idle);
        let WorkerSlot::Running(handle) = previous else {
            return Ok(());
        };

        let policy = lock(&self.state).stop_policy;
        let result = worker::stop(handle, policy, self.host.as_ref());
        if let Err(err) = &result {
            if matches!(err, Error::WorkerAbandoned(_)) {
                *lock(&self.worker) = WorkerSlot::Abandoned;
            }
            error!(%err, "scan worker did not stop cleanly");
            self.report(err);
        }
        result
    }

    /// Blocking acquire for the worker. The owning thread must use
    /// [`EngineInner::acquire_scan_lock`] instead.
    fn worker_scan_lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.scan_lock)
    }

    /// Acquire that keeps the host's job queue moving, so a worker holding
    /// the lock while it waits on the owning thread can finish.
    fn acquire_scan_lock(&self) -> MutexGuard<'_, ()> {
        loop {
            match self.scan_lock.try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
            self.host.pump_pending();
            thread::sleep(SCAN_LOCK_SPIN);
        }
    }

    /// One scheduler decision from the worker. Returns false when no scan
    /// was due.
    fn poll_and_scan(self: &Arc<Self>) -> bool {
        let now = self.time.now();
        let Some(request) = lock(&self.state).schedule.poll(now) else {
            return false;
        };
        let _scan = self.worker_scan_lock();
        // Errors are reported inside.
        let _ = self.run_pass(request);
        true
    }

    /// Runs one scan and settles the schedule afterwards. The caller holds
    /// the scan lock.
    fn run_pass(self: &Arc<Self>, request: ScanRequest) -> Result<ScanOutcome> {
        let outcome = self.scan(request);

        let now = self.time.now();
        {
            let mut state = lock(&self.state);
            if outcome.is_err() {
                state.schedule.restore(request);
            }
            state.schedule.finish(now);
        }

        match &outcome {
            Ok(ScanOutcome::Applied { matches }) => {
                debug!(trigger = ?request.trigger, region = ?request.region, matches, "scan applied");
            }
            Ok(ScanOutcome::Stale) => {
                debug!(trigger = ?request.trigger, "text changed during scan, result discarded");
            }
            Err(err) => {
                warn!(%err, trigger = ?request.trigger, "scan failed");
                self.report(err);
            }
        }
        outcome
    }

    fn scan(self: &Arc<Self>, request: ScanRequest) -> Result<ScanOutcome> {
        let patterns = PatternSet::for_kind(lock(&self.state).patterns);

        let reader = Arc::clone(self);
        let snapshot = with_buffer(self.host.as_ref(), move |buffer| {
            Snapshot::read(buffer, request.region, reader.generation())
        })?;

        let found = catch_unwind(AssertUnwindSafe(|| scan_text(patterns, &snapshot.text)))
            .map_err(|payload| Error::ScanPanicked(panic_message(payload.as_ref())))?;

        let applier = Arc::clone(self);
        with_buffer(self.host.as_ref(), move |buffer| {
            applier.apply(buffer, &snapshot, &found)
        })
    }

    /// Runs on the owning thread.
    fn apply(
        &self,
        buffer: &mut dyn TextBuffer,
        snapshot: &Snapshot,
        found: &[UnifiedMatch],
    ) -> ScanOutcome {
        let (styles, display_length) = {
            let state = lock(&self.state);
            if state.schedule.generation() != snapshot.generation {
                return ScanOutcome::Stale;
            }
            (state.styles.clone(), state.display_length)
        };

        let mut annotations = write_lock(&self.store);
        store::clear_paint(buffer, &styles, snapshot.range(), annotations.matches());
        let published = store::paint_matches(
            buffer,
            &styles,
            &snapshot.text,
            snapshot.start,
            found,
            display_length,
        );
        let matches = published.len();
        annotations.replace(published);
        ScanOutcome::Applied { matches }
    }

    fn clear_indicators(self: &Arc<Self>) -> Result<()> {
        let inner = Arc::clone(self);
        with_buffer(self.host.as_ref(), move |buffer| {
            let styles = lock(&inner.state).styles.clone();
            store::clear_all_paint(buffer, &styles);
            write_lock(&inner.store).clear();
        })
    }

    /// Moves the published paint from `previous` to `current`.
    fn repaint_channel(self: &Arc<Self>, previous: StyleChannel, current: StyleChannel) -> Result<()> {
        let inner = Arc::clone(self);
        with_buffer(self.host.as_ref(), move |buffer| {
            let text_len = buffer.text_len();
            buffer.clear_style_range(previous, 0, text_len);
            for m in read_lock(&inner.store).matches() {
                if m.end_index() <= text_len {
                    buffer.paint_style_range(current, m.start_index, m.len());
                }
            }
        })
    }
}

/// Configures a [`UrlEngine`] before it registers with its supervisor.
pub struct EngineBuilder {
    host: Arc<dyn BufferHost>,
    settings: EngineSettings,
    supervisor: Option<Arc<Supervisor>>,
    time: Option<SharedTimeSource>,
    reporter: Option<ErrorReporter>,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn supervisor(mut self, supervisor: Arc<Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn time_source(mut self, time: SharedTimeSource) -> Self {
        self.time = Some(time);
        self
    }

    pub fn error_reporter(mut self, reporter: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Registers the engine; its worker starts right away if the supervisor
    /// has background scheduling on.
    pub fn build(self) -> Result<UrlEngine> {
        let time = self.time.unwrap_or_else(RealTimeSource::shared);
        let supervisor = self.supervisor.unwrap_or_else(Supervisor::global);
        let settings = self.settings;

        let inner = Arc::new(EngineInner {
            host: self.host,
            state: Mutex::new(EngineState {
                schedule: ScanSchedule::new(&settings, time.now()),
                styles: StyleChannels::from_settings(&settings),
                patterns: settings.patterns,
                display_length: settings.display_length,
                poll_quantum: settings.poll_quantum,
                stop_policy: settings.stop_policy,
            }),
            time,
            store: RwLock::new(AnnotationStore::default()),
            scan_lock: Mutex::new(()),
            worker: Mutex::new(WorkerSlot::Idle),
            reporter: RwLock::new(self.reporter),
            disposed: AtomicBool::new(false),
        });

        let key = supervisor.register(&inner)?;
        info!(?key, patterns = ?settings.patterns, full_document = settings.full_document, "url engine created");
        Ok(UrlEngine {
            inner,
            supervisor,
            key,
            disposed: false,
        })
    }
}

/// Keeps the URL and email highlighting of one buffer up to date.
///
/// Dispose the engine (or drop it) on the buffer's owning thread: teardown
/// waits for the worker and clears the paint through the host.
pub struct UrlEngine {
    inner: Arc<EngineInner>,
    supervisor: Arc<Supervisor>,
    key: EngineKey,
    disposed: bool,
}

impl std::fmt::Debug for UrlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlEngine")
            .field("key", &self.key)
            .field("state", &self.scheduler_state())
            .finish_non_exhaustive()
    }
}

impl UrlEngine {
    /// An engine with default settings under [`Supervisor::global`].
    pub fn new(host: Arc<dyn BufferHost>) -> Result<Self> {
        Self::builder(host).build()
    }

    pub fn builder(host: Arc<dyn BufferHost>) -> EngineBuilder {
        EngineBuilder {
            host,
            settings: EngineSettings::default(),
            supervisor: None,
            time: None,
            reporter: None,
        }
    }

    pub fn key(&self) -> EngineKey {
        self.key
    }

    // ── Notifications ───────────────────────────────────────────

    pub fn notify_text_changed(&self) {
        let now = self.inner.time.now();
        lock(&self.inner.state).schedule.mark_content_dirty(now);
    }

    pub fn notify_viewport_changed(&self) {
        let now = self.inner.time.now();
        lock(&self.inner.state).schedule.mark_viewport_dirty(now);
    }

    /// Pauses scanning, e.g. around a bulk edit. Flags keep accumulating.
    pub fn suspend(&self) {
        lock(&self.inner.state).schedule.suspend();
    }

    pub fn resume(&self) {
        lock(&self.inner.state).schedule.resume();
    }

    // ── Scanning ────────────────────────────────────────────────

    /// Runs the scheduler's decision once on the calling thread. For hosts
    /// that drive scanning from their own timer instead of a worker.
    pub fn tick(&self) -> Result<Option<ScanOutcome>> {
        let now = self.inner.time.now();
        let Some(request) = lock(&self.inner.state).schedule.poll(now) else {
            return Ok(None);
        };
        let _scan = self.inner.acquire_scan_lock();
        self.inner.run_pass(request).map(Some)
    }

    /// Scans and repaints the whole document now, whatever the flags say.
    pub fn mark_urls(&self) -> Result<ScanOutcome> {
        let _scan = self.inner.acquire_scan_lock();
        let request = lock(&self.inner.state).schedule.take_manual();
        self.inner.run_pass(request)
    }

    /// Removes all URL paint and forgets the published matches.
    pub fn clear_indicators(&self) -> Result<()> {
        let _scan = self.inner.acquire_scan_lock();
        self.inner.clear_indicators()
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn match_at(&self, position: usize) -> Option<UrlMatch> {
        read_lock(&self.inner.store).match_at(position).cloned()
    }

    pub fn matches(&self) -> Vec<UrlMatch> {
        read_lock(&self.inner.store).matches().to_vec()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        if self.inner.disposed.load(Ordering::Acquire) {
            return SchedulerState::Stopped;
        }
        match *lock(&self.inner.worker) {
            WorkerSlot::Idle => SchedulerState::Idle,
            WorkerSlot::Abandoned => SchedulerState::Abandoned,
            WorkerSlot::Running(_) if lock(&self.inner.state).schedule.is_suspended() => {
                SchedulerState::Suspended
            }
            WorkerSlot::Running(_) => SchedulerState::Running,
        }
    }

    pub fn set_error_reporter(&self, reporter: impl Fn(&Error) + Send + Sync + 'static) {
        *write_lock(&self.inner.reporter) = Some(Arc::new(reporter));
    }

    /// Current settings, clear channels included.
    pub fn settings(&self) -> EngineSettings {
        let state = lock(&self.inner.state);
        EngineSettings {
            content_interval: state.schedule.content_interval(),
            viewport_interval: state.schedule.viewport_interval(),
            full_document: state.schedule.full_document(),
            patterns: state.patterns,
            url_channel: state.styles.url,
            text_channel: state.styles.text,
            clear_channels: state.styles.clear.clone(),
            display_length: state.display_length,
            poll_quantum: state.poll_quantum,
            stop_policy: state.stop_policy,
        }
    }

    // ── Settings ────────────────────────────────────────────────

    pub fn set_content_interval(&self, interval: Duration) -> Result<()> {
        lock(&self.inner.state).schedule.set_content_interval(interval);
        self.apply_config_change(ConfigField::ContentInterval)
    }

    pub fn set_viewport_interval(&self, interval: Duration) -> Result<()> {
        lock(&self.inner.state).schedule.set_viewport_interval(interval);
        self.apply_config_change(ConfigField::ViewportInterval)
    }

    pub fn set_full_document(&self, full_document: bool) -> Result<()> {
        lock(&self.inner.state).schedule.set_full_document(full_document);
        self.apply_config_change(ConfigField::FullDocument)
    }

    pub fn set_patterns(&self, patterns: PatternKind) -> Result<()> {
        lock(&self.inner.state).patterns = patterns;
        self.apply_config_change(ConfigField::Patterns)
    }

    /// Fails with [`Error::ChannelOutOfRange`] and changes nothing if `id`
    /// is above 31.
    pub fn set_url_channel(&self, id: u32) -> Result<()> {
        let channel = StyleChannel::new(id)?;
        let previous = std::mem::replace(&mut lock(&self.inner.state).styles.url, channel);
        if previous == channel {
            return Ok(());
        }
        self.apply_config_change(ConfigField::UrlChannel { previous })
    }

    pub fn set_text_channel(&self, id: u32) -> Result<()> {
        let channel = StyleChannel::new(id)?;
        let previous = std::mem::replace(&mut lock(&self.inner.state).styles.text, channel);
        if previous == channel {
            return Ok(());
        }
        self.apply_config_change(ConfigField::TextChannel { previous })
    }

    /// Adds a channel to clear under every match. Duplicates are ignored.
    pub fn append_clear_channel(&self, id: u32) -> Result<()> {
        let added = lock(&self.inner.state).styles.append_clear_id(id)?;
        if !added {
            return Ok(());
        }
        self.apply_config_change(ConfigField::ClearChannels)
    }

    pub fn clear_append_channels(&self) -> Result<()> {
        lock(&self.inner.state).styles.clear.clear();
        self.apply_config_change(ConfigField::ClearChannels)
    }

    /// `None` shows links in full.
    pub fn set_display_length(&self, display_length: Option<usize>) -> Result<()> {
        lock(&self.inner.state).display_length = display_length;
        self.apply_config_change(ConfigField::DisplayLength)
    }

    pub fn set_poll_quantum(&self, quantum: Duration) -> Result<()> {
        if quantum.is_zero() {
            return Err(Error::Config("poll quantum must be positive".into()));
        }
        lock(&self.inner.state).poll_quantum = quantum;
        self.apply_config_change(ConfigField::PollQuantum)
    }

    pub fn set_stop_policy(&self, policy: StopPolicy) -> Result<()> {
        lock(&self.inner.state).stop_policy = policy;
        self.apply_config_change(ConfigField::StopPolicy)
    }

    /// Carries out the side effects of a setting that already changed.
    ///
    /// Interval changes restart the debounce window. Mode, pattern and
    /// clear-channel changes schedule a rescan. A URL channel change moves
    /// the existing paint to the new channel at once.
    pub fn apply_config_change(&self, field: ConfigField) -> Result<()> {
        let now = self.inner.time.now();
        debug!(?field, "config changed");
        match field {
            ConfigField::ContentInterval | ConfigField::ViewportInterval => {
                lock(&self.inner.state).schedule.reset_window(now);
            }
            ConfigField::FullDocument | ConfigField::Patterns | ConfigField::ClearChannels => {
                lock(&self.inner.state).schedule.request_rescan(now);
            }
            ConfigField::UrlChannel { previous } => {
                let current = lock(&self.inner.state).styles.url;
                self.inner.repaint_channel(previous, current)?;
                lock(&self.inner.state).schedule.request_rescan(now);
            }
            ConfigField::TextChannel { previous } => {
                let current = lock(&self.inner.state).styles.text;
                self.inner.repaint_channel(previous, current)?;
                lock(&self.inner.state).schedule.request_rescan(now);
            }
            ConfigField::DisplayLength => {
                let display_length = lock(&self.inner.state).display_length;
                write_lock(&self.inner.store).set_display_length(display_length);
            }
            ConfigField::PollQuantum | ConfigField::StopPolicy => {}
        }
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Stops the worker, leaves the supervisor and clears the paint. Later
    /// calls do nothing.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let stopped = self.supervisor.unregister(self.key, &self.inner);
        self.inner.disposed.store(true, Ordering::Release);
        let cleared = {
            let _scan = self.inner.acquire_scan_lock();
            self.inner.clear_indicators()
        };
        info!(key = ?self.key, "url engine disposed");
        stopped.and(cleared)
    }
}

impl Drop for UrlEngine {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            debug!(%err, "dispose during drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ChannelHost;
    use crate::model::buffer::RopeBuffer;
    use crate::time_source::TestTimeSource;

    const SAMPLE: &str = "Visit http://example.com/page or email me at a@b.com";

    struct Fixture {
        host: Arc<ChannelHost<RopeBuffer>>,
        clock: Arc<TestTimeSource>,
        engine: UrlEngine,
        errors: Arc<Mutex<Vec<Error>>>,
    }

    fn fixture(text: &str, settings: EngineSettings) -> Fixture {
        let host = Arc::new(ChannelHost::new(RopeBuffer::from_text(text)));
        let clock = TestTimeSource::shared();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let engine = UrlEngine::builder(host.clone())
            .settings(settings)
            .supervisor(Arc::new(Supervisor::new(false)))
            .time_source(clock.clone())
            .error_reporter(move |err| sink.lock().unwrap().push(err.clone()))
            .build()
            .unwrap();
        Fixture {
            host,
            clock,
            engine,
            errors,
        }
    }

    fn painted(host: &ChannelHost<RopeBuffer>, channel: StyleChannel) -> Vec<Range<usize>> {
        host.buffer().styles.ranges(channel).to_vec()
    }

    #[test]
    fn sample_document_gets_two_annotations() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_millis(501));

        let outcome = f.engine.tick().unwrap();
        assert_eq!(outcome, Some(ScanOutcome::Applied { matches: 2 }));

        let matches = f.engine.matches();
        assert_eq!(matches[0].start_index, 6);
        assert_eq!(matches[0].contents, "http://example.com/page");
        assert!(!matches[0].is_mail_to_link);
        assert_eq!(matches[1].start_index, 45);
        assert!(matches[1].is_mail_to_link);
        assert_eq!(matches[1].tidy_contents(), "mailto:a@b.com");

        for channel in [StyleChannel::URL, StyleChannel::URL_TEXT] {
            assert_eq!(painted(&f.host, channel), vec![6..29, 45..52]);
        }
        assert_eq!(f.engine.match_at(10).unwrap().start_index, 6);
        assert!(f.engine.match_at(40).is_none());
    }

    #[test]
    fn tick_respects_debounce() {
        let f = fixture(SAMPLE, EngineSettings::default());
        assert_eq!(f.engine.tick().unwrap(), None);

        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_millis(400));
        assert_eq!(f.engine.tick().unwrap(), None);

        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_millis(400));
        assert_eq!(f.engine.tick().unwrap(), None);

        f.clock.advance(Duration::from_millis(200));
        assert!(f.engine.tick().unwrap().is_some());
        assert_eq!(f.engine.tick().unwrap(), None);
    }

    #[test]
    fn rescan_replaces_previous_matches() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.mark_urls().unwrap();

        f.host.buffer().set_text("nothing here but www.rust-lang.org");
        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_millis(501));
        f.engine.tick().unwrap();

        let matches = f.engine.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].contents, "www.rust-lang.org");
        assert_eq!(painted(&f.host, StyleChannel::URL), vec![17..34]);
    }

    #[test]
    fn visible_mode_scans_only_the_viewport() {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("line {i} www.site{i}.com\n"));
        }
        let settings = EngineSettings {
            full_document: false,
            ..EngineSettings::default()
        };
        let f = fixture(&text, settings);
        {
            let mut buffer = f.host.buffer();
            buffer.viewport.height = 5;
            buffer.scroll_to(10);
        }
        f.engine.notify_viewport_changed();
        f.clock.advance(Duration::from_millis(286));
        assert!(f.engine.tick().unwrap().is_some());

        let matches = f.engine.matches();
        let contents: Vec<&str> = matches.iter().map(|m| m.contents.as_str()).collect();
        assert_eq!(
            contents,
            ["www.site10.com", "www.site11.com", "www.site12.com", "www.site13.com", "www.site14.com"]
        );
        let line_10 = f.host.buffer().line_start_offset(10);
        assert_eq!(matches[0].start_index, line_10 + "line 10 ".len());

        // Scrolling away repaints the new window and drops the old paint.
        f.host.buffer().scroll_to(30);
        f.engine.notify_viewport_changed();
        f.clock.advance(Duration::from_millis(286));
        f.engine.tick().unwrap();
        assert_eq!(f.engine.matches()[0].contents, "www.site30.com");
        assert_eq!(painted(&f.host, StyleChannel::URL).len(), 5);
    }

    #[test]
    fn text_change_in_visible_mode_rescans_whole_document() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("line {i} www.site{i}.com\n"));
        }
        let settings = EngineSettings {
            full_document: false,
            ..EngineSettings::default()
        };
        let f = fixture(&text, settings);
        f.host.buffer().viewport.height = 5;

        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_millis(501));
        assert!(f.engine.tick().unwrap().is_some());
        assert_eq!(f.engine.matches().len(), 20);
        assert_eq!(painted(&f.host, StyleChannel::URL).len(), 20);
    }

    #[test]
    fn out_of_range_channel_changes_nothing() {
        let f = fixture(SAMPLE, EngineSettings::default());
        assert!(matches!(
            f.engine.set_url_channel(32),
            Err(Error::ChannelOutOfRange(32))
        ));
        assert!(f.engine.append_clear_channel(99).is_err());
        let settings = f.engine.settings();
        assert_eq!(settings.url_channel, StyleChannel::URL);
        assert!(settings.clear_channels.is_empty());
    }

    #[test]
    fn channel_change_moves_paint() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.mark_urls().unwrap();

        f.engine.set_url_channel(5).unwrap();
        let five = StyleChannel::new(5).unwrap();
        assert!(painted(&f.host, StyleChannel::URL).is_empty());
        assert_eq!(painted(&f.host, five), vec![6..29, 45..52]);
        assert_eq!(painted(&f.host, StyleChannel::URL_TEXT), vec![6..29, 45..52]);
    }

    #[test]
    fn clear_channels_are_cleared_under_matches() {
        let f = fixture(SAMPLE, EngineSettings::default());
        let squiggle = StyleChannel::new(2).unwrap();
        f.host.buffer().paint_style_range(squiggle, 0, SAMPLE.len());

        f.engine.append_clear_channel(2).unwrap();
        f.engine.append_clear_channel(2).unwrap();
        assert_eq!(f.engine.settings().clear_channels.len(), 1);

        f.clock.advance(Duration::from_millis(501));
        f.engine.tick().unwrap();
        assert_eq!(painted(&f.host, squiggle), vec![0..6, 29..45]);
    }

    #[test]
    fn display_length_updates_published_matches() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.mark_urls().unwrap();
        f.engine.set_display_length(Some(10)).unwrap();
        assert_eq!(f.engine.matches()[0].human_readable_contents(), "htt...age");
        f.engine.set_display_length(None).unwrap();
        assert_eq!(
            f.engine.matches()[0].human_readable_contents(),
            "http://example.com/page"
        );
    }

    #[test]
    fn stale_result_is_not_painted() {
        let f = fixture(SAMPLE, EngineSettings::default());
        let snapshot = Snapshot {
            text: SAMPLE.to_string(),
            start: 0,
            generation: f.engine.inner.generation(),
        };
        f.engine.notify_text_changed();

        let found = scan_text(PatternSet::classic(), SAMPLE);
        let outcome = with_buffer(f.host.as_ref(), {
            let inner = Arc::clone(&f.engine.inner);
            move |buffer| inner.apply(buffer, &snapshot, &found)
        })
        .unwrap();
        assert_eq!(outcome, ScanOutcome::Stale);
        assert!(f.engine.matches().is_empty());
        assert!(painted(&f.host, StyleChannel::URL).is_empty());
    }

    #[test]
    fn failed_scan_is_reported_and_retried() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.host.close();

        // Off the owning thread the closed host refuses the read.
        let inner = Arc::clone(&f.engine.inner);
        let request = ScanRequest {
            trigger: Trigger::Content,
            region: ScanRegion::Document,
        };
        let result = thread::spawn(move || inner.run_pass(request))
            .join()
            .unwrap();

        assert!(matches!(result, Err(Error::OwnerGone)));
        assert!(matches!(f.errors.lock().unwrap().as_slice(), [Error::OwnerGone]));
        assert!(lock(&f.engine.inner.state).schedule.is_dirty());
    }

    #[test]
    fn suspended_engine_does_not_scan() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.suspend();
        f.engine.notify_text_changed();
        f.clock.advance(Duration::from_secs(5));
        assert_eq!(f.engine.tick().unwrap(), None);
        f.engine.resume();
        assert!(f.engine.tick().unwrap().is_some());
    }

    #[test]
    fn dispose_clears_paint_and_stops() {
        let mut f = fixture(SAMPLE, EngineSettings::default());
        f.engine.mark_urls().unwrap();
        assert_eq!(f.engine.scheduler_state(), SchedulerState::Idle);

        f.engine.dispose().unwrap();
        assert_eq!(f.engine.scheduler_state(), SchedulerState::Stopped);
        assert!(painted(&f.host, StyleChannel::URL).is_empty());
        assert!(f.engine.matches().is_empty());
        f.engine.dispose().unwrap();
    }

    #[test]
    fn clear_indicators_empties_store() {
        let f = fixture(SAMPLE, EngineSettings::default());
        f.engine.mark_urls().unwrap();
        f.engine.clear_indicators().unwrap();
        assert!(f.engine.matches().is_empty());
        assert!(painted(&f.host, StyleChannel::URL_TEXT).is_empty());
    }
}
