//! The seam between the engine and the editor that owns the text.
//!
//! The editor's buffer is single-threaded: every read and every paint call
//! has to happen on the thread that owns it. [`BufferHost`] is how the scan
//! worker gets there. It hands a [`BufferJob`] to the owning thread and waits
//! for it to finish.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result, panic_message};
use crate::lock;
use crate::model::channel::StyleChannel;

/// What the engine needs from an editor buffer. Offsets are byte offsets.
pub trait TextBuffer {
    fn text(&self) -> String;

    fn text_len(&self) -> usize;

    /// Text of `[start, start + len)`, clamped to the buffer.
    fn text_range(&self, start: usize, len: usize) -> String {
        let text = self.text();
        let end = start.saturating_add(len).min(text.len());
        text.get(start.min(end)..end).unwrap_or_default().to_string()
    }

    fn line_count(&self) -> usize;

    /// `(first_line, line_count)` of the lines currently on screen.
    fn visible_line_range(&self) -> (usize, usize);

    fn line_start_offset(&self, line: usize) -> usize;

    /// Length of `line` including its terminator.
    fn line_len(&self, line: usize) -> usize;

    fn clear_style_range(&mut self, channel: StyleChannel, start: usize, len: usize);

    fn paint_style_range(&mut self, channel: StyleChannel, start: usize, len: usize);
}

pub type BufferJob = Box<dyn FnOnce(&mut dyn TextBuffer) + Send>;

/// Runs buffer work on the buffer's owning thread.
pub trait BufferHost: Send + Sync {
    fn is_on_owning_thread(&self) -> bool;

    /// Queues `job` for the owning thread and blocks until it has run.
    fn run_on_owning_thread(&self, job: BufferJob) -> Result<()>;

    /// Runs `job` on the calling thread, which must be the owning thread.
    fn run_here(&self, job: BufferJob) -> Result<()>;

    /// Runs queued jobs if called on the owning thread. The engine calls this
    /// while the owning thread waits on the scan worker.
    fn pump_pending(&self) {}
}

/// Runs `f` against the buffer on its owning thread and returns its result.
pub fn with_buffer<R, F>(host: &dyn BufferHost, f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&mut dyn TextBuffer) -> R + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let job: BufferJob = Box::new(move |buffer| {
        let _ = tx.send(f(buffer));
    });

    if host.is_on_owning_thread() {
        host.run_here(job)?;
    } else {
        host.run_on_owning_thread(job)?;
    }

    rx.try_recv()
        .map_err(|_| Error::BufferJob("job completed without a result".into()))
}

struct Pending {
    job: BufferJob,
    done: mpsc::SyncSender<Result<()>>,
}

pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// A [`BufferHost`] for buffers owned by one thread that pumps a job queue,
/// the way a UI event loop would.
///
/// The thread that creates the host is its owner. Jobs from other threads
/// queue up until the owner calls [`ChannelHost::pump`]; an optional waker
/// lets the owner's event loop know there is something to pump.
pub struct ChannelHost<B> {
    buffer: Mutex<B>,
    owner: ThreadId,
    jobs_tx: mpsc::Sender<Pending>,
    jobs_rx: Mutex<mpsc::Receiver<Pending>>,
    waker: Option<Waker>,
    closed: AtomicBool,
}

impl<B> std::fmt::Debug for ChannelHost<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHost")
            .field("owner", &self.owner)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B: TextBuffer + Send + 'static> ChannelHost<B> {
    pub fn new(buffer: B) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        Self {
            buffer: Mutex::new(buffer),
            owner: thread::current().id(),
            jobs_tx,
            jobs_rx: Mutex::new(jobs_rx),
            waker: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_waker(mut self, waker: Waker) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Direct access for the owner, e.g. to edit the text. Do not hold the
    /// guard across calls into the engine.
    pub fn buffer(&self) -> MutexGuard<'_, B> {
        lock(&self.buffer)
    }

    /// Runs every queued job. Returns how many ran; zero off the owning thread.
    pub fn pump(&self) -> usize {
        if !self.is_on_owning_thread() {
            return 0;
        }

        let mut ran = 0;
        loop {
            let next = lock(&self.jobs_rx).try_recv();
            let Ok(pending) = next else {
                break;
            };
            let result = self.execute(pending.job);
            let _ = pending.done.send(result);
            ran += 1;
        }
        ran
    }

    /// Refuses further jobs and fails the queued ones with [`Error::OwnerGone`].
    /// Call before the owning thread stops pumping for good.
    pub fn close(&self) {
        let rx = lock(&self.jobs_rx);
        self.closed.store(true, Ordering::Release);
        while let Ok(pending) = rx.try_recv() {
            let _ = pending.done.send(Err(Error::OwnerGone));
        }
    }

    fn execute(&self, job: BufferJob) -> Result<()> {
        let mut buffer = lock(&self.buffer);
        catch_unwind(AssertUnwindSafe(|| job(&mut *buffer)))
            .map_err(|payload| Error::BufferJob(panic_message(payload.as_ref())))
    }
}

impl<B: TextBuffer + Send + 'static> BufferHost for ChannelHost<B> {
    fn is_on_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn run_on_owning_thread(&self, job: BufferJob) -> Result<()> {
        if self.is_on_owning_thread() {
            return self.execute(job);
        }
        let (done, wait) = mpsc::sync_channel(1);
        {
            // Checked under the queue lock so `close` either rejects this job
            // or drains it.
            let _queue = lock(&self.jobs_rx);
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::OwnerGone);
            }
            self.jobs_tx
                .send(Pending { job, done })
                .map_err(|_| Error::OwnerGone)?;
        }
        if let Some(waker) = &self.waker {
            waker();
        }
        wait.recv().map_err(|_| Error::OwnerGone)?
    }

    fn run_here(&self, job: BufferJob) -> Result<()> {
        self.execute(job)
    }

    fn pump_pending(&self) {
        self.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::buffer::RopeBuffer;

    #[test]
    fn owner_runs_jobs_inline() {
        let host = ChannelHost::new(RopeBuffer::from_text("hello"));
        let len = with_buffer(&host, |b| b.text_len()).unwrap();
        assert_eq!(len, 5);
        assert_eq!(host.pump(), 0);
    }

    #[test]
    fn other_threads_wait_for_pump() {
        let host = Arc::new(ChannelHost::new(RopeBuffer::from_text("hello world")));
        let remote = Arc::clone(&host);
        let handle = thread::spawn(move || with_buffer(&*remote, |b| b.text_range(6, 5)));

        let mut ran = 0;
        while !handle.is_finished() {
            ran += host.pump();
            thread::yield_now();
        }
        assert_eq!(ran, 1);
        assert_eq!(handle.join().unwrap().unwrap(), "world");
    }

    #[test]
    fn panicking_job_becomes_error() {
        let host = ChannelHost::new(RopeBuffer::from_text("x"));
        let result = with_buffer(&host, |_| -> usize { panic!("boom") });
        assert!(matches!(result, Err(Error::BufferJob(msg)) if msg == "boom"));
    }

    #[test]
    fn closed_host_rejects_remote_jobs() {
        let host = Arc::new(ChannelHost::new(RopeBuffer::from_text("x")));
        host.close();
        let remote = Arc::clone(&host);
        let result = thread::spawn(move || with_buffer(&*remote, |b| b.text_len()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(Error::OwnerGone)));
    }

    #[test]
    fn close_fails_jobs_already_queued() {
        let (queued_tx, queued_rx) = mpsc::channel();
        let waker: Waker = Arc::new(move || {
            let _ = queued_tx.send(());
        });
        let host = Arc::new(ChannelHost::new(RopeBuffer::from_text("x")).with_waker(waker));
        let remote = Arc::clone(&host);
        let handle = thread::spawn(move || with_buffer(&*remote, |b| b.text_len()));

        queued_rx.recv().unwrap();
        host.close();
        assert!(matches!(handle.join().unwrap(), Err(Error::OwnerGone)));
        assert_eq!(host.pump(), 0);
    }

    #[test]
    fn default_text_range_clamps() {
        struct Plain(String);
        impl TextBuffer for Plain {
            fn text(&self) -> String {
                self.0.clone()
            }
            fn text_len(&self) -> usize {
                self.0.len()
            }
            fn line_count(&self) -> usize {
                1
            }
            fn visible_line_range(&self) -> (usize, usize) {
                (0, 1)
            }
            fn line_start_offset(&self, _line: usize) -> usize {
                0
            }
            fn line_len(&self, _line: usize) -> usize {
                self.0.len()
            }
            fn clear_style_range(&mut self, _: StyleChannel, _: usize, _: usize) {}
            fn paint_style_range(&mut self, _: StyleChannel, _: usize, _: usize) {}
        }

        let plain = Plain("abcdef".into());
        assert_eq!(plain.text_range(2, 3), "cde");
        assert_eq!(plain.text_range(4, 100), "ef");
        assert_eq!(plain.text_range(10, 2), "");
    }
}
