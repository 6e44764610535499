//! An open document: a shared timeline plus a serial work queue.
//!
//! Imports and exports run one at a time on the queue's worker thread.
//! Decoding happens outside the timeline lock; only the final placement
//! takes it. Submitting flips the timeline to
//! [`TimelineState::Processing`](crate::TimelineState::Processing)
//! immediately so callers see the busy signal before the job starts, and
//! it stays there until the last queued job has finished.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use trackdeck_core::Result;
use trackdeck_media::{AudioDecoder, ExportProgress, ExportSettings};
use uuid::Uuid;

use crate::serialization::DocumentFile;
use crate::timeline::{Timeline, TimelineError};

/// Timeline shared between the caller and the work queue.
pub type SharedTimeline = Arc<Mutex<Timeline>>;

type Job = Box<dyn FnOnce() + Send>;

enum QueueCommand {
    Run(Job),
    Shutdown,
}

/// Single-worker FIFO job queue.
pub struct WorkQueue {
    tx: Sender<QueueCommand>,
    handle: Option<JoinHandle<()>>,
}

impl WorkQueue {
    /// Start the worker thread.
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = unbounded::<QueueCommand>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for command in rx {
                    match command {
                        QueueCommand::Run(job) => job(),
                        QueueCommand::Shutdown => break,
                    }
                }
                debug!("Work queue drained");
            })?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Queue a job behind everything already submitted. Returns false once
    /// the queue has shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.handle.is_some() && self.tx.send(QueueCommand::Run(Box::new(job))).is_ok()
    }

    /// Block until every job submitted so far has run.
    pub fn flush(&self) {
        let (done_tx, done_rx) = bounded(1);
        if self.submit(move || {
            let _ = done_tx.send(());
        }) {
            let _ = done_rx.recv();
        }
    }

    /// Finish queued jobs and stop the worker.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(QueueCommand::Shutdown);
            if handle.join().is_err() {
                warn!("Work queue worker panicked");
            }
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Receivers for a queued export.
pub struct ExportJob {
    /// Progress reports, sent from the worker while it renders. The
    /// channel closes when the export ends.
    pub progress: Receiver<ExportProgress>,
    /// Frame count written, or `None` if the export failed.
    pub done: Receiver<Option<u64>>,
}

/// One open document.
pub struct Document {
    timeline: SharedTimeline,
    decoder: Arc<dyn AudioDecoder>,
    queue: WorkQueue,
}

impl Document {
    pub fn new(timeline: Timeline, decoder: Arc<dyn AudioDecoder>) -> Result<Self> {
        Ok(Self {
            timeline: Arc::new(Mutex::new(timeline)),
            decoder,
            queue: WorkQueue::spawn("trackdeck-work")?,
        })
    }

    pub fn timeline(&self) -> &SharedTimeline {
        &self.timeline
    }

    pub fn decoder(&self) -> &Arc<dyn AudioDecoder> {
        &self.decoder
    }

    /// Queue an import. The receiver yields the new clip's ID, or `None`
    /// if the import failed (see [`Timeline::last_error`]).
    pub fn import(
        &self,
        locator: impl Into<PathBuf>,
        start_time: f64,
        track_id: Option<Uuid>,
    ) -> Receiver<Option<Uuid>> {
        let locator = locator.into();
        let (tx, rx) = bounded(1);
        self.timeline.lock().begin_processing();

        let timeline = Arc::clone(&self.timeline);
        let decoder = Arc::clone(&self.decoder);
        let submitted = self.queue.submit(move || {
            let decoded = decoder.decode(&locator);
            let clip = timeline
                .lock()
                .finish_import(&locator, decoded, start_time, track_id);
            let _ = tx.send(clip);
        });
        if !submitted {
            self.abandon(TimelineError::Decode {
                locator: String::new(),
                message: "work queue closed".into(),
            });
        }
        rx
    }

    /// Queue an export. Progress arrives over a channel rather than a
    /// callback because the worker holds the timeline lock while it
    /// renders.
    pub fn export(&self, settings: ExportSettings) -> ExportJob {
        let (tx, done) = bounded(1);
        let (progress_tx, progress) = unbounded();
        self.timeline.lock().begin_processing();

        let timeline = Arc::clone(&self.timeline);
        let submitted = self.queue.submit(move || {
            info!("Exporting to {}", settings.path.display());
            let frames = timeline.lock().run_export(&settings, |p| {
                let _ = progress_tx.send(p);
            });
            drop(progress_tx);
            let _ = tx.send(frames);
        });
        if !submitted {
            self.abandon(TimelineError::Export("work queue closed".into()));
        }
        ExportJob { progress, done }
    }

    fn abandon(&self, error: TimelineError) {
        warn!("Work queue closed, job dropped");
        self.timeline.lock().abort_processing(error);
    }

    /// Wait for every queued import and export to finish.
    pub fn wait_idle(&self) {
        self.queue.flush();
    }

    /// Save the current tracks to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.wait_idle();
        let document = self.timeline.lock().to_document();
        document.save_to_file(path)?;
        info!("Saved {} ({} clips)", path.display(), document.clip_count());
        Ok(())
    }

    /// Replace the timeline with the document at `path`. Returns the clips
    /// that could not be decoded.
    pub fn open(&self, path: &Path) -> Result<Vec<TimelineError>> {
        let document = DocumentFile::load_from_file(path)?;
        self.wait_idle();
        let errors = self
            .timeline
            .lock()
            .load_document(&document, self.decoder.as_ref());
        Ok(errors)
    }
}
