//! Background-worker collector wrapper

use super::{Collector, CollectorInfo};
use crate::{CancelToken, Document, FtdcError, Result};
use bytes::Bytes;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

enum Message {
    Sample(Document),
    /// Acknowledged once every message queued before it has been applied
    Flush(Sender<()>),
}

/// State the worker and the producer side both touch
struct Shared<C> {
    inner: Mutex<C>,
    errors: Mutex<Vec<FtdcError>>,
    /// Samples accepted by `add` but not yet applied to `inner`
    pending: AtomicUsize,
}

impl<C: Collector> Shared<C> {
    fn apply(&self, message: Message) {
        match message {
            Message::Sample(sample) => {
                let mut inner = self.inner.lock();
                let added = inner.add(sample);
                // under the lock so `info` never counts a sample twice
                self.pending.fetch_sub(1, Ordering::AcqRel);
                drop(inner);

                if let Err(e) = added {
                    warn!(error = %e, "buffered collector failed to add sample");
                    self.errors.lock().push(e);
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Decouples producers from the wrapped collector with a bounded queue and
/// one worker thread
///
/// `add` enqueues and returns, blocking while the queue is full until space
/// frees up or the cancel token fires. Errors from the wrapped collector are
/// recorded by the worker and reported by the next `resolve` until `reset`.
/// Samples that reach the queue are never lost: whatever the worker leaves
/// behind on cancellation is applied when it is joined.
pub struct BufferedCollector<C: Collector> {
    shared: Arc<Shared<C>>,
    pipe: Option<Sender<Message>>,
    /// Second handle on the queue, drained after the worker is joined
    backlog: Receiver<Message>,
    worker: Option<JoinHandle<()>>,
    /// Disconnects once the worker thread has exited for any reason
    exited: Receiver<()>,
    cancel: CancelToken,
    cancelled: Receiver<()>,
}

impl<C: Collector + Send + 'static> BufferedCollector<C> {
    /// Start the worker; `queue_size` bounds the number of pending samples
    pub fn new(cancel: CancelToken, queue_size: usize, inner: C) -> Result<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            errors: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
        });
        let (sender, receiver) = bounded(queue_size);
        let (alive, exited) = bounded::<()>(0);

        let worker = {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let cancelled = cancel.receiver().clone();
            thread::Builder::new()
                .name("ftdc-buffered".into())
                .spawn(move || {
                    let _alive = alive;
                    run_worker(&shared, &receiver, &cancelled);
                })?
        };

        Ok(Self {
            shared,
            pipe: Some(sender),
            backlog: receiver,
            worker: Some(worker),
            exited,
            cancelled: cancel.receiver().clone(),
            cancel,
        })
    }
}

impl<C: Collector> BufferedCollector<C> {
    /// Stop accepting samples, let the worker apply what is queued and
    /// wait for it to exit
    pub fn close(&mut self) {
        self.pipe = None;
        self.join();
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_none()
    }

    fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                self.shared
                    .errors
                    .lock()
                    .push(FtdcError::Background("worker thread panicked".into()));
            }
        }

        let leftover: Vec<Message> = self.backlog.try_iter().collect();
        if !leftover.is_empty() {
            debug!(
                leftover = leftover.len(),
                "applying samples queued after the worker exited"
            );
        }
        for message in leftover {
            self.shared.apply(message);
        }
    }

    fn enqueue(&mut self, sample: Document) -> Result<()> {
        let pipe = self
            .pipe
            .as_ref()
            .ok_or_else(|| FtdcError::Background("buffered collector is closed".into()))?;

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        let message = match pipe.try_send(Message::Sample(sample)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(message)) => message,
            Err(TrySendError::Disconnected(_)) => {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                return Err(FtdcError::Background("worker thread exited".into()));
            }
        };

        let sent = select! {
            send(pipe, message) -> res => match res {
                Ok(()) => Ok(()),
                Err(_) => Err(FtdcError::Background("worker thread exited".into())),
            },
            recv(self.cancelled) -> _ => Err(FtdcError::Cancelled),
            recv(self.exited) -> _ => Err(FtdcError::Background("worker thread exited".into())),
        };
        if sent.is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            if !self.cancel.is_cancelled() {
                self.join();
            }
        }
        sent
    }

    /// Wait until every sample queued so far has reached the wrapped
    /// collector
    fn sync(&mut self) {
        if self.cancel.is_cancelled() {
            self.join();
            return;
        }

        let pipe = match &self.pipe {
            Some(pipe) => pipe.clone(),
            None => return,
        };

        let cancelled = self.cancelled.clone();
        let exited = self.exited.clone();
        let (ack, acked) = bounded(1);
        let queued = select! {
            send(pipe, Message::Flush(ack)) -> res => res.is_ok(),
            recv(cancelled) -> _ => false,
            recv(exited) -> _ => false,
        };
        if !queued {
            self.join();
            return;
        }

        select! {
            recv(acked) -> _ => {}
            recv(cancelled) -> _ => self.join(),
            recv(exited) -> _ => self.join(),
        }
    }

    fn check_errors(&self) -> Result<()> {
        let errors = self.shared.errors.lock();
        if errors.is_empty() {
            return Ok(());
        }

        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(FtdcError::Background(messages.join("; ")))
    }
}

fn run_worker<C: Collector>(
    shared: &Shared<C>,
    pipe: &Receiver<Message>,
    cancelled: &Receiver<()>,
) {
    loop {
        select! {
            recv(pipe) -> message => match message {
                Ok(message) => shared.apply(message),
                Err(_) => {
                    debug!("buffered collector queue closed");
                    return;
                }
            },
            recv(cancelled) -> _ => {
                let pending: Vec<Message> = pipe.try_iter().collect();
                debug!(pending = pending.len(), "buffered collector cancelled, draining queue");
                for message in pending {
                    shared.apply(message);
                }
                return;
            }
        }
    }
}

impl<C: Collector> Collector for BufferedCollector<C> {
    fn set_metadata(&mut self, metadata: Document) {
        self.shared.inner.lock().set_metadata(metadata);
    }

    fn add(&mut self, sample: Document) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(FtdcError::Cancelled);
        }
        self.enqueue(sample)
    }

    fn resolve(&mut self) -> Result<Bytes> {
        self.sync();
        self.check_errors()?;
        self.shared.inner.lock().resolve()
    }

    fn reset(&mut self) {
        self.sync();
        self.shared.inner.lock().reset();
        self.shared.errors.lock().clear();
    }

    /// Counters of the wrapped collector, with samples still in the queue
    /// counted as collected
    fn info(&self) -> CollectorInfo {
        let mut info = self.shared.inner.lock().info();
        info.sample_count += self.shared.pending.load(Ordering::Acquire);
        info
    }
}

impl<C: Collector> Drop for BufferedCollector<C> {
    fn drop(&mut self) {
        self.close();
    }
}
