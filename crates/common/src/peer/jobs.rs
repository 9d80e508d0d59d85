//! Background job dispatcher for peer operations
//!
//! A lightweight job queue over flume channels. Connection handlers and
//! timers hand work to a single worker task instead of doing potentially
//! long-running network operations inline.

use anyhow::Result;

use crate::crypto::PublicKey;
use crate::storage::FileEntry;

/// Background jobs that can be dispatched to the peer worker
#[derive(Debug, Clone)]
pub enum Job {
    /// Fetch the latest manifest for a subscribed channel
    ///
    /// Dispatched when gossip advertises a sequence newer than ours.
    PollSubscription { public_key: PublicKey },

    /// Download every chunk of a file so this node can seed it
    FetchFile { entry: FileEntry },

    /// Re-announce every held blob to the DHT
    Reannounce,
}

/// Job dispatcher that can be cloned and shared across tasks
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    tx: flume::Sender<Job>,
}

impl JobDispatcher {
    /// Create a new job dispatcher and receiver pair
    ///
    /// The dispatcher can be cloned and shared, while the receiver should be
    /// given to the worker task.
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, JobReceiver { rx })
    }

    /// Dispatch a job to the background worker
    ///
    /// Non-blocking; fails only if the receiver has been dropped.
    pub fn dispatch(&self, job: Job) -> Result<()> {
        tracing::info!("JOB_DISPATCHER: Dispatching job: {:?}", job);
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("job receiver has been dropped"))
    }

    pub fn dispatch_poll(&self, public_key: PublicKey) -> Result<()> {
        self.dispatch(Job::PollSubscription { public_key })
    }

    pub fn dispatch_fetch(&self, entry: FileEntry) -> Result<()> {
        self.dispatch(Job::FetchFile { entry })
    }
}

/// Job receiver for the background worker
#[derive(Debug)]
pub struct JobReceiver {
    rx: flume::Receiver<Job>,
}

impl JobReceiver {
    /// Try to receive a job without blocking
    pub fn try_recv(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    /// Get an async stream of jobs for the worker loop
    pub fn into_async(self) -> flume::r#async::RecvStream<'static, Job> {
        self.rx.into_stream()
    }
}
