//! The swarm node
//!
//! A [`Peer`] serves blobs it holds over the secure channel, fetches blobs
//! it lacks from other peers, publishes its own channel and follows the
//! channels it subscribes to. [`spawn`] runs the accept loop together with
//! the background job worker until shutdown is signalled.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch::Receiver as WatchReceiver;

mod blacklist;
mod fetch;
mod handler;
mod jobs;
#[allow(clippy::module_inception)]
mod peer;
mod pex;
mod seed;
mod sync;

pub use blacklist::{Blacklist, BLACKLIST_COOLDOWN};
pub use handler::NOT_A_GATEWAY;
pub use jobs::{Job, JobDispatcher, JobReceiver};
pub use peer::{Peer, PeerBuilder, PeerError};
pub use pex::{PexCache, DEFAULT_MAX_BLOBS, DEFAULT_MAX_PEERS_PER_BLOB};

/// How often every held blob is announced to the DHT again
pub const REANNOUNCE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run `peer` until `shutdown_rx` fires
///
/// Must be called on the peer returned by [`PeerBuilder::build`]; clones do
/// not carry the listener or the job receiver.
pub async fn spawn(mut peer: Peer, mut shutdown_rx: WatchReceiver<()>) -> Result<(), PeerError> {
    let listener = peer
        .take_listener()
        .ok_or_else(|| anyhow::anyhow!("peer listener already taken"))?;
    let job_receiver = peer
        .take_job_receiver()
        .ok_or_else(|| anyhow::anyhow!("peer job receiver already taken"))?;

    let worker = tokio::spawn(peer.clone().run_worker(job_receiver, shutdown_rx.clone()));
    tracing::info!("PEER: accepting connections on {}", peer.local_addr());

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let _ = stream.set_nodelay(true);
                    let peer = peer.clone();
                    tokio::spawn(async move {
                        match handler::handle_connection(peer, stream).await {
                            Ok(()) => tracing::debug!("PEER: connection from {} closed", remote),
                            Err(e) => tracing::debug!("PEER: connection from {} ended: {}", remote, e),
                        }
                    });
                }
                Err(e) => tracing::warn!("PEER: accept failed: {}", e),
            },
            _ = shutdown_rx.changed() => {
                tracing::info!("PEER: shutdown signalled, no longer accepting connections");
                break;
            }
        }
    }

    if let Err(e) = worker.await {
        tracing::error!("PEER: job worker panicked: {}", e);
    }
    Ok(())
}

impl Peer {
    /// Run the background job worker
    ///
    /// Processes queued jobs and re-announces held blobs every
    /// [`REANNOUNCE_INTERVAL`] until shutdown or until every dispatcher is
    /// dropped.
    pub async fn run_worker(self, job_receiver: JobReceiver, mut shutdown_rx: WatchReceiver<()>) {
        let mut stream = job_receiver.into_async();

        let mut reannounce = tokio::time::interval(REANNOUNCE_INTERVAL);
        // skip the immediate first tick
        reannounce.tick().await;

        loop {
            tokio::select! {
                job = stream.next() => match job {
                    Some(job) => self.run_job(job).await,
                    None => break,
                },
                _ = reannounce.tick() => {
                    self.reannounce_all().await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }
        tracing::info!("JOB_WORKER: stopped");
    }

    async fn run_job(&self, job: Job) {
        match job {
            Job::PollSubscription { public_key } => {
                tracing::info!("JOB_WORKER: Processing poll for {}", public_key);
                if let Err(e) = self.poll_subscription(&public_key).await {
                    tracing::error!("JOB_WORKER: poll for {} failed: {}", public_key, e);
                }
            }
            Job::FetchFile { entry } => {
                tracing::info!("JOB_WORKER: Processing fetch of {}", entry.name);
                if let Err(e) = self.download_file(&entry).await {
                    tracing::error!("JOB_WORKER: fetch of {} failed: {}", entry.name, e);
                }
            }
            Job::Reannounce => {
                self.reannounce_all().await;
            }
        }
    }
}
