use crate::channel::{publish_via_gateway, Sequences};
use crate::crypto::{PublicKey, Secret};
use crate::manifest::{now_millis, ChannelView, Collection, Manifest, ManifestError};

use super::{Peer, PeerError};

impl Peer {
    /// Sign and publish a new manifest for our own channel
    ///
    /// The sequence is the current time in milliseconds, bumped past the
    /// last sequence we published so it always increases. With a `gateway`
    /// the manifest is relayed through that peer instead of written to our
    /// own DHT handle.
    pub async fn publish(
        &self,
        collections: Vec<Collection>,
        read_key: Option<&Secret>,
        gateway: Option<&str>,
    ) -> Result<Manifest, PeerError> {
        let last = *self.state.published.read();
        let sequence = match last {
            Some(last) => now_millis().max(last + 1),
            None => now_millis(),
        };

        let files: Vec<_> = collections
            .iter()
            .flat_map(|collection| collection.files().cloned())
            .collect();
        let manifest = Manifest::create(&self.secret_key, sequence, collections, read_key)?;

        match gateway {
            Some(gateway) => {
                tracing::info!("PUBLISH: relaying sequence {} via {}", sequence, gateway);
                publish_via_gateway(gateway, &manifest, self.proxy()).await?;
            }
            None => {
                let item = self.dht.put_manifest(&manifest).await?;
                tracing::info!("PUBLISH: stored sequence {} as item {}", sequence, item);
            }
        }

        *self.state.published.write() = Some(sequence);
        for entry in files {
            self.index_file(entry);
        }
        Ok(manifest)
    }

    /// Follow a channel; `read_key` opens it if the publisher encrypts
    pub fn subscribe(&self, public_key: PublicKey, read_key: Option<Secret>) {
        tracing::info!("SUBSCRIBE: following {}", public_key);
        self.state.subscriptions.write().subscribe(public_key);
        if let Some(key) = read_key {
            self.state.read_keys.write().insert(public_key, key);
        }
    }

    pub fn unsubscribe(&self, public_key: &PublicKey) {
        self.state.subscriptions.write().unsubscribe(public_key);
        self.state.read_keys.write().remove(public_key);
        self.state.channels.write().remove(public_key);
    }

    pub fn subscriptions(&self) -> Vec<PublicKey> {
        self.state
            .subscriptions
            .read()
            .subscriptions()
            .map(|(public_key, _)| *public_key)
            .collect()
    }

    /// Fetch the newest manifest for `public_key` and materialize it
    ///
    /// Returns `Ok(None)` if the DHT has nothing newer than what we already
    /// processed. A manifest that fails validation or decryption aborts this
    /// cycle only: the last materialized state stays in place and the next
    /// poll starts fresh.
    pub async fn poll_subscription(
        &self,
        public_key: &PublicKey,
    ) -> Result<Option<ChannelView>, PeerError> {
        let Some(record) = self.dht.get_manifest(public_key).await? else {
            tracing::debug!("POLL: no manifest for {} yet", public_key);
            return Ok(None);
        };
        let manifest = record.manifest;
        if manifest.public_key != *public_key {
            return Err(ManifestError::Validation(format!(
                "asked for {}, DHT returned a manifest for {}",
                public_key, manifest.public_key
            ))
            .into());
        }

        let sequence = manifest.sequence;
        if let Err(e) = self
            .state
            .subscriptions
            .write()
            .observe(*public_key, sequence)
        {
            tracing::debug!("POLL: discarding manifest for {}: {}", public_key, e);
            return Ok(None);
        }

        let read_key = self.state.read_keys.read().get(public_key).cloned();
        let view = match manifest
            .validate()
            .map(|_| self.state.subscriptions.write().verified(public_key, sequence))
            .and_then(|_| manifest.decrypt(read_key.as_ref()))
        {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(
                    "POLL: rejecting sequence {} for {}: {}",
                    sequence,
                    public_key,
                    e
                );
                self.state.subscriptions.write().abort(public_key, sequence);
                return Err(e.into());
            }
        };

        for collection in &view.collections {
            for entry in collection.files() {
                self.index_file(entry.clone());
            }
        }
        self.state
            .subscriptions
            .write()
            .materialized(public_key, sequence);
        self.state
            .channels
            .write()
            .insert(*public_key, view.clone());

        tracing::info!(
            "POLL: materialized sequence {} for {} ({} collections)",
            sequence,
            public_key,
            view.collections.len()
        );
        Ok(Some(view))
    }

    /// Queue a poll for every subscribed channel a peer has seen a newer
    /// sequence of
    pub fn handle_gossip(&self, sequences: &Sequences) {
        let stale: Vec<PublicKey> = {
            let tracker = self.state.subscriptions.read();
            sequences
                .iter()
                .filter(|(public_key, sequence)| {
                    tracker.is_subscribed(public_key) && tracker.state(public_key).accepts(**sequence)
                })
                .map(|(public_key, _)| *public_key)
                .collect()
        };

        for public_key in stale {
            if let Err(e) = self.jobs.dispatch_poll(public_key) {
                tracing::warn!("GOSSIP: failed to queue poll for {}: {}", public_key, e);
            }
        }
    }

    /// Announce every held blob to the DHT again
    ///
    /// Returns how many announcements succeeded.
    pub async fn reannounce_all(&self) -> usize {
        let held = self.held();
        let mut announced = 0;
        for blob_id in &held {
            match self.dht.announce_blob(blob_id, self.port()).await {
                Ok(()) => announced += 1,
                Err(e) => tracing::warn!("REANNOUNCE: {} failed: {}", blob_id, e),
            }
        }
        tracing::info!("REANNOUNCE: announced {}/{} held blobs", announced, held.len());
        announced
    }

    /// Validate a manifest relayed by a client and store it in the DHT
    pub async fn relay_manifest(&self, manifest: &Manifest) -> Result<String, PeerError> {
        manifest.validate()?;
        let item = self.dht.put_manifest(manifest).await?;
        tracing::info!(
            "GATEWAY: relayed sequence {} for {}",
            manifest.sequence,
            manifest.public_key
        );
        Ok(item)
    }
}
