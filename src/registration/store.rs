//! Commitment caching and persistence.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registration::commitment::RegistrationCommitment;

/// Thread-safe cache of confirmed, unrevealed commitments keyed by sender.
///
/// With a persistence path set, every change is written through to a JSON
/// file so a reveal can follow a process restart.
#[derive(Clone, Default)]
pub struct CommitmentStore {
    inner: Arc<DashMap<Address, RegistrationCommitment>>,
    persistence_path: Option<PathBuf>,
}

impl CommitmentStore {
    /// Create an empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// In-memory only.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Load from `path` if it exists. Later changes are saved back to it.
    pub fn load_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<Address, RegistrationCommitment> = serde_json::from_reader(reader)?;
            for (sender, commitment) in map {
                store.inner.insert(sender, commitment);
            }
            tracing::info!(
                path = %path.display(),
                count = store.inner.len(),
                "Loaded pending commitments"
            );
        }
        Ok(store)
    }

    /// Write all commitments to the persistence path, if any.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let map: HashMap<_, _> = self
            .inner
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();

        // Write beside the target then rename, so a crash never truncates it.
        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, &map)?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), count = map.len(), "Saved pending commitments");
        Ok(())
    }

    /// Record `commitment` for its sender, replacing any earlier one.
    pub fn insert(&self, commitment: RegistrationCommitment) {
        self.inner.insert(commitment.sender, commitment);
        self.persist();
    }

    pub fn get(&self, sender: &Address) -> Option<RegistrationCommitment> {
        self.inner.get(sender).map(|r| r.value().clone())
    }

    pub fn remove(&self, sender: &Address) -> Option<RegistrationCommitment> {
        let removed = self.inner.remove(sender).map(|(_, c)| c);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn persist(&self) {
        // The contract holds the authoritative copy; a failed write only
        // costs the local cache.
        if let Err(e) = self.save_to_file() {
            tracing::warn!(error = %e, "Failed to persist commitments");
        }
    }
}

impl std::fmt::Debug for CommitmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitmentStore")
            .field("pending", &self.inner.len())
            .field("persistence_path", &self.persistence_path)
            .finish()
    }
}
