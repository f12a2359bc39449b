// THEORY:
// The storage collaborator. The tracking engine and the summariser never talk to
// each other directly; tracking inserts finished interactions, the summariser
// later reads the unprocessed ones back and folds them into a per-sensor
// summary. Everything goes through the `InteractionStore` trait, passed around
// as an explicit `Arc<dyn InteractionStore>` handle.
//
// All operations are synchronous and fallible. Callers log failures and carry
// on; nothing in this crate retries.

use crate::core_modules::interaction::InteractionRecord;
use crate::core_modules::summary::ScoutSummary;
use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// An interaction as handed back by the store, with its storage id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInteraction {
    pub id: u64,
    pub processed: bool,
    pub interaction: InteractionRecord,
}

pub trait InteractionStore: Send + Sync {
    /// Inserts a finished interaction and returns its storage id.
    fn insert_interaction(&self, interaction: &InteractionRecord) -> Result<u64, StoreError>;

    /// All interactions the summariser has not yet folded into a summary, oldest first.
    fn unprocessed_interactions(&self) -> Result<Vec<StoredInteraction>, StoreError>;

    fn mark_processed(&self, id: u64) -> Result<(), StoreError>;

    /// The summary for a sensor, or `None` if nothing has been summarised for it yet.
    fn summary(&self, owner_id: Uuid) -> Result<Option<ScoutSummary>, StoreError>;

    /// Inserts or replaces the summary for `summary.owner_id`.
    fn update_summary(&self, summary: &ScoutSummary) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    interactions: Vec<StoredInteraction>,
    summaries: HashMap<Uuid, ScoutSummary>,
}

/// An in-process store. Used by the runner binary and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every stored interaction, processed or not.
    pub fn interactions(&self) -> Vec<StoredInteraction> {
        self.inner.lock().interactions.clone()
    }

    /// A snapshot of every summary, ordered by owner id.
    pub fn summaries(&self) -> Vec<ScoutSummary> {
        let inner = self.inner.lock();
        let mut summaries: Vec<ScoutSummary> = inner.summaries.values().cloned().collect();
        summaries.sort_by_key(|s| s.owner_id);
        summaries
    }

    /// Writes every summary to `path` as pretty-printed JSON.
    pub fn export_summaries(&self, path: &Path) -> Result<(), StoreError> {
        write_json(path, &self.summaries())
    }

    /// Writes every stored interaction to `path` as pretty-printed JSON.
    pub fn export_interactions(&self, path: &Path) -> Result<(), StoreError> {
        write_json(path, &self.interactions())
    }
}

impl InteractionStore for MemoryStore {
    fn insert_interaction(&self, interaction: &InteractionRecord) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.interactions.push(StoredInteraction {
            id,
            processed: false,
            interaction: interaction.clone(),
        });
        debug!(id, owner = %interaction.owner_id, "stored interaction");
        Ok(id)
    }

    fn unprocessed_interactions(&self) -> Result<Vec<StoredInteraction>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .interactions
            .iter()
            .filter(|si| !si.processed)
            .cloned()
            .collect())
    }

    fn mark_processed(&self, id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let stored = inner
            .interactions
            .iter_mut()
            .find(|si| si.id == id)
            .ok_or(StoreError::UnknownInteraction(id))?;
        stored.processed = true;
        Ok(())
    }

    fn summary(&self, owner_id: Uuid) -> Result<Option<ScoutSummary>, StoreError> {
        Ok(self.inner.lock().summaries.get(&owner_id).cloned())
    }

    fn update_summary(&self, summary: &ScoutSummary) -> Result<(), StoreError> {
        self.inner
            .lock()
            .summaries
            .insert(summary.owner_id, summary.clone());
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A store whose backend is permanently down.
    pub(crate) struct UnavailableStore;

    fn down() -> StoreError {
        StoreError::Unavailable("backend offline".into())
    }

    impl InteractionStore for UnavailableStore {
        fn insert_interaction(&self, _: &InteractionRecord) -> Result<u64, StoreError> {
            Err(down())
        }
        fn unprocessed_interactions(&self) -> Result<Vec<StoredInteraction>, StoreError> {
            Err(down())
        }
        fn mark_processed(&self, _: u64) -> Result<(), StoreError> {
            Err(down())
        }
        fn summary(&self, _: Uuid) -> Result<Option<ScoutSummary>, StoreError> {
            Err(down())
        }
        fn update_summary(&self, _: &ScoutSummary) -> Result<(), StoreError> {
            Err(down())
        }
    }
}
