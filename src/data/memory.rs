//! Non-persistent result store for embedding and tests.

use anyhow::Result;
use dashmap::DashMap;

use super::ResultStore;
use crate::engine::types::CachedAnalysis;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CachedAnalysis>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResultStore for MemoryStore {
    fn get_latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>> {
        Ok(self.entries.get(symbol).map(|e| e.value().clone()))
    }

    fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        match self.entries.entry(analysis.symbol.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied)
                if analysis.analysis_date >= occupied.get().analysis_date =>
            {
                occupied.insert(analysis.clone());
            }
            // The stored entry is newer; keep it.
            dashmap::mapref::entry::Entry::Occupied(_) => {}
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(analysis.clone());
            }
        }
        Ok(())
    }
}
