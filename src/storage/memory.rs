//! In-memory result sink, used as the default backend and in tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Backend, FetchResult, Filter};
use crate::Result;

/// Stores results in a vector behind a mutex.
#[derive(Default)]
pub struct MemoryBackend {
    results: Mutex<Vec<FetchResult>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Returns the number of stored results.
    pub fn len(&self) -> usize {
        self.results.lock().expect("memory backend lock poisoned").len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn save(&self, result: &FetchResult) -> Result<()> {
        self.results
            .lock()
            .expect("memory backend lock poisoned")
            .push(result.clone());
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<FetchResult>> {
        let results = self.results.lock().expect("memory backend lock poisoned");
        let mut matched: Vec<FetchResult> = results
            .iter()
            .filter(|r| filter.url.as_ref().map_or(true, |url| &r.url == url))
            .filter(|r| {
                filter
                    .detected_bot
                    .map_or(true, |detected| r.detected_bot == detected)
            })
            .filter(|r| filter.since.map_or(true, |since| r.created_at >= since))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let matched: Vec<FetchResult> = matched.into_iter().skip(filter.offset).collect();
        if filter.limit > 0 {
            Ok(matched.into_iter().take(filter.limit).collect())
        } else {
            Ok(matched)
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
