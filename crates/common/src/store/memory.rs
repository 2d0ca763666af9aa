//! In-process store

use super::PaperStore;
use crate::errors::{AppError, Result};
use crate::models::Paper;
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

/// Store keeping papers in memory
#[derive(Default)]
pub struct MemoryStore {
    papers: Mutex<Vec<Paper>>,
    batches: Mutex<Vec<Vec<Paper>>>,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new(papers: Vec<Paper>) -> Self {
        Self {
            papers: Mutex::new(papers),
            ..Default::default()
        }
    }

    /// Store whose reads fail, for exercising fatal store errors
    pub fn unreachable() -> Self {
        Self {
            fail_reads: true,
            ..Default::default()
        }
    }

    /// Batches passed to `upsert_batch`, in call order
    pub fn batches(&self) -> Vec<Vec<Paper>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Current contents
    pub fn papers(&self) -> Vec<Paper> {
        self.papers.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn poisoned() -> AppError {
    AppError::Store {
        message: "memory store lock poisoned".to_string(),
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn fetch_all(&self, _database_id: &str) -> Result<Vec<Paper>> {
        if self.fail_reads {
            return Err(AppError::Store {
                message: "store unreachable".to_string(),
            });
        }
        let papers = self.papers.lock().map_err(|_| poisoned())?;
        Ok(papers
            .iter()
            .map(|p| {
                let page_id = p.page_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
                Paper::stored(page_id, p.snapshot())
            })
            .collect())
    }

    async fn upsert_batch(&self, _database_id: &str, batch: &[Paper]) -> Result<()> {
        let mut papers = self.papers.lock().map_err(|_| poisoned())?;
        for paper in batch {
            let existing = paper
                .page_id
                .as_deref()
                .and_then(|id| papers.iter().position(|p| p.page_id.as_deref() == Some(id)));
            match existing {
                Some(index) => papers[index] = paper.clone(),
                None => {
                    let page_id = Uuid::new_v4().to_string();
                    papers.push(Paper::stored(page_id, paper.snapshot()));
                }
            }
        }
        drop(papers);

        self.batches.lock().map_err(|_| poisoned())?.push(batch.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSnapshot;

    #[tokio::test]
    async fn test_round_trip_creates_then_updates() {
        let store = MemoryStore::default();
        let new = Paper::discovered(PaperSnapshot {
            title: Some("C".into()),
            ..Default::default()
        });
        store.upsert_batch("db", &[new]).await.unwrap();

        let mut fetched = store.fetch_all("db").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(fetched[0].page_id.is_some());
        assert!(!fetched[0].is_dirty());

        fetched[0].summary = Some("s".into());
        store.upsert_batch("db", &fetched).await.unwrap();
        assert_eq!(store.papers().len(), 1);
        assert_eq!(store.papers()[0].summary.as_deref(), Some("s"));
        assert_eq!(store.batches().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store = MemoryStore::unreachable();
        let err = store.fetch_all("db").await.unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
    }
}
