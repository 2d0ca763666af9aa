//! Selective writeback

use paperstack_common::errors::Result;
use paperstack_common::{Paper, PaperStore};
use tracing::{info, instrument};

/// Send every dirty paper to the store in one batch.
///
/// Returns the number of papers written; no store call is made when nothing
/// changed.
#[instrument(skip_all, fields(papers = papers.len()))]
pub async fn write_back(store: &dyn PaperStore, database_id: &str, papers: &[Paper]) -> Result<usize> {
    let to_write: Vec<Paper> = papers.iter().filter(|p| p.is_dirty()).cloned().collect();

    if to_write.is_empty() {
        info!("No changes to write");
        return Ok(0);
    }

    let creates = to_write.iter().filter(|p| p.page_id.is_none()).count();
    info!(
        total = to_write.len(),
        creates,
        updates = to_write.len() - creates,
        "Writing changed papers"
    );
    store.upsert_batch(database_id, &to_write).await?;
    Ok(to_write.len())
}
