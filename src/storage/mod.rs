mod fetch;
mod json_file;
mod memory;

pub use fetch::{FileFetcher, HttpFileFetcher};
pub use json_file::{DocumentRecord, JsonFileStorage, RecordMetadata};
pub use memory::{MemoryStorage, SaveCall, SinkKind};

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::Document;

/// How one batch of documents is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Document fields forming the natural dedup key, in order.
    pub file_id_attributes: Vec<String>,
    /// `"<contractNumber> - <linkedAddress>/<category>"`.
    pub sub_path: String,
    pub content_type: String,
    pub qualification_label: String,
}

/// Outcome of one save call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    /// Already stored with current metadata.
    pub skipped: usize,
    /// Already stored, but rewritten because the stored metadata was outdated.
    pub upgraded: usize,
}

impl SaveReport {
    pub fn merge(&mut self, other: SaveReport) {
        self.saved += other.saved;
        self.skipped += other.skipped;
        self.upgraded += other.upgraded;
    }
}

/// Persistence collaborator for harvested documents.
///
/// Priced documents go to [`save_bills`](DocumentSink::save_bills), documents
/// without an amount to [`save_files`](DocumentSink::save_files); callers
/// never hand the same document to both.
#[async_trait::async_trait]
pub trait DocumentSink: Send + Sync {
    async fn save_bills(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport>;

    async fn save_files(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport>;

    /// Browser cookies of the authenticated session, for sinks that
    /// download document files themselves.
    async fn attach_session(&self, _cookies: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }
}
