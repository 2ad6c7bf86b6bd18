//! In-memory document sink for testing.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{DocumentSink, SaveOptions, SaveReport};
use crate::models::Document;

/// Which collaborator method received a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Priced documents (`save_bills`).
    Bills,
    /// Documents without an amount (`save_files`).
    Files,
}

#[derive(Debug, Clone)]
pub struct SaveCall {
    pub sink: SinkKind,
    pub documents: Vec<Document>,
    pub options: SaveOptions,
}

/// Records every call without deduplicating anything.
#[derive(Default)]
pub struct MemoryStorage {
    calls: Mutex<Vec<SaveCall>>,
    cookies: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<SaveCall> {
        self.calls.lock().await.clone()
    }

    /// Every document saved under `sub_path` through `sink`.
    pub async fn documents(&self, sink: SinkKind, sub_path: &str) -> Vec<Document> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.sink == sink && call.options.sub_path == sub_path)
            .flat_map(|call| call.documents.iter().cloned())
            .collect()
    }

    pub async fn session_cookies(&self) -> HashMap<String, String> {
        self.cookies.lock().await.clone()
    }

    async fn record(&self, sink: SinkKind, documents: &[Document], options: &SaveOptions) -> SaveReport {
        self.calls.lock().await.push(SaveCall {
            sink,
            documents: documents.to_vec(),
            options: options.clone(),
        });
        SaveReport {
            saved: documents.len(),
            ..SaveReport::default()
        }
    }
}

#[async_trait::async_trait]
impl DocumentSink for MemoryStorage {
    async fn save_bills(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport> {
        Ok(self.record(SinkKind::Bills, documents, options).await)
    }

    async fn save_files(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport> {
        Ok(self.record(SinkKind::Files, documents, options).await)
    }

    async fn attach_session(&self, cookies: &HashMap<String, String>) -> Result<()> {
        *self.cookies.lock().await = cookies.clone();
        Ok(())
    }
}
