use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{DocumentSink, FileFetcher, SaveOptions, SaveReport, SinkKind};
use crate::models::{Document, METADATA_VERSION};

const INDEX_FILE: &str = "documents.jsonl";

/// Metadata stored alongside each document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub qualification_label: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One line of a `documents.jsonl` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub sink: SinkKind,
    pub document: Document,
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
    /// File name of the downloaded PDF, relative to the index directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_file: Option<String>,
}

impl DocumentRecord {
    /// Records without metadata, or with metadata of another version, are
    /// rewritten on the next save.
    pub fn is_current(&self) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|m| m.version == Some(METADATA_VERSION))
    }
}

/// JSON file-based document storage.
///
/// Directory structure:
/// ```text
/// documents/
///   {contractNumber} - {linkedAddress}/
///     electricity/
///       documents.jsonl
///       2024-01-12_direct-energie_45.30EUR_facture_f1.pdf
///     gas/
///     contracts/
/// ```
pub struct JsonFileStorage {
    base_path: PathBuf,
    fetcher: Option<Arc<dyn FileFetcher>>,
}

impl JsonFileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            fetcher: None,
        }
    }

    /// Also download each document's file next to its index.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn FileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn sub_dir(&self, sub_path: &str) -> Result<PathBuf> {
        let relative = Path::new(sub_path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("Refusing to store documents outside the data directory: {sub_path:?}");
        }
        Ok(self.base_path.join(relative))
    }

    /// Stored records under one sub-path.
    pub async fn records(&self, sub_path: &str) -> Result<Vec<DocumentRecord>> {
        self.read_jsonl(&self.sub_dir(sub_path)?.join(INDEX_FILE)).await
    }

    async fn read_jsonl<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to open file"),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            if line.trim().is_empty() {
                continue;
            }
            let item: T = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSONL line: {}", line))?;
            items.push(item);
        }

        Ok(items)
    }

    async fn write_jsonl<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create directory")?;
        }

        let mut content = String::new();
        for item in items {
            content.push_str(&serde_json::to_string(item).context("Failed to serialize item")?);
            content.push('\n');
        }
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Download the document's file unless it is already on disk. Failures
    /// are logged; the record is kept without a stored file.
    async fn store_file(&self, dir: &Path, document: &Document) -> Option<String> {
        let target = dir.join(document.filename());
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Some(document.filename().to_string());
        }
        let (fetcher, url) = (self.fetcher.as_ref()?, document.file_url()?);

        let bytes = match fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(file = document.filename(), error = %err, "Document download failed");
                return None;
            }
        };
        if let Err(err) = fs::create_dir_all(dir).await {
            tracing::warn!(dir = %dir.display(), error = %err, "Could not create document directory");
            return None;
        }
        match fs::write(&target, bytes).await {
            Ok(()) => Some(document.filename().to_string()),
            Err(err) => {
                tracing::warn!(file = %target.display(), error = %err, "Could not write document");
                None
            }
        }
    }

    async fn save(
        &self,
        sink: SinkKind,
        documents: &[Document],
        options: &SaveOptions,
    ) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        if documents.is_empty() {
            return Ok(report);
        }

        let dir = self.sub_dir(&options.sub_path)?;
        let index = dir.join(INDEX_FILE);
        let mut records: Vec<DocumentRecord> = self.read_jsonl(&index).await?;
        let mut positions: HashMap<Vec<Option<String>>, usize> = records
            .iter()
            .enumerate()
            .map(|(i, record)| (dedup_key(&record.document, &options.file_id_attributes), i))
            .collect();

        for document in documents {
            let key = dedup_key(document, &options.file_id_attributes);
            let existing = positions.get(&key).copied();
            if let Some(i) = existing {
                if records[i].is_current() {
                    report.skipped += 1;
                    continue;
                }
            }

            let record = DocumentRecord {
                sink,
                document: document.clone(),
                metadata: Some(RecordMetadata {
                    version: Some(METADATA_VERSION),
                    content_type: Some(options.content_type.clone()),
                    qualification_label: Some(options.qualification_label.clone()),
                    updated_at: Some(Utc::now()),
                }),
                stored_file: self.store_file(&dir, document).await,
            };

            match existing {
                Some(i) => {
                    tracing::debug!(file = document.filename(), "Upgrading stored document metadata");
                    records[i] = record;
                    report.upgraded += 1;
                }
                None => {
                    positions.insert(key, records.len());
                    records.push(record);
                    report.saved += 1;
                }
            }
        }

        if report.saved + report.upgraded > 0 {
            self.write_jsonl(&index, &records).await?;
        }
        tracing::info!(
            sub_path = %options.sub_path,
            saved = report.saved,
            upgraded = report.upgraded,
            skipped = report.skipped,
            "Stored documents"
        );
        Ok(report)
    }
}

fn dedup_key(document: &Document, attributes: &[String]) -> Vec<Option<String>> {
    attributes
        .iter()
        .map(|name| document.id_attribute(name).map(str::to_string))
        .collect()
}

#[async_trait::async_trait]
impl DocumentSink for JsonFileStorage {
    async fn save_bills(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport> {
        self.save(SinkKind::Bills, documents, options).await
    }

    async fn save_files(&self, documents: &[Document], options: &SaveOptions) -> Result<SaveReport> {
        self.save(SinkKind::Files, documents, options).await
    }

    async fn attach_session(&self, cookies: &HashMap<String, String>) -> Result<()> {
        if let Some(fetcher) = &self.fetcher {
            fetcher.set_cookies(cookies);
        }
        Ok(())
    }
}
