use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use billharvest::models::{Document, DocumentDraft, DocumentKind, DocumentType, PaymentStatus, METADATA_VERSION};
use billharvest::storage::{DocumentSink, HttpFileFetcher, JsonFileStorage, SaveOptions, SinkKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUB_PATH: &str = "100200300 - 12 rue des Lilas 75011 Paris/electricity";

fn invoice(reference: &str, cents: i64, file_url: Option<String>) -> Document {
    Document::new(DocumentDraft {
        kind: DocumentKind::Invoice,
        vendor: "Direct Energie".to_string(),
        vendor_ref: Some(reference.to_string()),
        amount: Some(Decimal::new(cents, 2)),
        currency: Some("EUR".to_string()),
        date: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
        payment_status: PaymentStatus::Paid,
        status_date: NaiveDate::from_ymd_opt(2024, 1, 15),
        file_url,
        document_type: DocumentType::Electricity,
    })
}

fn options() -> SaveOptions {
    SaveOptions {
        file_id_attributes: vec!["vendorRef".to_string(), "filename".to_string()],
        sub_path: SUB_PATH.to_string(),
        content_type: "application/pdf".to_string(),
        qualification_label: "energy_invoice".to_string(),
    }
}

#[tokio::test]
async fn saving_twice_keeps_one_record() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let docs = vec![invoice("F1", 4530, None), invoice("F2", 5110, None)];

    let first = storage.save_bills(&docs, &options()).await?;
    let second = storage.save_bills(&docs, &options()).await?;

    assert_eq!(first.saved, 2);
    assert_eq!(second.saved, 0);
    assert_eq!(second.skipped, 2);

    let records = storage.records(SUB_PATH).await?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.sink == SinkKind::Bills));
    assert!(records.iter().all(|r| r.is_current()));
    Ok(())
}

#[tokio::test]
async fn outdated_metadata_is_rewritten() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path());
    let doc = invoice("F1", 4530, None);

    // A record written by an older version: metadata without a version.
    let index_dir = dir.path().join(SUB_PATH);
    std::fs::create_dir_all(&index_dir)?;
    let legacy = serde_json::json!({
        "sink": "bills",
        "document": doc,
        "metadata": { "content_type": "application/pdf" },
    });
    std::fs::write(index_dir.join("documents.jsonl"), format!("{legacy}\n"))?;

    let report = storage.save_bills(&[doc.clone()], &options()).await?;
    assert_eq!(report.upgraded, 1);
    assert_eq!(report.saved, 0);

    let records = storage.records(SUB_PATH).await?;
    assert_eq!(records.len(), 1);
    let metadata = records[0].metadata.as_ref().expect("metadata written");
    assert_eq!(metadata.version, Some(METADATA_VERSION));
    assert_eq!(metadata.qualification_label.as_deref(), Some("energy_invoice"));

    let again = storage.save_bills(&[doc], &options()).await?;
    assert_eq!(again.skipped, 1);
    Ok(())
}

#[tokio::test]
async fn refuses_paths_outside_the_data_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path().join("documents"));
    let mut escaping = options();
    escaping.sub_path = "../outside/electricity".to_string();

    let result = storage.save_bills(&[invoice("F1", 4530, None)], &escaping).await;

    assert!(result.is_err());
    assert!(!dir.path().join("outside").exists());
    Ok(())
}

#[tokio::test]
async fn downloads_files_with_the_session_cookies() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/documents/F1.pdf"))
        .and(header("cookie", "PHPSESSID=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 invoice".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path()).with_fetcher(Arc::new(HttpFileFetcher::new()?));
    storage
        .attach_session(&HashMap::from([("PHPSESSID".to_string(), "abc123".to_string())]))
        .await?;

    let doc = invoice("F1", 4530, Some(format!("{}/clients/documents/F1.pdf", server.uri())));
    storage.save_bills(&[doc.clone()], &options()).await?;
    // Already on disk: no second download.
    storage.save_bills(&[doc.clone()], &options()).await?;

    let stored = dir.path().join(SUB_PATH).join(doc.filename());
    assert_eq!(std::fs::read(&stored)?, b"%PDF-1.4 invoice");
    let records = storage.records(SUB_PATH).await?;
    assert_eq!(records[0].stored_file.as_deref(), Some(doc.filename()));
    Ok(())
}

#[tokio::test]
async fn a_failed_download_still_records_the_document() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("session expired"))
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path()).with_fetcher(Arc::new(HttpFileFetcher::new()?));
    let doc = invoice("F1", 4530, Some(format!("{}/clients/documents/F1.pdf", server.uri())));

    let report = storage.save_bills(&[doc], &options()).await?;

    assert_eq!(report.saved, 1);
    let records = storage.records(SUB_PATH).await?;
    assert_eq!(records[0].stored_file, None);
    Ok(())
}

#[tokio::test]
async fn same_date_and_amount_keep_their_own_files() -> Result<()> {
    let server = MockServer::start().await;
    for reference in ["F1", "F2"] {
        Mock::given(method("GET"))
            .and(path(format!("/clients/documents/{reference}.pdf")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("%PDF {reference}")))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new()?;
    let storage = JsonFileStorage::new(dir.path()).with_fetcher(Arc::new(HttpFileFetcher::new()?));
    let docs: Vec<Document> = ["F1", "F2"]
        .iter()
        .map(|r| invoice(r, 4530, Some(format!("{}/clients/documents/{r}.pdf", server.uri()))))
        .collect();
    assert_ne!(docs[0].filename(), docs[1].filename());

    let report = storage.save_bills(&docs, &options()).await?;
    assert_eq!(report.saved, 2);

    for record in storage.records(SUB_PATH).await? {
        let reference = record.document.vendor_ref().expect("invoice reference");
        let stored = record.stored_file.as_deref().expect("downloaded");
        let body = std::fs::read_to_string(dir.path().join(SUB_PATH).join(stored))?;
        assert_eq!(body, format!("%PDF {reference}"));
    }
    Ok(())
}
