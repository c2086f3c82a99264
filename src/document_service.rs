use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::database::Database;
use crate::errors::ApiError;
use crate::models::*;
use crate::text_extraction::{
    CHUNK_OVERLAP_WORDS, CHUNK_WORDS, ExtractionError, chunk_text, extract_pdf_text, looks_like_pdf,
};

use crate::{log_service_error, log_service_start, log_service_success};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file received from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// The stored bytes of a document, ready to send back.
#[derive(Debug, Clone)]
pub struct DocumentDownload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct DocumentService {
    db: Database,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl DocumentService {
    pub fn new(db: Database, upload_dir: impl Into<PathBuf>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            upload_dir: upload_dir.into(),
            max_upload_bytes,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn check_upload(&self, file: &UploadedFile) -> Result<(), ApiError> {
        if file.bytes.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
        }
        if file.bytes.len() > self.max_upload_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "file exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let declared_pdf = file
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE))
            || file.file_name.to_lowercase().ends_with(".pdf");
        if !declared_pdf || !looks_like_pdf(&file.bytes) {
            return Err(ApiError::ValidationError("only PDF files are accepted".to_string()));
        }
        Ok(())
    }

    /// Store an uploaded PDF, extract its text and chunk it.
    ///
    /// The document row exists from the start in `processing` state and ends
    /// either `ready` or `failed`; a failed extraction is reported as a 400.
    pub async fn upload(
        &self,
        user_id: Uuid,
        file: UploadedFile,
        title: Option<String>,
    ) -> Result<Document, ApiError> {
        log_service_start!("document_service", "upload");
        let started = Instant::now();
        self.check_upload(&file)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let stored_name = format!("{}-{}.pdf", millis, Uuid::new_v4());
        let disk_path = self.upload_dir.join(&stored_name);

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::write(&disk_path, &file.bytes).await?;

        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&file.file_name));

        let created = self
            .db
            .create_document(NewDocument {
                user_id,
                title,
                file_name: file.file_name.clone(),
                file_path: disk_path.to_string_lossy().into_owned(),
                file_size: file.bytes.len() as i64,
            })
            .await;
        let document = match created {
            Ok(document) => document,
            Err(err) => {
                log_service_error!("document_service", "upload", error = err);
                if let Err(remove_err) = tokio::fs::remove_file(&disk_path).await {
                    tracing::warn!(
                        file_path = %disk_path.display(),
                        error = %remove_err,
                        "Could not remove orphaned upload"
                    );
                }
                return Err(err.into());
            }
        };

        let bytes = file.bytes;
        let extraction = tokio::task::spawn_blocking(move || {
            extract_pdf_text(&bytes).map(|text| {
                let chunks = chunk_text(&text, CHUNK_WORDS, CHUNK_OVERLAP_WORDS);
                (text, chunks)
            })
        })
        .await
        .unwrap_or_else(|join_err| Err(ExtractionError::Parse(join_err.to_string())));

        match extraction {
            Ok((text, chunks)) => {
                self.db.mark_document_ready(document.id, &text, &chunks).await?;
                log_service_success!(
                    "document_service",
                    "upload",
                    document_id = document.id,
                    count = chunks.len(),
                    duration_ms = started.elapsed().as_millis() as u64
                );
                self.get(user_id, document.id).await
            }
            Err(err) => {
                log_service_error!("document_service", "upload", document_id = document.id, error = err);
                self.db.mark_document_failed(document.id).await?;
                Err(ApiError::ValidationError(format!(
                    "could not extract text from PDF: {}",
                    err
                )))
            }
        }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<DocumentSummary>, ApiError> {
        Ok(self.db.list_documents(user_id).await?)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Document, ApiError> {
        self.db
            .get_document(user_id, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Document with ID '{}' not found", id)))
    }

    pub async fn update_title(&self, user_id: Uuid, id: Uuid, title: &str) -> Result<Document, ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::ValidationError("title cannot be empty".to_string()));
        }
        if !self.db.update_document_title(user_id, id, title).await? {
            return Err(ApiError::NotFound(format!("Document with ID '{}' not found", id)));
        }
        self.get(user_id, id).await
    }

    /// Delete a document and everything generated from it.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        let document = self.get(user_id, id).await?;
        if !self.db.delete_document(user_id, id).await? {
            return Err(ApiError::NotFound(format!("Document with ID '{}' not found", id)));
        }

        if let Err(err) = tokio::fs::remove_file(&document.file_path).await {
            tracing::warn!(
                document_id = %id,
                file_path = %document.file_path,
                error = %err,
                "Could not remove stored file"
            );
        }
        Ok(())
    }

    pub async fn download(&self, user_id: Uuid, id: Uuid) -> Result<DocumentDownload, ApiError> {
        let document = self.get(user_id, id).await?;
        let bytes = match tokio::fs::read(&document.file_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound("stored file is missing".to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(DocumentDownload {
            file_name: document.file_name,
            bytes,
        })
    }
}

fn default_title(file_name: &str) -> String {
    let split = file_name.len().saturating_sub(4);
    let stem = match (file_name.get(..split), file_name.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".pdf") => stem,
        _ => file_name,
    };
    let stem = stem.trim();
    if stem.is_empty() {
        "Untitled document".to_string()
    } else {
        stem.to_string()
    }
}
