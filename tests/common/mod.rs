#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use study_assistant::{
    api::{create_router, AppState, USER_ID_HEADER},
    Database, DocumentChunk, DocumentService, GenerationClient, GenerationError, LLMService,
    NewDocument, StudyService,
};
use tokio::sync::Notify;
use uuid::Uuid;

pub const DOCUMENT_TEXT: &str = "Mitochondria produce ATP through cellular respiration. \
The nucleus stores genetic material. Ribosomes build proteins from amino acids.";

/// Generation client that replays queued replies, then repeats the fallback.
pub struct FakeClient {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Result<String, GenerationError>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Gate>,
}

/// Holds a generation open until the test releases it.
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeClient {
    pub fn replying(text: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing(err: GenerationError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(err),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn then(self, reply: Result<&str, GenerationError>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string));
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for FakeClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let queued = self.replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub db: Database,
    pub client: Arc<FakeClient>,
    pub user_id: Uuid,
    pub upload_dir: std::path::PathBuf,
}

pub async fn spawn_app(client: FakeClient) -> TestApp {
    spawn_app_with_limit(client, 1024 * 1024).await
}

pub async fn spawn_app_with_limit(client: FakeClient, max_upload_bytes: usize) -> TestApp {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let client = Arc::new(client);
    let upload_dir = std::env::temp_dir().join(format!("study-assistant-test-{}", Uuid::new_v4()));

    let state = AppState {
        documents: DocumentService::new(db.clone(), upload_dir.clone(), max_upload_bytes),
        study: StudyService::new(db.clone(), LLMService::new(client.clone())),
        max_upload_bytes,
    };

    TestApp {
        server: TestServer::new(create_router(state)).unwrap(),
        db,
        client,
        user_id: Uuid::new_v4(),
        upload_dir,
    }
}

impl TestApp {
    pub fn user_header(&self) -> (HeaderName, HeaderValue) {
        user_header(self.user_id)
    }

    /// Insert a ready document without going through PDF extraction.
    pub async fn seed_document(&self, title: &str) -> Uuid {
        let document = self
            .db
            .create_document(NewDocument {
                user_id: self.user_id,
                title: title.to_string(),
                file_name: format!("{}.pdf", title),
                file_path: self.upload_dir.join("missing.pdf").to_string_lossy().into_owned(),
                file_size: DOCUMENT_TEXT.len() as i64,
            })
            .await
            .unwrap();
        let chunks = vec![
            DocumentChunk {
                chunk_index: 0,
                content: "Mitochondria produce ATP through cellular respiration.".to_string(),
            },
            DocumentChunk {
                chunk_index: 1,
                content: "The nucleus stores genetic material.".to_string(),
            },
        ];
        self.db
            .mark_document_ready(document.id, DOCUMENT_TEXT, &chunks)
            .await
            .unwrap();
        document.id
    }
}

pub fn user_header(user_id: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(USER_ID_HEADER),
        HeaderValue::from_str(&user_id.to_string()).unwrap(),
    )
}
