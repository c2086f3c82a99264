use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    document_service::{DocumentService, UploadedFile},
    errors::{ApiError, ErrorContext, ErrorResponse},
    models::*,
    study_service::StudyService,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Room for multipart framing and the title field on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub documents: DocumentService,
    pub study: StudyService,
    pub max_upload_bytes: usize,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

/// The caller, identified by the `X-User-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = || ErrorContext::new("authenticate", "user");

        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Err(ApiError::Unauthorized("missing X-User-Id header".to_string())
                .to_response_with_context(context()));
        };

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(AuthUser)
            .ok_or_else(|| {
                ApiError::Unauthorized("X-User-Id must be a UUID".to_string())
                    .to_response_with_context(context())
            })
    }
}

fn respond<T>(result: Result<T, ApiError>, context: ErrorContext) -> ApiResult<T> {
    result
        .map(|data| Json(ApiResponse::success(data)))
        .map_err(|err| err.to_response_with_context(context))
}

pub async fn ping() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("pong"))
}

// Document endpoints
pub async fn upload_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Document> {
    log_api_start!("upload_document");
    let context = || ErrorContext::new("upload_document", "document");

    let mut file: Option<UploadedFile> = None;
    let mut title: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err).to_response_with_context(context())),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(err).to_response_with_context(context()))?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err).to_response_with_context(context()))?;
                title = Some(text);
            }
            _ => {}
        }
    }

    let Some(file) = file else {
        log_api_warn!("upload_document", "request had no file field");
        return Err(ApiError::BadRequest("multipart field 'file' is required".to_string())
            .to_response_with_context(context()));
    };

    let result = state.documents.upload(user_id, file, title).await;
    if let Ok(document) = &result {
        log_api_success!("upload_document", document_id = document.id, "document processed");
    }
    respond(result, context())
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<DocumentSummary>> {
    log_api_start!("list_documents");
    let result = state.documents.list(user_id).await;
    if let Ok(documents) = &result {
        log_api_success!("list_documents", count = documents.len(), "documents listed");
    }
    respond(result, ErrorContext::new("list_documents", "document"))
}

pub async fn get_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Document> {
    log_api_start!("get_document", document_id = id);
    respond(
        state.documents.get(user_id, id).await,
        ErrorContext::new("get_document", "document").with_id(&id.to_string()),
    )
}

pub async fn update_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDocumentRequest>,
) -> ApiResult<Document> {
    log_api_start!("update_document", document_id = id);
    respond(
        state.documents.update_title(user_id, id, &request.title).await,
        ErrorContext::new("update_document", "document").with_id(&id.to_string()),
    )
}

pub async fn delete_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_document", document_id = id);
    let result = state.documents.delete(user_id, id).await.map(|_| true);
    if result.is_ok() {
        log_api_success!("delete_document", document_id = id, "document deleted");
    }
    respond(
        result,
        ErrorContext::new("delete_document", "document").with_id(&id.to_string()),
    )
}

pub async fn download_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ErrorResponse> {
    log_api_start!("download_document", document_id = id);
    let download = state.documents.download(user_id, id).await.map_err(|err| {
        err.to_response_with_context(
            ErrorContext::new("download_document", "document").with_id(&id.to_string()),
        )
    })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_file_name(&download.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

fn header_safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// Generation endpoints
pub async fn generate_flashcards(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<GenerateFlashcardsRequest>,
) -> ApiResult<FlashcardSet> {
    let document_id = request.document_id;
    log_api_start!("generate_flashcards", document_id = document_id);
    let result = state.study.generate_flashcards(user_id, request).await;
    if let Ok(set) = &result {
        log_api_success!(
            "generate_flashcards",
            document_id = document_id,
            format!("{} flashcards generated", set.cards.len())
        );
    }
    respond(
        result,
        ErrorContext::new("generate_flashcards", "document").with_id(&document_id.to_string()),
    )
}

pub async fn generate_quiz(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<GenerateQuizRequest>,
) -> ApiResult<Quiz> {
    let document_id = request.document_id;
    log_api_start!("generate_quiz", document_id = document_id);
    let result = state.study.generate_quiz(user_id, request).await;
    if let Ok(quiz) = &result {
        log_api_success!("generate_quiz", quiz_id = quiz.id, "quiz generated");
    }
    respond(
        result,
        ErrorContext::new("generate_quiz", "document").with_id(&document_id.to_string()),
    )
}

pub async fn generate_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<SummaryResponse> {
    let document_id = request.document_id;
    log_api_start!("generate_summary", document_id = document_id);
    let result = state
        .study
        .generate_summary(user_id, document_id)
        .await
        .map(|summary| SummaryResponse { document_id, summary });
    respond(
        result,
        ErrorContext::new("generate_summary", "document").with_id(&document_id.to_string()),
    )
}

pub async fn explain_concept(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ExplainConceptRequest>,
) -> ApiResult<ExplanationResponse> {
    let document_id = request.document_id;
    log_api_start!("explain_concept", document_id = document_id);
    let result = state
        .study
        .explain_concept(user_id, document_id, &request.concept)
        .await
        .map(|explanation| ExplanationResponse {
            document_id,
            concept: request.concept.trim().to_string(),
            explanation,
        });
    respond(
        result,
        ErrorContext::new("explain_concept", "document").with_id(&document_id.to_string()),
    )
}

// Chat endpoints
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatExchange> {
    let document_id = request.document_id;
    log_api_start!("chat", document_id = document_id);
    let result = state.study.chat(user_id, document_id, &request.question).await;
    if result.is_ok() {
        log_api_success!("chat", document_id = document_id, "chat turn recorded");
    }
    respond(
        result,
        ErrorContext::new("chat", "document").with_id(&document_id.to_string()),
    )
}

pub async fn chat_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Vec<ChatMessage>> {
    log_api_start!("chat_history", document_id = document_id);
    respond(
        state.study.chat_history(user_id, document_id).await,
        ErrorContext::new("chat_history", "document").with_id(&document_id.to_string()),
    )
}

// Flashcard endpoints
pub async fn list_flashcard_sets(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<FlashcardSet>> {
    log_api_start!("list_flashcard_sets");
    respond(
        state.study.list_flashcard_sets(user_id).await,
        ErrorContext::new("list_flashcard_sets", "flashcard set"),
    )
}

pub async fn document_flashcard_sets(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Vec<FlashcardSet>> {
    log_api_start!("document_flashcard_sets", document_id = document_id);
    respond(
        state.study.flashcard_sets_for_document(user_id, document_id).await,
        ErrorContext::new("document_flashcard_sets", "document").with_id(&document_id.to_string()),
    )
}

pub async fn review_flashcard(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(card_id): Path<Uuid>,
) -> ApiResult<Flashcard> {
    log_api_start!("review_flashcard", flashcard_id = card_id);
    respond(
        state.study.review_flashcard(user_id, card_id).await,
        ErrorContext::new("review_flashcard", "flashcard").with_id(&card_id.to_string()),
    )
}

pub async fn toggle_flashcard_star(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(card_id): Path<Uuid>,
) -> ApiResult<Flashcard> {
    log_api_start!("toggle_flashcard_star", flashcard_id = card_id);
    respond(
        state.study.toggle_star(user_id, card_id).await,
        ErrorContext::new("toggle_flashcard_star", "flashcard").with_id(&card_id.to_string()),
    )
}

pub async fn delete_flashcard_set(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(set_id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_flashcard_set");
    respond(
        state.study.delete_flashcard_set(user_id, set_id).await.map(|_| true),
        ErrorContext::new("delete_flashcard_set", "flashcard set").with_id(&set_id.to_string()),
    )
}

// Quiz endpoints
pub async fn create_quiz(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateQuizRequest>,
) -> ApiResult<Quiz> {
    let document_id = request.document_id;
    log_api_start!("create_quiz", document_id = document_id);
    respond(
        state.study.create_quiz(user_id, request).await,
        ErrorContext::new("create_quiz", "document").with_id(&document_id.to_string()),
    )
}

pub async fn document_quizzes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Vec<Quiz>> {
    log_api_start!("document_quizzes", document_id = document_id);
    respond(
        state.study.quizzes_for_document(user_id, document_id).await,
        ErrorContext::new("document_quizzes", "document").with_id(&document_id.to_string()),
    )
}

pub async fn get_quiz(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<Quiz> {
    log_api_start!("get_quiz", quiz_id = quiz_id);
    respond(
        state.study.get_quiz(user_id, quiz_id).await,
        ErrorContext::new("get_quiz", "quiz").with_id(&quiz_id.to_string()),
    )
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(quiz_id): Path<Uuid>,
    Json(request): Json<SubmitQuizRequest>,
) -> ApiResult<QuizSubmission> {
    log_api_start!("submit_quiz", quiz_id = quiz_id);
    let result = state.study.submit_quiz(user_id, quiz_id, request.answers).await;
    if let Ok(submission) = &result {
        log_api_success!(
            "submit_quiz",
            quiz_id = quiz_id,
            format!("scored {}/{}", submission.score, submission.total)
        );
    }
    respond(
        result,
        ErrorContext::new("submit_quiz", "quiz").with_id(&quiz_id.to_string()),
    )
}

pub async fn quiz_results(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<QuizResults> {
    log_api_start!("quiz_results", quiz_id = quiz_id);
    respond(
        state.study.quiz_results(user_id, quiz_id).await,
        ErrorContext::new("quiz_results", "quiz").with_id(&quiz_id.to_string()),
    )
}

pub async fn delete_quiz(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_quiz", quiz_id = quiz_id);
    respond(
        state.study.delete_quiz(user_id, quiz_id).await.map(|_| true),
        ErrorContext::new("delete_quiz", "quiz").with_id(&quiz_id.to_string()),
    )
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/ping", get(ping))
        // Document routes
        .route("/api/documents", get(list_documents))
        .route("/api/documents/upload", post(upload_document))
        .route("/api/documents/download/:id", get(download_document))
        .route("/api/documents/:id", get(get_document))
        .route("/api/documents/:id", put(update_document))
        .route("/api/documents/:id", delete(delete_document))
        // Generation routes
        .route("/api/ai/generate-flashcards", post(generate_flashcards))
        .route("/api/ai/generate-quiz", post(generate_quiz))
        .route("/api/ai/generate-summary", post(generate_summary))
        .route("/api/ai/explain-concept", post(explain_concept))
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/chat-history/:id", get(chat_history))
        // Flashcard routes
        .route("/api/flashcards", get(list_flashcard_sets))
        .route("/api/flashcards/:id", get(document_flashcard_sets))
        .route("/api/flashcards/:id", delete(delete_flashcard_set))
        .route("/api/flashcards/:id/review", post(review_flashcard))
        .route("/api/flashcards/:id/star", put(toggle_flashcard_star))
        // Quiz routes
        .route("/api/quizzes/create", post(create_quiz))
        .route("/api/quizzes/quiz/:id", get(get_quiz))
        .route("/api/quizzes/:id", get(document_quizzes))
        .route("/api/quizzes/:id", delete(delete_quiz))
        .route("/api/quizzes/:id/submit", post(submit_quiz))
        .route("/api/quizzes/:id/results", get(quiz_results))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
