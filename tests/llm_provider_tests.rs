use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use study_assistant::{GenerationClient, GenerationError, LLMProviderFactory, LLMProviderType};

/// Serve `router` on an ephemeral local port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_openai_provider_returns_first_choice() {
    let router = Router::new().route(
        "/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(headers["authorization"], "Bearer test-key");
            assert_eq!(body["model"], "gpt-4o-mini");
            assert_eq!(body["messages"][0]["role"], "system");
            assert_eq!(body["messages"][1]["content"], "Make flashcards");
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Q: a\nA: b" } }]
            }))
        }),
    );
    let base_url = serve(router).await;

    let provider = LLMProviderFactory::create_provider(
        LLMProviderType::OpenAI,
        "test-key".to_string(),
        Some(base_url),
        None,
    );
    let text = provider.generate("Make flashcards").await.unwrap();
    assert_eq!(text, "Q: a\nA: b");
}

#[tokio::test]
async fn test_gemini_provider_joins_parts() {
    let router = Router::new().route(
        "/models/:action",
        post(|Path(action): Path<String>, headers: HeaderMap| async move {
            assert_eq!(action, "gemini-2.5-flash-lite:generateContent");
            assert_eq!(headers["x-goog-api-key"], "g-key");
            Json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Q: a\n" }, { "text": "A: b" }] } }]
            }))
        }),
    );
    let base_url = serve(router).await;

    let provider = LLMProviderFactory::create_provider(
        LLMProviderType::Gemini,
        "g-key".to_string(),
        Some(base_url),
        None,
    );
    let text = provider.generate("Make flashcards").await.unwrap();
    assert_eq!(text, "Q: a\nA: b");
}

#[tokio::test]
async fn test_error_status_is_upstream_failure() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
    );
    let base_url = serve(router).await;

    let provider = LLMProviderFactory::create_provider(
        LLMProviderType::OpenAI,
        "key".to_string(),
        Some(base_url),
        None,
    );
    match provider.generate("prompt").await {
        Err(GenerationError::Upstream(message)) => assert!(message.contains("quota exceeded")),
        other => panic!("expected upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_choices_and_blank_text_are_upstream_failures() {
    let router = Router::new()
        .route("/empty/chat/completions", post(|| async { Json(json!({ "choices": [] })) }))
        .route(
            "/blank/chat/completions",
            post(|| async {
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "  \n" } }] }))
            }),
        );
    let base_url = serve(router).await;

    for (path, expected) in [
        ("empty", None),
        ("blank", Some(GenerationError::empty_generation())),
    ] {
        let provider = LLMProviderFactory::create_provider(
            LLMProviderType::OpenAI,
            "key".to_string(),
            Some(format!("{}/{}", base_url, path)),
            None,
        );
        let result = provider.generate("prompt").await;
        assert!(matches!(result, Err(GenerationError::Upstream(_))), "path {path}");
        if let Some(expected) = expected {
            assert_eq!(result, Err(expected));
        }
    }
}
