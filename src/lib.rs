pub mod api;
pub mod config;
pub mod database;
pub mod document_service;
pub mod errors;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod output_parser;
pub mod prompt_builder;
pub mod study_service;
pub mod text_extraction;

pub use api::{create_router, AppState};
pub use config::Config;
pub use database::Database;
pub use document_service::DocumentService;
pub use errors::*;
pub use llm_providers::{GenerationClient, LLMProvider, LLMProviderFactory, LLMProviderType};
pub use llm_service::LLMService;
pub use models::*;
pub use output_parser::{parse, parse_flashcards, parse_quiz, ParsedRecords, RecordKind};
pub use prompt_builder::{build_prompt, GenerationTask};
pub use study_service::StudyService;
