use std::sync::Arc;
use std::time::Instant;

use crate::errors::GenerationError;
use crate::llm_providers::{GenerationClient, LLMProviderFactory, LLMProviderType};
use crate::models::{FlashcardRecord, QuizQuestionRecord};
use crate::output_parser::{self, RecordKind};
use crate::prompt_builder::{
    DEFAULT_FLASHCARD_COUNT, DEFAULT_QUIZ_QUESTIONS, GenerationTask, build_prompt,
};

use crate::log_llm_operation;

/// Runs generation tasks: builds the prompt, calls the client, parses the output.
#[derive(Clone)]
pub struct LLMService {
    client: Arc<dyn GenerationClient>,
}

impl LLMService {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    pub fn new_with_provider(
        api_key: String,
        base_url: Option<String>,
        provider_type: LLMProviderType,
        model: Option<String>,
    ) -> Self {
        let provider = LLMProviderFactory::create_provider(provider_type, api_key, base_url, model);
        Self::new(Arc::new(provider))
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    async fn run(&self, task: &GenerationTask, source_text: &str) -> Result<String, GenerationError> {
        let prompt = build_prompt(task, source_text)?;
        let provider = self.client.provider_name();
        log_llm_operation!(start, task.name(), provider = provider, prompt_chars = prompt.len());

        let started = Instant::now();
        match self.client.generate(&prompt).await {
            Ok(text) if text.trim().is_empty() => {
                let err = GenerationError::empty_generation();
                log_llm_operation!(error, task.name(), provider = provider, error = err);
                Err(err)
            }
            Ok(text) => {
                log_llm_operation!(
                    success,
                    task.name(),
                    provider = provider,
                    duration_ms = started.elapsed().as_millis() as u64,
                    response_chars = text.len()
                );
                Ok(text)
            }
            Err(err) => {
                log_llm_operation!(error, task.name(), provider = provider, error = err);
                Err(err)
            }
        }
    }

    /// Generate up to `count` flashcards (default 10). May return an empty list.
    pub async fn generate_flashcards(
        &self,
        source_text: &str,
        count: Option<usize>,
    ) -> Result<Vec<FlashcardRecord>, GenerationError> {
        let count = count.unwrap_or(DEFAULT_FLASHCARD_COUNT);
        let task = GenerationTask::Flashcards { count };
        let raw = self.run(&task, source_text).await?;
        let cards = output_parser::parse_flashcards(&raw, count);
        if cards.len() < count {
            log_llm_operation!(
                warn,
                task.name(),
                format!("requested {} flashcards, parsed {}", count, cards.len())
            );
        }
        Ok(cards)
    }

    /// Generate up to `num_questions` quiz questions (default 5). May return an empty list.
    pub async fn generate_quiz(
        &self,
        source_text: &str,
        num_questions: Option<usize>,
    ) -> Result<Vec<QuizQuestionRecord>, GenerationError> {
        let num_questions = num_questions.unwrap_or(DEFAULT_QUIZ_QUESTIONS);
        let task = GenerationTask::Quiz { num_questions };
        let raw = self.run(&task, source_text).await?;
        let questions = output_parser::parse_quiz(&raw, num_questions);
        if questions.len() < num_questions {
            log_llm_operation!(
                warn,
                task.name(),
                format!("requested {} questions, parsed {}", num_questions, questions.len())
            );
        }
        Ok(questions)
    }

    pub async fn generate_summary(&self, source_text: &str) -> Result<String, GenerationError> {
        let text = self.run(&GenerationTask::Summary, source_text).await?;
        Ok(text.trim().to_string())
    }

    pub async fn explain_concept(
        &self,
        source_text: &str,
        concept: &str,
    ) -> Result<String, GenerationError> {
        let task = GenerationTask::Explain {
            concept: concept.to_string(),
        };
        let text = self.run(&task, source_text).await?;
        Ok(text.trim().to_string())
    }

    pub async fn answer_question(
        &self,
        source_text: &str,
        question: &str,
    ) -> Result<String, GenerationError> {
        let task = GenerationTask::Chat {
            question: question.to_string(),
        };
        let text = self.run(&task, source_text).await?;
        Ok(text.trim().to_string())
    }
}

/// Treat a parse that produced nothing as a failed generation.
pub fn require_records<T>(records: Vec<T>, task: RecordKind) -> Result<Vec<T>, GenerationError> {
    if records.is_empty() {
        return Err(GenerationError::EmptyYield { task });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SOURCE: &str = "The mitochondria is the powerhouse of the cell and produces ATP.";

    /// Replays a fixed response and remembers the prompts it saw.
    struct ScriptedClient {
        response: Result<String, GenerationError>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: GenerationError) -> Arc<Self> {
            Arc::new(Self {
                response: Err(err),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.response.clone()
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_generate_flashcards_parses_and_truncates() {
        let client = ScriptedClient::replying(
            "Q: What produces ATP?\nA: Mitochondria\nD: easy\n---\nQ: broken\n---\nQ: Powerhouse?\nA: Mitochondria\n---\nQ: Extra?\nA: Extra",
        );
        let service = LLMService::new(client.clone());

        let cards = service.generate_flashcards(SOURCE, Some(2)).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "What produces ATP?");
        assert_eq!(cards[1].question, "Powerhouse?");
        assert_eq!(client.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_quiz_resolves_answers() {
        let client = ScriptedClient::replying(
            "Q: Capital of Italy?\n01: Paris\n02: London\n03: Rome\n04: Berlin\nC: 03\nE: It is Rome.\nD: easy",
        );
        let service = LLMService::new(client);

        let questions = service.generate_quiz(SOURCE, None).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "Rome");
    }

    #[tokio::test]
    async fn test_short_source_never_reaches_client() {
        let client = ScriptedClient::replying("Q: a\nA: b");
        let service = LLMService::new(client.clone());

        let result = service.generate_flashcards("too short", None).await;
        assert!(matches!(result, Err(GenerationError::Validation(_))));
        assert_eq!(client.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_generation_is_upstream_error() {
        let service = LLMService::new(ScriptedClient::replying("   \n "));
        let result = service.generate_summary(SOURCE).await;
        assert_eq!(result, Err(GenerationError::empty_generation()));
    }

    #[tokio::test]
    async fn test_client_failure_propagates_without_retry() {
        let client = ScriptedClient::failing(GenerationError::Upstream("quota".to_string()));
        let service = LLMService::new(client.clone());

        let result = service.answer_question(SOURCE, "What is ATP?").await;
        assert_eq!(result, Err(GenerationError::Upstream("quota".to_string())));
        assert_eq!(client.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_is_empty_not_error() {
        let service = LLMService::new(ScriptedClient::replying("I cannot help with that."));
        let cards = service.generate_flashcards(SOURCE, None).await.unwrap();
        assert!(cards.is_empty());

        let required = require_records(cards, RecordKind::Flashcard);
        assert_eq!(
            required,
            Err(GenerationError::EmptyYield {
                task: RecordKind::Flashcard
            })
        );
    }

    #[tokio::test]
    async fn test_explain_trims_output() {
        let service = LLMService::new(ScriptedClient::replying("\n  ATP is energy currency.  \n"));
        let text = service.explain_concept(SOURCE, "ATP").await.unwrap();
        assert_eq!(text, "ATP is energy currency.");
    }
}
