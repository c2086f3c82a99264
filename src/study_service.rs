use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use uuid::Uuid;

use crate::database::Database;
use crate::errors::ApiError;
use crate::llm_service::{LLMService, require_records};
use crate::models::*;
use crate::output_parser::{OPTION_TAGS, RecordKind};
use crate::text_extraction::{MAX_RELEVANT_CHUNKS, relevant_chunks};

use crate::{log_service_error, log_service_start, log_service_success};

type InFlightKey = (Uuid, RecordKind);

/// Documents with a flashcard or quiz generation currently running.
#[derive(Clone, Default)]
pub struct GenerationRegistry {
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl GenerationRegistry {
    /// Claim the (document, kind) slot, or fail if another request holds it.
    pub fn try_acquire(&self, document_id: Uuid, kind: RecordKind) -> Result<GenerationPermit, ApiError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| ApiError::InternalError("generation registry poisoned".to_string()))?;

        if !in_flight.insert((document_id, kind)) {
            return Err(ApiError::GenerationInProgress(format!(
                "{} generation already running for document {}",
                kind, document_id
            )));
        }

        Ok(GenerationPermit {
            key: (document_id, kind),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_running(&self, document_id: Uuid, kind: RecordKind) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&(document_id, kind)))
            .unwrap_or(false)
    }
}

/// Releases its slot when dropped, whether the generation succeeded or not.
pub struct GenerationPermit {
    key: InFlightKey,
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl Drop for GenerationPermit {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}

#[derive(Clone)]
pub struct StudyService {
    db: Database,
    llm: LLMService,
    generations: GenerationRegistry,
}

impl StudyService {
    pub fn new(db: Database, llm: LLMService) -> Self {
        Self {
            db,
            llm,
            generations: GenerationRegistry::default(),
        }
    }

    pub fn generations(&self) -> &GenerationRegistry {
        &self.generations
    }

    async fn document(&self, user_id: Uuid, document_id: Uuid) -> Result<Document, ApiError> {
        self.db
            .get_document(user_id, document_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Document with ID '{}' not found", document_id)))
    }

    /// Load a document whose text is available for generation.
    async fn ready_document(&self, user_id: Uuid, document_id: Uuid) -> Result<Document, ApiError> {
        let document = self.document(user_id, document_id).await?;
        if document.status != DocumentStatus::Ready || document.extracted_text.trim().is_empty() {
            return Err(ApiError::ValidationError(format!(
                "document is {} and has no extracted text",
                document.status.as_str()
            )));
        }
        Ok(document)
    }

    // Generation

    pub async fn generate_flashcards(
        &self,
        user_id: Uuid,
        request: GenerateFlashcardsRequest,
    ) -> Result<FlashcardSet, ApiError> {
        log_service_start!("study_service", "generate_flashcards", document_id = request.document_id);
        let started = Instant::now();
        let document = self.ready_document(user_id, request.document_id).await?;
        let _permit = self.generations.try_acquire(document.id, RecordKind::Flashcard)?;

        let cards = self
            .llm
            .generate_flashcards(&document.extracted_text, request.count)
            .await
            .and_then(|cards| require_records(cards, RecordKind::Flashcard))
            .inspect_err(|err| {
                log_service_error!(
                    "study_service",
                    "generate_flashcards",
                    document_id = document.id,
                    error = err
                );
            })?;

        let set = self.db.create_flashcard_set(user_id, document.id, &cards).await?;
        log_service_success!(
            "study_service",
            "generate_flashcards",
            document_id = document.id,
            count = set.cards.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(set)
    }

    pub async fn generate_quiz(&self, user_id: Uuid, request: GenerateQuizRequest) -> Result<Quiz, ApiError> {
        log_service_start!("study_service", "generate_quiz", document_id = request.document_id);
        let started = Instant::now();
        let document = self.ready_document(user_id, request.document_id).await?;
        let _permit = self.generations.try_acquire(document.id, RecordKind::QuizQuestion)?;

        let questions = self
            .llm
            .generate_quiz(&document.extracted_text, request.num_questions)
            .await
            .and_then(|questions| require_records(questions, RecordKind::QuizQuestion))
            .inspect_err(|err| {
                log_service_error!("study_service", "generate_quiz", document_id = document.id, error = err);
            })?;

        let title = quiz_title(request.title, &document.title);
        let quiz = self.db.create_quiz(user_id, document.id, title, questions).await?;
        log_service_success!(
            "study_service",
            "generate_quiz",
            document_id = document.id,
            count = quiz.questions.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(quiz)
    }

    pub async fn generate_summary(&self, user_id: Uuid, document_id: Uuid) -> Result<String, ApiError> {
        let document = self.ready_document(user_id, document_id).await?;
        Ok(self.llm.generate_summary(&document.extracted_text).await?)
    }

    pub async fn explain_concept(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        concept: &str,
    ) -> Result<String, ApiError> {
        if concept.trim().is_empty() {
            return Err(ApiError::ValidationError("concept is required".to_string()));
        }
        let document = self.ready_document(user_id, document_id).await?;
        Ok(self.llm.explain_concept(&document.extracted_text, concept).await?)
    }

    // Chat

    /// Answer a question about a document and record both turns.
    ///
    /// Nothing is written unless generation succeeds.
    pub async fn chat(&self, user_id: Uuid, document_id: Uuid, question: &str) -> Result<ChatExchange, ApiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::ValidationError("question is required".to_string()));
        }
        let document = self.ready_document(user_id, document_id).await?;
        let relevant = relevant_chunks(&document.chunks, question, MAX_RELEVANT_CHUNKS);

        let answer = self
            .llm
            .answer_question(&document.extracted_text, question)
            .await
            .inspect_err(|err| {
                log_service_error!("study_service", "chat", document_id = document_id, error = err);
            })?;

        self.db
            .append_chat_exchange(user_id, document_id, question, &answer, &relevant)
            .await?;

        Ok(ChatExchange {
            question: question.to_string(),
            answer,
            relevant_chunks: relevant,
        })
    }

    pub async fn chat_history(&self, user_id: Uuid, document_id: Uuid) -> Result<Vec<ChatMessage>, ApiError> {
        self.document(user_id, document_id).await?;
        Ok(self.db.get_chat_history(user_id, document_id).await?)
    }

    // Flashcards

    pub async fn list_flashcard_sets(&self, user_id: Uuid) -> Result<Vec<FlashcardSet>, ApiError> {
        Ok(self.db.list_flashcard_sets(user_id).await?)
    }

    pub async fn flashcard_sets_for_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<FlashcardSet>, ApiError> {
        self.document(user_id, document_id).await?;
        Ok(self.db.list_flashcard_sets_for_document(user_id, document_id).await?)
    }

    pub async fn review_flashcard(&self, user_id: Uuid, card_id: Uuid) -> Result<Flashcard, ApiError> {
        self.db
            .record_flashcard_review(user_id, card_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Flashcard with ID '{}' not found", card_id)))
    }

    pub async fn toggle_star(&self, user_id: Uuid, card_id: Uuid) -> Result<Flashcard, ApiError> {
        self.db
            .toggle_flashcard_star(user_id, card_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Flashcard with ID '{}' not found", card_id)))
    }

    pub async fn delete_flashcard_set(&self, user_id: Uuid, set_id: Uuid) -> Result<(), ApiError> {
        if !self.db.delete_flashcard_set(user_id, set_id).await? {
            return Err(ApiError::NotFound(format!("Flashcard set with ID '{}' not found", set_id)));
        }
        Ok(())
    }

    // Quizzes

    pub async fn create_quiz(&self, user_id: Uuid, request: CreateQuizRequest) -> Result<Quiz, ApiError> {
        validate_questions(&request.questions)?;
        let document = self.document(user_id, request.document_id).await?;
        let title = quiz_title(request.title, &document.title);
        Ok(self
            .db
            .create_quiz(user_id, document.id, title, request.questions)
            .await?)
    }

    pub async fn quizzes_for_document(&self, user_id: Uuid, document_id: Uuid) -> Result<Vec<Quiz>, ApiError> {
        self.document(user_id, document_id).await?;
        Ok(self.db.list_quizzes_for_document(user_id, document_id).await?)
    }

    pub async fn get_quiz(&self, user_id: Uuid, quiz_id: Uuid) -> Result<Quiz, ApiError> {
        self.db
            .get_quiz(user_id, quiz_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Quiz with ID '{}' not found", quiz_id)))
    }

    /// Score and store a submission, replacing any earlier one.
    pub async fn submit_quiz(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        answers: Vec<String>,
    ) -> Result<QuizSubmission, ApiError> {
        let quiz = self.get_quiz(user_id, quiz_id).await?;
        let score = score_answers(&quiz.questions, &answers);
        if !self.db.save_quiz_submission(user_id, quiz_id, &answers, score).await? {
            return Err(ApiError::NotFound(format!("Quiz with ID '{}' not found", quiz_id)));
        }
        Ok(QuizSubmission {
            score,
            total: quiz.total_questions,
        })
    }

    pub async fn quiz_results(&self, user_id: Uuid, quiz_id: Uuid) -> Result<QuizResults, ApiError> {
        let quiz = self.get_quiz(user_id, quiz_id).await?;
        Ok(build_results(quiz))
    }

    pub async fn delete_quiz(&self, user_id: Uuid, quiz_id: Uuid) -> Result<(), ApiError> {
        if !self.db.delete_quiz(user_id, quiz_id).await? {
            return Err(ApiError::NotFound(format!("Quiz with ID '{}' not found", quiz_id)));
        }
        Ok(())
    }
}

fn quiz_title(requested: Option<String>, document_title: &str) -> String {
    requested
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Quiz - {}", document_title))
}

fn validate_questions(questions: &[QuizQuestionRecord]) -> Result<(), ApiError> {
    if questions.is_empty() {
        return Err(ApiError::ValidationError("a quiz needs at least one question".to_string()));
    }
    for (index, question) in questions.iter().enumerate() {
        let number = index + 1;
        if question.question.trim().is_empty() {
            return Err(ApiError::ValidationError(format!("question {} has no text", number)));
        }
        if question.options.len() != OPTION_TAGS.len() {
            return Err(ApiError::ValidationError(format!(
                "question {} must have exactly {} options",
                number,
                OPTION_TAGS.len()
            )));
        }
        if !question.options.contains(&question.correct_answer) {
            return Err(ApiError::ValidationError(format!(
                "question {} has a correct answer that is not one of its options",
                number
            )));
        }
    }
    Ok(())
}

/// Exact-match scoring; positions without an answer count as wrong.
pub fn score_answers(questions: &[QuizQuestionRecord], answers: &[String]) -> i64 {
    questions
        .iter()
        .zip(answers)
        .filter(|(question, answer)| **answer == question.correct_answer)
        .count() as i64
}

fn build_results(quiz: Quiz) -> QuizResults {
    let answers = quiz.user_answers.unwrap_or_default();
    let percentage = match quiz.score {
        Some(score) if quiz.total_questions > 0 => {
            Some(((score as f64 / quiz.total_questions as f64) * 100.0).round() as u32)
        }
        _ => None,
    };

    let results = quiz
        .questions
        .into_iter()
        .enumerate()
        .map(|(index, question)| {
            let user_answer = answers.get(index).cloned();
            let is_correct = user_answer.as_deref() == Some(question.correct_answer.as_str());
            QuestionResult {
                question,
                user_answer,
                is_correct,
            }
        })
        .collect();

    QuizResults {
        quiz_id: quiz.id,
        title: quiz.title,
        score: quiz.score,
        total: quiz.total_questions,
        percentage,
        completed_at: quiz.completed_at,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GenerationError;
    use crate::llm_providers::GenerationClient;
    use async_trait::async_trait;

    const TEXT: &str = "Mitochondria produce ATP. Rome is the capital of Italy. Cells divide by mitosis.";

    struct FixedClient(Result<String, GenerationError>);

    #[async_trait]
    impl GenerationClient for FixedClient {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.clone()
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }
    }

    async fn setup(reply: Result<&str, GenerationError>) -> (StudyService, Uuid, Uuid) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user_id = Uuid::new_v4();
        let document = db
            .create_document(NewDocument {
                user_id,
                title: "Biology".to_string(),
                file_name: "biology.pdf".to_string(),
                file_path: "/tmp/biology.pdf".to_string(),
                file_size: 100,
            })
            .await
            .unwrap();
        let chunks = vec![DocumentChunk {
            chunk_index: 0,
            content: TEXT.to_string(),
        }];
        db.mark_document_ready(document.id, TEXT, &chunks).await.unwrap();

        let client = FixedClient(reply.map(str::to_string));
        let service = StudyService::new(db, LLMService::new(Arc::new(client)));
        (service, user_id, document.id)
    }

    fn question(text: &str, correct: &str) -> QuizQuestionRecord {
        QuizQuestionRecord {
            question: text.to_string(),
            options: vec!["Paris".into(), "London".into(), "Rome".into(), "Berlin".into()],
            correct_answer: correct.to_string(),
            explanation: None,
            difficulty: Difficulty::Medium,
        }
    }

    #[test]
    fn test_registry_rejects_second_claim_until_released() {
        let registry = GenerationRegistry::default();
        let document_id = Uuid::new_v4();

        let permit = registry.try_acquire(document_id, RecordKind::Flashcard).unwrap();
        assert!(matches!(
            registry.try_acquire(document_id, RecordKind::Flashcard),
            Err(ApiError::GenerationInProgress(_))
        ));
        // A different kind on the same document is independent.
        let quiz_permit = registry.try_acquire(document_id, RecordKind::QuizQuestion).unwrap();

        drop(permit);
        assert!(!registry.is_running(document_id, RecordKind::Flashcard));
        assert!(registry.is_running(document_id, RecordKind::QuizQuestion));
        drop(quiz_permit);
        assert!(registry.try_acquire(document_id, RecordKind::Flashcard).is_ok());
    }

    #[test]
    fn test_score_answers_exact_match() {
        let questions = vec![question("a", "Rome"), question("b", "Paris"), question("c", "Berlin")];
        let answers = vec!["Rome".to_string(), "paris".to_string()];
        assert_eq!(score_answers(&questions, &answers), 1);
        assert_eq!(score_answers(&questions, &[]), 0);
    }

    #[test]
    fn test_validate_questions() {
        assert!(validate_questions(&[]).is_err());
        assert!(validate_questions(&[question("a", "Madrid")]).is_err());

        let mut three_options = question("a", "Rome");
        three_options.options.pop();
        assert!(validate_questions(&[three_options]).is_err());

        assert!(validate_questions(&[question("a", "Rome")]).is_ok());
    }

    #[tokio::test]
    async fn test_generate_flashcards_persists_set() {
        let (service, user_id, document_id) =
            setup(Ok("Q: What produces ATP?\nA: Mitochondria\nD: easy\n---\nQ: missing answer")).await;

        let set = service
            .generate_flashcards(
                user_id,
                GenerateFlashcardsRequest {
                    document_id,
                    count: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(set.cards.len(), 1);
        assert_eq!(set.cards[0].difficulty, Difficulty::Easy);
        assert!(!service.generations().is_running(document_id, RecordKind::Flashcard));
    }

    #[tokio::test]
    async fn test_empty_yield_persists_nothing() {
        let (service, user_id, document_id) = setup(Ok("Sorry, I can't do that.")).await;

        let result = service
            .generate_flashcards(
                user_id,
                GenerateFlashcardsRequest {
                    document_id,
                    count: Some(3),
                },
            )
            .await;
        assert!(matches!(result, Err(ApiError::LLMError(_))));
        assert!(service.list_flashcard_sets(user_id).await.unwrap().is_empty());
        assert!(!service.generations().is_running(document_id, RecordKind::Flashcard));
    }

    #[tokio::test]
    async fn test_generate_quiz_default_title_and_results() {
        let (service, user_id, document_id) = setup(Ok(
            "Q: Capital of Italy?\n01: Paris\n02: London\n03: Rome\n04: Berlin\nC: 03\nE: Rome.\nD: easy",
        ))
        .await;

        let quiz = service
            .generate_quiz(
                user_id,
                GenerateQuizRequest {
                    document_id,
                    num_questions: Some(1),
                    title: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(quiz.title, "Quiz - Biology");

        let pending = service.quiz_results(user_id, quiz.id).await.unwrap();
        assert_eq!(pending.percentage, None);
        assert!(!pending.results[0].is_correct);

        let submission = service
            .submit_quiz(user_id, quiz.id, vec!["Rome".to_string()])
            .await
            .unwrap();
        assert_eq!(submission.score, 1);
        assert_eq!(submission.total, 1);

        let results = service.quiz_results(user_id, quiz.id).await.unwrap();
        assert_eq!(results.percentage, Some(100));
        assert!(results.results[0].is_correct);

        // Resubmission overwrites the earlier score.
        service
            .submit_quiz(user_id, quiz.id, vec!["Paris".to_string()])
            .await
            .unwrap();
        let results = service.quiz_results(user_id, quiz.id).await.unwrap();
        assert_eq!(results.score, Some(0));
        assert_eq!(results.percentage, Some(0));
    }

    #[tokio::test]
    async fn test_failed_chat_writes_nothing() {
        let (service, user_id, document_id) =
            setup(Err(GenerationError::Upstream("timeout".to_string()))).await;

        let result = service.chat(user_id, document_id, "What produces ATP?").await;
        assert!(matches!(result, Err(ApiError::LLMError(_))));
        assert!(service.chat_history(user_id, document_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_records_pair_with_relevant_chunks() {
        let (service, user_id, document_id) = setup(Ok("  Mitochondria do.  ")).await;

        let exchange = service
            .chat(user_id, document_id, "  What produces ATP?  ")
            .await
            .unwrap();
        assert_eq!(exchange.answer, "Mitochondria do.");
        assert_eq!(exchange.relevant_chunks, vec![0]);

        let history = service.chat_history(user_id, document_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "What produces ATP?");
        assert_eq!(history[1].role, ChatRole::Assistant);

        assert!(matches!(
            service.chat(user_id, document_id, "   ").await,
            Err(ApiError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_documents() {
        let (service, _user_id, document_id) = setup(Ok("Summary.")).await;
        assert!(matches!(
            service.generate_summary(Uuid::new_v4(), document_id).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
