use crate::errors::GenerationError;
use crate::output_parser::{
    ANSWER_TAG, BLOCK_DELIMITER, CORRECT_TAG, DIFFICULTY_TAG, EXPLANATION_TAG, OPTION_TAGS,
    QUESTION_TAG,
};

pub const DEFAULT_FLASHCARD_COUNT: usize = 10;
pub const DEFAULT_QUIZ_QUESTIONS: usize = 5;

/// Upper bound on requested records per generation.
pub const MAX_REQUESTED_RECORDS: usize = 50;

const SOURCE_BUDGET_CHARS: usize = 12_000;
const SUMMARY_BUDGET_CHARS: usize = 15_000;

const MIN_FLASHCARD_SOURCE_CHARS: usize = 20;
const MIN_QUIZ_SOURCE_CHARS: usize = 30;
const MIN_SUMMARY_SOURCE_CHARS: usize = 10;
const MIN_GROUNDED_SOURCE_CHARS: usize = 1;

/// A generation task together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationTask {
    Flashcards { count: usize },
    Quiz { num_questions: usize },
    Summary,
    Explain { concept: String },
    Chat { question: String },
}

impl GenerationTask {
    pub fn flashcards(count: Option<usize>) -> Self {
        GenerationTask::Flashcards {
            count: count.unwrap_or(DEFAULT_FLASHCARD_COUNT),
        }
    }

    pub fn quiz(num_questions: Option<usize>) -> Self {
        GenerationTask::Quiz {
            num_questions: num_questions.unwrap_or(DEFAULT_QUIZ_QUESTIONS),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GenerationTask::Flashcards { .. } => "flashcards",
            GenerationTask::Quiz { .. } => "quiz",
            GenerationTask::Summary => "summary",
            GenerationTask::Explain { .. } => "explain",
            GenerationTask::Chat { .. } => "chat",
        }
    }

    fn source_budget(&self) -> usize {
        match self {
            GenerationTask::Summary => SUMMARY_BUDGET_CHARS,
            _ => SOURCE_BUDGET_CHARS,
        }
    }

    fn min_source_chars(&self) -> usize {
        match self {
            GenerationTask::Flashcards { .. } => MIN_FLASHCARD_SOURCE_CHARS,
            GenerationTask::Quiz { .. } => MIN_QUIZ_SOURCE_CHARS,
            GenerationTask::Summary => MIN_SUMMARY_SOURCE_CHARS,
            GenerationTask::Explain { .. } | GenerationTask::Chat { .. } => {
                MIN_GROUNDED_SOURCE_CHARS
            }
        }
    }

    fn validate(&self, source_chars: usize) -> Result<(), GenerationError> {
        if source_chars < self.min_source_chars() {
            return Err(GenerationError::Validation(format!(
                "text too short for {} ({} characters, need at least {})",
                self.name(),
                source_chars,
                self.min_source_chars()
            )));
        }

        match self {
            GenerationTask::Flashcards { count } => check_count("count", *count),
            GenerationTask::Quiz { num_questions } => check_count("numQuestions", *num_questions),
            GenerationTask::Explain { concept } if concept.trim().is_empty() => Err(
                GenerationError::Validation("concept is required".to_string()),
            ),
            GenerationTask::Chat { question } if question.trim().is_empty() => Err(
                GenerationError::Validation("question is required".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

fn check_count(field: &str, count: usize) -> Result<(), GenerationError> {
    if count == 0 || count > MAX_REQUESTED_RECORDS {
        return Err(GenerationError::Validation(format!(
            "{field} must be between 1 and {MAX_REQUESTED_RECORDS}"
        )));
    }
    Ok(())
}

/// Hard cutoff at `max_chars` characters, no sentence awareness.
pub fn truncate_source(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Build the prompt for `task` over `source_text`.
pub fn build_prompt(task: &GenerationTask, source_text: &str) -> Result<String, GenerationError> {
    task.validate(source_text.chars().count())?;
    let source = truncate_source(source_text, task.source_budget());

    let prompt = match task {
        GenerationTask::Flashcards { count } => flashcard_prompt(*count, source),
        GenerationTask::Quiz { num_questions } => quiz_prompt(*num_questions, source),
        GenerationTask::Summary => summary_prompt(source),
        GenerationTask::Explain { concept } => explain_prompt(concept.trim(), source),
        GenerationTask::Chat { question } => chat_prompt(question.trim(), source),
    };
    Ok(prompt)
}

fn flashcard_prompt(count: usize, source: &str) -> String {
    format!(
        r#"Generate exactly {count} educational flashcards from the text below.

Use this format for every flashcard, with each field on its own line:
{QUESTION_TAG}: <question>
{ANSWER_TAG}: <answer>
{DIFFICULTY_TAG}: easy | medium | hard

Separate flashcards with a line containing only {BLOCK_DELIMITER}
Do not number the flashcards and do not add any other text.

Text:
{source}
"#
    )
}

fn quiz_prompt(num_questions: usize, source: &str) -> String {
    let [o1, o2, o3, o4] = OPTION_TAGS;
    format!(
        r#"Generate exactly {num_questions} multiple choice questions from the text below.

Use this format for every question, with each field on its own line:
{QUESTION_TAG}: <question>
{o1}: <option 1>
{o2}: <option 2>
{o3}: <option 3>
{o4}: <option 4>
{CORRECT_TAG}: <number of the correct option, one of {o1}, {o2}, {o3}, {o4}>
{EXPLANATION_TAG}: <short explanation>
{DIFFICULTY_TAG}: easy | medium | hard

Every question must have exactly four options and exactly one correct option.
Separate questions with a line containing only {BLOCK_DELIMITER}
Do not add any other text.

Text:
{source}
"#
    )
}

fn summary_prompt(source: &str) -> String {
    format!(
        r#"Summarize the following document. Cover the main ideas, key terms, and conclusions in clear, concise prose.

Document:
{source}
"#
    )
}

fn explain_prompt(concept: &str, source: &str) -> String {
    format!(
        r#"Explain "{concept}" using ONLY the document below.

Document:
{source}

Explain simply with examples:
"#
    )
}

fn chat_prompt(question: &str, source: &str) -> String {
    format!(
        r#"Answer ONLY using the document below. If the document does not contain the answer, say so.

Document:
{source}

Question:
{question}
"#
    )
}
