//! Parser for the block format the generation prompts ask the model to emit.
//!
//! Raw output is split on [`BLOCK_DELIMITER`] into blocks. Each block is
//! tokenized line by line; a line is a field when it starts with a known tag
//! followed by `:`. Blocks that lack a required field are skipped whole, never
//! repaired, and skipping is not an error: a batch where nothing parses yields
//! an empty sequence.

use std::fmt;

use crate::models::{Difficulty, FlashcardRecord, QuizQuestionRecord};

/// Separates one generated record from the next.
pub const BLOCK_DELIMITER: &str = "---";

pub const QUESTION_TAG: &str = "Q";
pub const ANSWER_TAG: &str = "A";
pub const DIFFICULTY_TAG: &str = "D";
pub const CORRECT_TAG: &str = "C";
pub const EXPLANATION_TAG: &str = "E";
pub const OPTION_TAGS: [&str; 4] = ["01", "02", "03", "04"];

/// Which record type a raw generation should be parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Flashcard,
    QuizQuestion,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Flashcard => f.write_str("flashcard"),
            RecordKind::QuizQuestion => f.write_str("quiz"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecords {
    Flashcards(Vec<FlashcardRecord>),
    QuizQuestions(Vec<QuizQuestionRecord>),
}

impl ParsedRecords {
    pub fn len(&self) -> usize {
        match self {
            ParsedRecords::Flashcards(cards) => cards.len(),
            ParsedRecords::QuizQuestions(questions) => questions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a block was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing question line")]
    MissingQuestion,
    #[error("missing answer line")]
    MissingAnswer,
    #[error("expected 4 options, found {0}")]
    WrongOptionCount(usize),
    #[error("missing or malformed correct option tag")]
    MissingCorrectOption,
}

/// Result of parsing a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome<T> {
    Parsed(T),
    Skipped(SkipReason),
}

/// Every block's outcome, in generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReport<T> {
    pub outcomes: Vec<BlockOutcome<T>>,
}

impl<T: Clone> ParseReport<T> {
    /// Parsed records in order, truncated to `limit`.
    pub fn records(&self, limit: usize) -> Vec<T> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                BlockOutcome::Parsed(record) => Some(record.clone()),
                BlockOutcome::Skipped(_) => None,
            })
            .take(limit)
            .collect()
    }

    /// `(block index, reason)` for every dropped block.
    pub fn skipped(&self) -> Vec<(usize, &SkipReason)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                BlockOutcome::Skipped(reason) => Some((index, reason)),
                BlockOutcome::Parsed(_) => None,
            })
            .collect()
    }

    fn log_skips(&self, kind: RecordKind) {
        for (block_index, reason) in self.skipped() {
            crate::log_parse_skip!(kind, block_index, reason);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldTag {
    Question,
    Answer,
    Difficulty,
    Option,
    Correct,
    Explanation,
}

#[derive(Debug, Clone, Copy)]
struct Field<'a> {
    tag: FieldTag,
    value: &'a str,
}

/// Recognize `TAG:` at the very start of a line. Tags are case-sensitive.
fn tokenize_line(line: &str) -> Option<Field<'_>> {
    let (tag, value) = line.split_once(':')?;
    let tag = match tag {
        QUESTION_TAG => FieldTag::Question,
        ANSWER_TAG => FieldTag::Answer,
        DIFFICULTY_TAG => FieldTag::Difficulty,
        CORRECT_TAG => FieldTag::Correct,
        EXPLANATION_TAG => FieldTag::Explanation,
        t if OPTION_TAGS.contains(&t) => FieldTag::Option,
        _ => return None,
    };
    Some(Field {
        tag,
        value: value.trim(),
    })
}

fn tokenize_block(block: &str) -> Vec<Field<'_>> {
    block.lines().filter_map(tokenize_line).collect()
}

/// First non-empty value carried by `tag`, if any.
fn first_value<'a>(fields: &[Field<'a>], tag: FieldTag) -> Option<&'a str> {
    fields
        .iter()
        .find(|field| field.tag == tag)
        .map(|field| field.value)
        .filter(|value| !value.is_empty())
}

/// Split raw output into trimmed, non-empty blocks, preserving order.
pub fn split_blocks(raw: &str) -> Vec<&str> {
    raw.split(BLOCK_DELIMITER)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .collect()
}

pub fn parse_flashcard_block(block: &str) -> BlockOutcome<FlashcardRecord> {
    let fields = tokenize_block(block);

    let Some(question) = first_value(&fields, FieldTag::Question) else {
        return BlockOutcome::Skipped(SkipReason::MissingQuestion);
    };
    let Some(answer) = first_value(&fields, FieldTag::Answer) else {
        return BlockOutcome::Skipped(SkipReason::MissingAnswer);
    };
    let difficulty = first_value(&fields, FieldTag::Difficulty)
        .map(Difficulty::from_label)
        .unwrap_or_default();

    BlockOutcome::Parsed(FlashcardRecord {
        question: question.to_string(),
        answer: answer.to_string(),
        difficulty,
    })
}

/// Map a correct-option value such as `03` or `03 (Rome)` to a zero-based index.
fn correct_option_index(value: &str) -> Option<usize> {
    let tag = value.get(..2)?;
    OPTION_TAGS.iter().position(|candidate| *candidate == tag)
}

pub fn parse_quiz_block(block: &str) -> BlockOutcome<QuizQuestionRecord> {
    let fields = tokenize_block(block);

    let Some(question) = first_value(&fields, FieldTag::Question) else {
        return BlockOutcome::Skipped(SkipReason::MissingQuestion);
    };

    // Every option line counts, in the order it appears.
    let options: Vec<String> = fields
        .iter()
        .filter(|field| field.tag == FieldTag::Option)
        .map(|field| field.value.to_string())
        .collect();
    if options.len() != OPTION_TAGS.len() {
        return BlockOutcome::Skipped(SkipReason::WrongOptionCount(options.len()));
    }

    let Some(correct_index) =
        first_value(&fields, FieldTag::Correct).and_then(correct_option_index)
    else {
        return BlockOutcome::Skipped(SkipReason::MissingCorrectOption);
    };

    let explanation = first_value(&fields, FieldTag::Explanation).map(str::to_string);
    let difficulty = first_value(&fields, FieldTag::Difficulty)
        .map(Difficulty::from_label)
        .unwrap_or_default();

    BlockOutcome::Parsed(QuizQuestionRecord {
        question: question.to_string(),
        correct_answer: options[correct_index].clone(),
        options,
        explanation,
        difficulty,
    })
}

pub fn flashcard_report(raw: &str) -> ParseReport<FlashcardRecord> {
    ParseReport {
        outcomes: split_blocks(raw)
            .into_iter()
            .map(parse_flashcard_block)
            .collect(),
    }
}

pub fn quiz_report(raw: &str) -> ParseReport<QuizQuestionRecord> {
    ParseReport {
        outcomes: split_blocks(raw).into_iter().map(parse_quiz_block).collect(),
    }
}

pub fn parse_flashcards(raw: &str, requested_count: usize) -> Vec<FlashcardRecord> {
    let report = flashcard_report(raw);
    report.log_skips(RecordKind::Flashcard);
    report.records(requested_count)
}

pub fn parse_quiz(raw: &str, requested_count: usize) -> Vec<QuizQuestionRecord> {
    let report = quiz_report(raw);
    report.log_skips(RecordKind::QuizQuestion);
    report.records(requested_count)
}

/// Parse `raw` into records of `kind`, keeping at most `requested_count`.
pub fn parse(kind: RecordKind, raw: &str, requested_count: usize) -> ParsedRecords {
    match kind {
        RecordKind::Flashcard => ParsedRecords::Flashcards(parse_flashcards(raw, requested_count)),
        RecordKind::QuizQuestion => ParsedRecords::QuizQuestions(parse_quiz(raw, requested_count)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_QUIZ: &str = "Q: What is the capital of Italy?\n01: Paris\n02: London\n03: Rome\n04: Berlin\nC: 03\nE: Rome has been the capital since 1871.\nD: easy";

    #[test]
    fn test_single_flashcard() {
        let cards = parse_flashcards("Q: What is 2+2?\nA: 4\nD: easy", 10);
        assert_eq!(
            cards,
            vec![FlashcardRecord {
                question: "What is 2+2?".to_string(),
                answer: "4".to_string(),
                difficulty: Difficulty::Easy,
            }]
        );
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(parse_flashcards("", 10).is_empty());
        assert!(parse_quiz("", 5).is_empty());
        assert!(parse(RecordKind::Flashcard, "  \n---\n  ", 10).is_empty());
    }

    #[test]
    fn test_flashcard_missing_answer_is_dropped() {
        let raw = "Q: First?\nA: One\n---\nQ: Second?\nD: hard\n---\nQ: Third?\nA: Three";
        let cards = parse_flashcards(raw, 10);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "First?");
        assert_eq!(cards[1].question, "Third?");

        let report = flashcard_report(raw);
        assert_eq!(report.skipped(), vec![(1, &SkipReason::MissingAnswer)]);
    }

    #[test]
    fn test_flashcard_blank_fields_count_as_missing() {
        let report = flashcard_report("Q:   \nA: something");
        assert_eq!(report.skipped(), vec![(0, &SkipReason::MissingQuestion)]);
    }

    #[test]
    fn test_flashcard_difficulty_normalization() {
        let raw = "Q: a\nA: b\nD: HARD\n---\nQ: c\nA: d\nD: brutal\n---\nQ: e\nA: f";
        let cards = parse_flashcards(raw, 10);
        let difficulties: Vec<Difficulty> = cards.iter().map(|c| c.difficulty).collect();
        assert_eq!(
            difficulties,
            vec![Difficulty::Hard, Difficulty::Medium, Difficulty::Medium]
        );
    }

    #[test]
    fn test_truncates_to_requested_count() {
        let raw = (1..=6)
            .map(|i| format!("Q: question {i}\nA: answer {i}"))
            .collect::<Vec<_>>()
            .join("\n---\n");
        let cards = parse_flashcards(&raw, 4);
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[3].question, "question 4");

        assert!(parse_flashcards(&raw, 0).is_empty());
    }

    #[test]
    fn test_record_count_bounded_by_blocks_and_request() {
        let inputs = [
            "Q: a\nA: b",
            "Q: a\nA: b\n---\nnoise\n---\nQ: c\nA: d",
            "---\n---\nQ: only question",
            "Q: a\nA: b\n---\nQ: c\nA: d\n---\nQ: e\nA: f",
        ];
        for raw in inputs {
            let blocks = split_blocks(raw).len();
            for requested in 0..5 {
                let count = parse_flashcards(raw, requested).len();
                assert!(count <= blocks, "{raw:?} produced more records than blocks");
                assert!(count <= requested, "{raw:?} exceeded requested count");
            }
        }
    }

    #[test]
    fn test_tags_are_line_anchored_and_case_sensitive() {
        let raw = "q: lowercase tag\nA: answer\n  Q: indented\nNote Q: inline";
        let report = flashcard_report(raw);
        assert_eq!(report.skipped(), vec![(0, &SkipReason::MissingQuestion)]);
    }

    #[test]
    fn test_unknown_lines_are_ignored() {
        let raw = "Here is your card:\nQ: What is Rust?\nSome commentary\nA: A systems language\nNotes: none";
        let cards = parse_flashcards(raw, 10);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].answer, "A systems language");
    }

    #[test]
    fn test_answer_keeps_text_after_first_colon() {
        let cards = parse_flashcards("Q: Ratio?\nA: 3:1 in favour", 1);
        assert_eq!(cards[0].answer, "3:1 in favour");
    }

    #[test]
    fn test_quiz_resolves_correct_option_text() {
        let questions = parse_quiz(VALID_QUIZ, 5);
        assert_eq!(questions.len(), 1);
        let question = &questions[0];
        assert_eq!(question.options, vec!["Paris", "London", "Rome", "Berlin"]);
        assert_eq!(question.correct_answer, "Rome");
        assert_eq!(
            question.explanation.as_deref(),
            Some("Rome has been the capital since 1871.")
        );
        assert_eq!(question.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_quiz_first_tag_maps_to_first_option() {
        let raw = "Q: Pick one\n01: alpha\n02: beta\n03: gamma\n04: delta\nC: 01";
        let questions = parse_quiz(raw, 1);
        assert_eq!(questions[0].correct_answer, questions[0].options[0]);
        assert_eq!(questions[0].correct_answer, "alpha");

        let raw = "Q: Pick one\n01: alpha\n02: beta\n03: gamma\n04: delta\nC: 04";
        assert_eq!(parse_quiz(raw, 1)[0].correct_answer, "delta");
    }

    #[test]
    fn test_quiz_correct_tag_with_trailing_text() {
        let raw = "Q: Pick one\n01: alpha\n02: beta\n03: gamma\n04: delta\nC: 02 (beta)";
        assert_eq!(parse_quiz(raw, 1)[0].correct_answer, "beta");
    }

    #[test]
    fn test_quiz_rejects_wrong_option_count() {
        let three = "Q: Pick\n01: a\n02: b\n03: c\nC: 01";
        let five = "Q: Pick\n01: a\n02: b\n03: c\n04: d\n04: e\nC: 01";
        let report = quiz_report(&format!("{three}\n---\n{five}"));
        assert_eq!(
            report.skipped(),
            vec![
                (0, &SkipReason::WrongOptionCount(3)),
                (1, &SkipReason::WrongOptionCount(5)),
            ]
        );
        assert!(report.records(10).is_empty());
    }

    #[test]
    fn test_quiz_options_collected_by_line_not_by_number() {
        let raw = "Q: Pick\n01: a\n02: b\n02: c\n04: d\nC: 03";
        let questions = parse_quiz(raw, 1);
        assert_eq!(questions[0].options, vec!["a", "b", "c", "d"]);
        assert_eq!(questions[0].correct_answer, "c");
    }

    #[test]
    fn test_quiz_rejects_missing_or_malformed_correct_tag() {
        for correct in ["", "C: 05\n", "C: 3\n", "C: Rome\n", "c: 01\n"] {
            let raw = format!("Q: Pick\n01: a\n02: b\n03: c\n04: d\n{correct}");
            let report = quiz_report(&raw);
            assert_eq!(
                report.skipped(),
                vec![(0, &SkipReason::MissingCorrectOption)],
                "correct line {correct:?}"
            );
        }
    }

    #[test]
    fn test_quiz_valid_block_next_to_invalid_one() {
        let missing_correct = "Q: Second?\n01: w\n02: x\n03: y\n04: z\nE: no answer given";
        let raw = format!("{VALID_QUIZ}\n---\n{missing_correct}");
        let questions = parse_quiz(&raw, 5);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "What is the capital of Italy?");
    }

    #[test]
    fn test_quiz_optional_fields_absent() {
        let raw = "Q: Pick\n01: a\n02: b\n03: c\n04: d\nC: 02";
        let question = &parse_quiz(raw, 1)[0];
        assert_eq!(question.explanation, None);
        assert_eq!(question.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = format!("{VALID_QUIZ}\n---\nQ: broken\n---\n{VALID_QUIZ}");
        let first = parse(RecordKind::QuizQuestion, &raw, 5);
        let second = parse(RecordKind::QuizQuestion, &raw, 5);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_windows_line_endings() {
        let cards = parse_flashcards("Q: Line endings?\r\nA: CRLF\r\nD: hard\r\n", 1);
        assert_eq!(cards[0].question, "Line endings?");
        assert_eq!(cards[0].answer, "CRLF");
        assert_eq!(cards[0].difficulty, Difficulty::Hard);
    }
}
