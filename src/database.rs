use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::models::*;

use crate::log_db_operation;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    Uuid::parse_str(&row.get::<String, _>(column))
        .with_context(|| format!("invalid uuid in column '{}'", column))
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to an in-memory database gets its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                extracted_text TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'processing',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcard_sets (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                set_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'medium',
                is_starred INTEGER NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                last_reviewed TEXT,
                FOREIGN KEY (set_id) REFERENCES flashcard_sets(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                title TEXT NOT NULL,
                questions TEXT NOT NULL,
                user_answers TEXT,
                score INTEGER,
                total_questions INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                relevant_chunks TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_document ON chat_messages (user_id, document_id)",
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migrate", "schema ready");
        Ok(())
    }

    // Document operations
    pub async fn create_document(&self, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            user_id: new_document.user_id,
            title: new_document.title,
            file_name: new_document.file_name,
            file_path: new_document.file_path,
            file_size: new_document.file_size,
            extracted_text: String::new(),
            chunks: Vec::new(),
            status: DocumentStatus::Processing,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, title, file_name, file_path, file_size,
                                   extracted_text, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.user_id.to_string())
        .bind(&document.title)
        .bind(&document.file_name)
        .bind(&document.file_path)
        .bind(document.file_size)
        .bind(&document.extracted_text)
        .bind(document.status.as_str())
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(document)
    }

    /// Store extracted text and chunks and mark the document ready.
    pub async fn mark_document_ready(
        &self,
        id: Uuid,
        extracted_text: &str,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE documents SET extracted_text = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(extracted_text)
        .bind(DocumentStatus::Ready.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks (document_id, chunk_index, content) VALUES (?1, ?2, ?3)",
            )
            .bind(id.to_string())
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn mark_document_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(DocumentStatus::Failed.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_document(&self, user_id: Uuid, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1 AND user_id = ?2")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let chunk_rows = sqlx::query(
            "SELECT chunk_index, content FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let chunks = chunk_rows
            .iter()
            .map(|chunk| DocumentChunk {
                chunk_index: chunk.get("chunk_index"),
                content: chunk.get("content"),
            })
            .collect();

        Ok(Some(Document {
            id: parse_uuid(&row, "id")?,
            user_id: parse_uuid(&row, "user_id")?,
            title: row.get("title"),
            file_name: row.get("file_name"),
            file_path: row.get("file_path"),
            file_size: row.get("file_size"),
            extracted_text: row.get("extracted_text"),
            chunks,
            status: DocumentStatus::from_db(&row.get::<String, _>("status")),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        }))
    }

    pub async fn list_documents(&self, user_id: Uuid) -> Result<Vec<DocumentSummary>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT id, title, file_name, file_path, file_size, status, created_at, updated_at
            FROM documents WHERE user_id = ?1 ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            documents.push(DocumentSummary {
                id: parse_uuid(&row, "id")?,
                title: row.get("title"),
                file_name: row.get("file_name"),
                file_path: row.get("file_path"),
                file_size: row.get("file_size"),
                status: DocumentStatus::from_db(&row.get::<String, _>("status")),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
            });
        }

        log_db_operation!(
            debug,
            "list_documents",
            count = documents.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(documents)
    }

    pub async fn update_document_title(&self, user_id: Uuid, id: Uuid, title: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET title = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        )
        .bind(title)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a document with its flashcards, quizzes, chunks and chat history.
    pub async fn delete_document(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let id_str = id.to_string();

        sqlx::query(
            "DELETE FROM flashcards WHERE set_id IN (SELECT id FROM flashcard_sets WHERE document_id = ?1)",
        )
        .bind(&id_str)
        .execute(&mut *tx)
        .await?;

        for statement in [
            "DELETE FROM flashcard_sets WHERE document_id = ?1",
            "DELETE FROM quizzes WHERE document_id = ?1",
            "DELETE FROM chat_messages WHERE document_id = ?1",
            "DELETE FROM document_chunks WHERE document_id = ?1",
        ] {
            sqlx::query(statement).bind(&id_str).execute(&mut *tx).await?;
        }

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1 AND user_id = ?2")
            .bind(&id_str)
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    // Flashcard operations
    pub async fn create_flashcard_set(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        records: &[FlashcardRecord],
    ) -> Result<FlashcardSet> {
        let set = FlashcardSet {
            id: Uuid::new_v4(),
            user_id,
            document_id,
            cards: records
                .iter()
                .map(|record| Flashcard {
                    id: Uuid::new_v4(),
                    question: record.question.clone(),
                    answer: record.answer.clone(),
                    difficulty: record.difficulty,
                    is_starred: false,
                    review_count: 0,
                    last_reviewed: None,
                })
                .collect(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO flashcard_sets (id, user_id, document_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(set.id.to_string())
        .bind(user_id.to_string())
        .bind(document_id.to_string())
        .bind(set.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, card) in set.cards.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO flashcards (id, set_id, position, question, answer, difficulty,
                                        is_starred, review_count, last_reviewed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(card.id.to_string())
            .bind(set.id.to_string())
            .bind(position as i64)
            .bind(&card.question)
            .bind(&card.answer)
            .bind(card.difficulty.as_str())
            .bind(card.is_starred)
            .bind(card.review_count)
            .bind(card.last_reviewed.map(|d| d.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(set)
    }

    async fn load_cards(&self, set_id: &str) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query("SELECT * FROM flashcards WHERE set_id = ?1 ORDER BY position")
            .bind(set_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_flashcard).collect()
    }

    async fn rows_to_sets(&self, rows: Vec<SqliteRow>) -> Result<Vec<FlashcardSet>> {
        let mut sets = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            sets.push(FlashcardSet {
                id: Uuid::parse_str(&id)?,
                user_id: parse_uuid(&row, "user_id")?,
                document_id: parse_uuid(&row, "document_id")?,
                cards: self.load_cards(&id).await?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(sets)
    }

    pub async fn list_flashcard_sets(&self, user_id: Uuid) -> Result<Vec<FlashcardSet>> {
        let rows = sqlx::query(
            "SELECT * FROM flashcard_sets WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        self.rows_to_sets(rows).await
    }

    pub async fn list_flashcard_sets_for_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<FlashcardSet>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM flashcard_sets WHERE user_id = ?1 AND document_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        self.rows_to_sets(rows).await
    }

    /// Fetch a single card, provided the caller owns its set.
    pub async fn get_flashcard(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<Flashcard>> {
        let row = sqlx::query(
            r#"
            SELECT f.* FROM flashcards f
            JOIN flashcard_sets s ON s.id = f.set_id
            WHERE f.id = ?1 AND s.user_id = ?2
            "#,
        )
        .bind(card_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_flashcard).transpose()
    }

    pub async fn record_flashcard_review(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<Flashcard>> {
        let result = sqlx::query(
            r#"
            UPDATE flashcards SET review_count = review_count + 1, last_reviewed = ?1
            WHERE id = ?2 AND set_id IN (SELECT id FROM flashcard_sets WHERE user_id = ?3)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(card_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_flashcard(user_id, card_id).await
    }

    pub async fn toggle_flashcard_star(&self, user_id: Uuid, card_id: Uuid) -> Result<Option<Flashcard>> {
        let result = sqlx::query(
            r#"
            UPDATE flashcards SET is_starred = NOT is_starred
            WHERE id = ?1 AND set_id IN (SELECT id FROM flashcard_sets WHERE user_id = ?2)
            "#,
        )
        .bind(card_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_flashcard(user_id, card_id).await
    }

    pub async fn delete_flashcard_set(&self, user_id: Uuid, set_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM flashcard_sets WHERE id = ?1 AND user_id = ?2")
            .bind(set_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM flashcards WHERE set_id = ?1")
            .bind(set_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // Quiz operations
    pub async fn create_quiz(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        title: String,
        questions: Vec<QuizQuestionRecord>,
    ) -> Result<Quiz> {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            user_id,
            document_id,
            title,
            total_questions: questions.len() as i64,
            questions,
            user_answers: None,
            score: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO quizzes (id, user_id, document_id, title, questions, user_answers,
                                 score, total_questions, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7, NULL)
            "#,
        )
        .bind(quiz.id.to_string())
        .bind(user_id.to_string())
        .bind(document_id.to_string())
        .bind(&quiz.title)
        .bind(serde_json::to_string(&quiz.questions)?)
        .bind(quiz.total_questions)
        .bind(quiz.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(quiz)
    }

    pub async fn get_quiz(&self, user_id: Uuid, id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query("SELECT * FROM quizzes WHERE id = ?1 AND user_id = ?2")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_quiz).transpose()
    }

    pub async fn list_quizzes_for_document(&self, user_id: Uuid, document_id: Uuid) -> Result<Vec<Quiz>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM quizzes WHERE user_id = ?1 AND document_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.to_string())
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_quiz).collect()
    }

    pub async fn save_quiz_submission(
        &self,
        user_id: Uuid,
        id: Uuid,
        answers: &[String],
        score: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quizzes SET user_answers = ?1, score = ?2, completed_at = ?3
            WHERE id = ?4 AND user_id = ?5
            "#,
        )
        .bind(serde_json::to_string(answers)?)
        .bind(score)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_quiz(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = ?1 AND user_id = ?2")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Chat operations

    /// Append a user turn and its assistant reply atomically.
    pub async fn append_chat_exchange(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        question: &str,
        answer: &str,
        relevant_chunks: &[i64],
    ) -> Result<(ChatMessage, ChatMessage)> {
        let now = Utc::now();
        let user_message = ChatMessage {
            id: Uuid::new_v4(),
            document_id,
            role: ChatRole::User,
            content: question.to_string(),
            relevant_chunks: Vec::new(),
            created_at: now,
        };
        let assistant_message = ChatMessage {
            id: Uuid::new_v4(),
            document_id,
            role: ChatRole::Assistant,
            content: answer.to_string(),
            relevant_chunks: relevant_chunks.to_vec(),
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;
        for message in [&user_message, &assistant_message] {
            sqlx::query(
                r#"
                INSERT INTO chat_messages (id, user_id, document_id, role, content, relevant_chunks, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(message.id.to_string())
            .bind(user_id.to_string())
            .bind(document_id.to_string())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(serde_json::to_string(&message.relevant_chunks)?)
            .bind(message.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok((user_message, assistant_message))
    }

    /// Chat history oldest first; insertion order breaks timestamp ties.
    pub async fn get_chat_history(&self, user_id: Uuid, document_id: Uuid) -> Result<Vec<ChatMessage>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_messages WHERE user_id = ?1 AND document_id = ?2
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(user_id.to_string())
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(ChatMessage {
                id: parse_uuid(&row, "id")?,
                document_id: parse_uuid(&row, "document_id")?,
                role: ChatRole::from_db(&row.get::<String, _>("role")),
                content: row.get("content"),
                relevant_chunks: serde_json::from_str(&row.get::<String, _>("relevant_chunks"))
                    .context("invalid relevant_chunks column")?,
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            });
        }

        log_db_operation!(
            debug,
            "get_chat_history",
            count = messages.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(messages)
    }
}

fn row_to_flashcard(row: &SqliteRow) -> Result<Flashcard> {
    Ok(Flashcard {
        id: parse_uuid(row, "id")?,
        question: row.get("question"),
        answer: row.get("answer"),
        difficulty: Difficulty::from_label(&row.get::<String, _>("difficulty")),
        is_starred: row.get("is_starred"),
        review_count: row.get("review_count"),
        last_reviewed: parse_optional_timestamp(row.get("last_reviewed")),
    })
}

fn row_to_quiz(row: &SqliteRow) -> Result<Quiz> {
    let user_answers: Option<String> = row.get("user_answers");
    Ok(Quiz {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        document_id: parse_uuid(row, "document_id")?,
        title: row.get("title"),
        questions: serde_json::from_str(&row.get::<String, _>("questions"))?,
        user_answers: user_answers.map(|json| serde_json::from_str(&json)).transpose()?,
        score: row.get("score"),
        total_questions: row.get("total_questions"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        completed_at: parse_optional_timestamp(row.get("completed_at")),
    })
}
