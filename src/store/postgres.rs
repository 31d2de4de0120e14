use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::traits::*;
use crate::db::Db;
use crate::error::StoreResult;
use crate::models::*;

const ENROLMENT_COLUMNS: &str =
    "id, user_id, course_id, pathway_id, status, enrol_date, disenrolled_date, completion_date";
const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, enrolment_id, count, start_time, end_time, score, passed";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    db: Db,
}

impl PostgresStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>("SELECT id, name, role FROM users WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_pathway(&self, id: Uuid) -> StoreResult<Option<Pathway>> {
        let row = sqlx::query_as::<_, Pathway>("SELECT id, title FROM pathways WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let row = sqlx::query_as::<_, Course>(
            "SELECT id, title, pathway_id, level FROM courses WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_pathway_courses(&self, pathway_id: Uuid) -> StoreResult<Vec<Course>> {
        let rows = sqlx::query_as::<_, Course>(
            "SELECT id, title, pathway_id, level FROM courses WHERE pathway_id=$1 ORDER BY level",
        )
        .bind(pathway_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_module(&self, id: Uuid) -> StoreResult<Option<Module>> {
        let row = sqlx::query_as::<_, Module>("SELECT id, course_id, title FROM modules WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        let row = sqlx::query_as::<_, Quiz>("SELECT id, module_id, title FROM quizzes WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_course_quizzes(&self, course_id: Uuid) -> StoreResult<Vec<Quiz>> {
        let rows = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT q.id, q.module_id, q.title
            FROM quizzes q JOIN modules m ON m.id = q.module_id
            WHERE m.course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl EnrolmentStore for PostgresStore {
    async fn get_enrolment(&self, id: Uuid) -> StoreResult<Option<Enrolment>> {
        let sql = format!("SELECT {ENROLMENT_COLUMNS} FROM enrolments WHERE id=$1");
        let row = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_enrolment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrolment>> {
        let sql =
            format!("SELECT {ENROLMENT_COLUMNS} FROM enrolments WHERE user_id=$1 AND course_id=$2");
        let row = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_user_enrolments(&self, user_id: Uuid) -> StoreResult<Vec<Enrolment>> {
        let sql = format!(
            "SELECT {ENROLMENT_COLUMNS} FROM enrolments WHERE user_id=$1 ORDER BY enrol_date"
        );
        let rows = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn insert_enrolment(&self, enrolment: &Enrolment) -> StoreResult<Enrolment> {
        // UNIQUE(user_id, course_id) surfaces as StoreError::Conflict
        let sql = format!(
            r#"
            INSERT INTO enrolments (id, user_id, course_id, pathway_id, status, enrol_date)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING {ENROLMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(enrolment.id)
            .bind(enrolment.user_id)
            .bind(enrolment.course_id)
            .bind(enrolment.pathway_id)
            .bind(enrolment.status)
            .bind(enrolment.enrol_date)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn transition_enrolment(
        &self,
        expected: EnrolmentStatus,
        enrolment: &Enrolment,
    ) -> StoreResult<Option<Enrolment>> {
        let sql = format!(
            r#"
            UPDATE enrolments
            SET pathway_id=$2, status=$3, disenrolled_date=$4, completion_date=$5
            WHERE id=$1 AND status=$6
            RETURNING {ENROLMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(enrolment.id)
            .bind(enrolment.pathway_id)
            .bind(enrolment.status)
            .bind(enrolment.disenrolled_date)
            .bind(enrolment.completion_date)
            .bind(expected)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn set_enrolment_pathway(
        &self,
        ids: &[Uuid],
        pathway_id: Option<Uuid>,
    ) -> StoreResult<Vec<Enrolment>> {
        let sql = format!(
            "UPDATE enrolments SET pathway_id=$2 WHERE id = ANY($1) RETURNING {ENROLMENT_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, Enrolment>(&sql)
            .bind(ids)
            .bind(pathway_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AttemptStore for PostgresStore {
    async fn create_attempt(
        &self,
        quiz_id: Uuid,
        enrolment_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> StoreResult<QuizAttempt> {
        let mut tx = self.db.begin().await?;

        // Serialize starts per enrolment; the insert below then reads a fresh
        // snapshot that includes every committed attempt.
        sqlx::query("SELECT id FROM enrolments WHERE id=$1 FOR UPDATE")
            .bind(enrolment_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            INSERT INTO quiz_attempts (id, quiz_id, enrolment_id, count, start_time)
            SELECT $1, $2, $3,
                   COALESCE((SELECT MAX(count) FROM quiz_attempts
                             WHERE quiz_id=$2 AND enrolment_id=$3), 0) + 1,
                   $4
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        let attempt = sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(Uuid::new_v4())
            .bind(quiz_id)
            .bind(enrolment_id)
            .bind(start_time)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(attempt)
    }

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<QuizAttempt>> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id=$1");
        let row = sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_attempts(&self, quiz_id: Uuid, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE quiz_id=$1 AND enrolment_id=$2 ORDER BY count"
        );
        let rows = sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(quiz_id)
            .bind(enrolment_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn list_enrolment_attempts(&self, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE enrolment_id=$1 ORDER BY start_time"
        );
        let rows = sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(enrolment_id)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn list_attempt_answers(&self, attempt_id: Uuid) -> StoreResult<Vec<AttemptAnswer>> {
        let rows = sqlx::query_as::<_, AttemptAnswer>(
            r#"
            SELECT a.id, a.attempt_id, a.question_id, a.option_id, a.is_correct
            FROM attempt_answers a JOIN questions q ON q.id = a.question_id
            WHERE a.attempt_id=$1
            ORDER BY q.question_number
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn begin_submission(&self) -> StoreResult<Box<dyn SubmissionTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgSubmission { tx }))
    }
}

/// Wraps one database transaction; sqlx rolls it back on drop.
struct PgSubmission {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SubmissionTx for PgSubmission {
    async fn lock_attempt(&mut self, attempt_id: Uuid) -> StoreResult<Option<QuizAttempt>> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id=$1 FOR UPDATE");
        let row = sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(attempt_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn active_questions(&mut self, quiz_id: Uuid) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, question_number, text, is_active
            FROM questions WHERE quiz_id=$1 AND is_active
            ORDER BY question_number
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn find_question(&mut self, question_id: Uuid) -> StoreResult<Option<Question>> {
        let row = sqlx::query_as::<_, Question>(
            "SELECT id, quiz_id, question_number, text, is_active FROM questions WHERE id=$1",
        )
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn find_option(&mut self, option_id: Uuid) -> StoreResult<Option<AnswerOption>> {
        let row = sqlx::query_as::<_, AnswerOption>(
            "SELECT id, question_id, option_order, text, is_correct FROM answer_options WHERE id=$1",
        )
        .bind(option_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert_answer(&mut self, answer: &AttemptAnswer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attempt_answers (id, attempt_id, question_id, option_id, is_correct)
            VALUES ($1,$2,$3,$4,$5)
            "#,
        )
        .bind(answer.id)
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.option_id)
        .bind(answer.is_correct)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn close_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        sqlx::query("UPDATE quiz_attempts SET end_time=$2, score=$3, passed=$4 WHERE id=$1")
            .bind(attempt.id)
            .bind(attempt.end_time)
            .bind(attempt.score)
            .bind(attempt.passed)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
