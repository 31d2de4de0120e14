use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::*;

/// Everything the core needs from a backend.
pub trait Store: CatalogStore + EnrolmentStore + AttemptStore + Send + Sync {}

impl<T> Store for T where T: CatalogStore + EnrolmentStore + AttemptStore + Send + Sync {}

/// Read-only lookups into reference data owned by course/admin workflows.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn get_pathway(&self, id: Uuid) -> StoreResult<Option<Pathway>>;

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>>;

    /// Courses whose `pathway_id` is the given pathway.
    async fn list_pathway_courses(&self, pathway_id: Uuid) -> StoreResult<Vec<Course>>;

    async fn get_module(&self, id: Uuid) -> StoreResult<Option<Module>>;

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>>;

    /// All quizzes across every module of a course.
    async fn list_course_quizzes(&self, course_id: Uuid) -> StoreResult<Vec<Quiz>>;
}

#[async_trait]
pub trait EnrolmentStore: Send + Sync {
    async fn get_enrolment(&self, id: Uuid) -> StoreResult<Option<Enrolment>>;

    /// The single (user, course) record, whatever its status.
    async fn find_enrolment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrolment>>;

    /// All of a user's enrolments ordered by enrol date.
    async fn list_user_enrolments(&self, user_id: Uuid) -> StoreResult<Vec<Enrolment>>;

    /// Fails with `StoreError::Conflict` if the (user, course) pair already has a row.
    async fn insert_enrolment(&self, enrolment: &Enrolment) -> StoreResult<Enrolment>;

    /// Writes status, pathway and date fields only while the stored status is
    /// still `expected`. `None` when the row has moved on or does not exist.
    async fn transition_enrolment(
        &self,
        expected: EnrolmentStatus,
        enrolment: &Enrolment,
    ) -> StoreResult<Option<Enrolment>>;

    /// Sets `pathway_id` on every listed enrolment in one write.
    async fn set_enrolment_pathway(
        &self,
        ids: &[Uuid],
        pathway_id: Option<Uuid>,
    ) -> StoreResult<Vec<Enrolment>>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Inserts an open attempt numbered one past the highest existing count for
    /// (quiz, enrolment). Numbering and insert are atomic.
    async fn create_attempt(
        &self,
        quiz_id: Uuid,
        enrolment_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> StoreResult<QuizAttempt>;

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<QuizAttempt>>;

    /// Attempts for (quiz, enrolment) in `count` order.
    async fn list_attempts(&self, quiz_id: Uuid, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>>;

    async fn list_enrolment_attempts(&self, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>>;

    async fn list_attempt_answers(&self, attempt_id: Uuid) -> StoreResult<Vec<AttemptAnswer>>;

    async fn begin_submission(&self) -> StoreResult<Box<dyn SubmissionTx>>;
}

/// Unit of work for grading one attempt. Nothing is visible to other readers
/// until `commit`; dropping the value rolls back.
#[async_trait]
pub trait SubmissionTx: Send {
    /// Loads the attempt and holds it exclusively until commit or rollback.
    async fn lock_attempt(&mut self, attempt_id: Uuid) -> StoreResult<Option<QuizAttempt>>;

    async fn active_questions(&mut self, quiz_id: Uuid) -> StoreResult<Vec<Question>>;

    async fn find_question(&mut self, question_id: Uuid) -> StoreResult<Option<Question>>;

    async fn find_option(&mut self, option_id: Uuid) -> StoreResult<Option<AnswerOption>>;

    async fn insert_answer(&mut self, answer: &AttemptAnswer) -> StoreResult<()>;

    /// Writes end time, score and pass flag.
    async fn close_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
