//! Store wrapper that parks or fails one chosen call, for interleaving tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::memory::InMemoryStore;
use super::traits::*;
use crate::error::{StoreError, StoreResult};
use crate::models::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    FindEnrolment,
    CourseQuizzes,
    EnrolmentAttempts,
}

pub(crate) struct ScriptedStore {
    inner: InMemoryStore,
    pause_at: Option<Op>,
    fail_at: Option<Op>,
    armed: AtomicBool,
    /// Notified once the paused call has read and is waiting.
    pub(crate) reached: Notify,
    pub(crate) release: Notify,
}

impl ScriptedStore {
    /// The first call of `op` reads, then waits for `release`.
    pub(crate) fn pausing(inner: InMemoryStore, op: Op) -> Self {
        Self {
            inner,
            pause_at: Some(op),
            fail_at: None,
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Every call of `op` fails with a query error.
    pub(crate) fn failing(inner: InMemoryStore, op: Op) -> Self {
        Self {
            inner,
            pause_at: None,
            fail_at: Some(op),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn after(&self, op: Op) -> StoreResult<()> {
        if self.fail_at == Some(op) {
            return Err(StoreError::Query(format!("{op:?} unavailable")));
        }
        if self.pause_at == Some(op) && self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for ScriptedStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn get_pathway(&self, id: Uuid) -> StoreResult<Option<Pathway>> {
        self.inner.get_pathway(id).await
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        self.inner.get_course(id).await
    }

    async fn list_pathway_courses(&self, pathway_id: Uuid) -> StoreResult<Vec<Course>> {
        self.inner.list_pathway_courses(pathway_id).await
    }

    async fn get_module(&self, id: Uuid) -> StoreResult<Option<Module>> {
        self.inner.get_module(id).await
    }

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        self.inner.get_quiz(id).await
    }

    async fn list_course_quizzes(&self, course_id: Uuid) -> StoreResult<Vec<Quiz>> {
        let rows = self.inner.list_course_quizzes(course_id).await?;
        self.after(Op::CourseQuizzes).await?;
        Ok(rows)
    }
}

#[async_trait]
impl EnrolmentStore for ScriptedStore {
    async fn get_enrolment(&self, id: Uuid) -> StoreResult<Option<Enrolment>> {
        self.inner.get_enrolment(id).await
    }

    async fn find_enrolment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrolment>> {
        let row = self.inner.find_enrolment(user_id, course_id).await?;
        self.after(Op::FindEnrolment).await?;
        Ok(row)
    }

    async fn list_user_enrolments(&self, user_id: Uuid) -> StoreResult<Vec<Enrolment>> {
        self.inner.list_user_enrolments(user_id).await
    }

    async fn insert_enrolment(&self, enrolment: &Enrolment) -> StoreResult<Enrolment> {
        self.inner.insert_enrolment(enrolment).await
    }

    async fn transition_enrolment(
        &self,
        expected: EnrolmentStatus,
        enrolment: &Enrolment,
    ) -> StoreResult<Option<Enrolment>> {
        self.inner.transition_enrolment(expected, enrolment).await
    }

    async fn set_enrolment_pathway(
        &self,
        ids: &[Uuid],
        pathway_id: Option<Uuid>,
    ) -> StoreResult<Vec<Enrolment>> {
        self.inner.set_enrolment_pathway(ids, pathway_id).await
    }
}

#[async_trait]
impl AttemptStore for ScriptedStore {
    async fn create_attempt(
        &self,
        quiz_id: Uuid,
        enrolment_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> StoreResult<QuizAttempt> {
        self.inner.create_attempt(quiz_id, enrolment_id, start_time).await
    }

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<QuizAttempt>> {
        self.inner.get_attempt(id).await
    }

    async fn list_attempts(&self, quiz_id: Uuid, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        self.inner.list_attempts(quiz_id, enrolment_id).await
    }

    async fn list_enrolment_attempts(&self, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        let rows = self.inner.list_enrolment_attempts(enrolment_id).await?;
        self.after(Op::EnrolmentAttempts).await?;
        Ok(rows)
    }

    async fn list_attempt_answers(&self, attempt_id: Uuid) -> StoreResult<Vec<AttemptAnswer>> {
        self.inner.list_attempt_answers(attempt_id).await
    }

    async fn begin_submission(&self) -> StoreResult<Box<dyn SubmissionTx>> {
        self.inner.begin_submission().await
    }
}
