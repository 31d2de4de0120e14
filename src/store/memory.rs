use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use super::traits::*;
use crate::error::{StoreError, StoreResult};
use crate::models::*;

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    pathways: HashMap<Uuid, Pathway>,
    courses: HashMap<Uuid, Course>,
    modules: HashMap<Uuid, Module>,
    quizzes: HashMap<Uuid, Quiz>,
    questions: HashMap<Uuid, Question>,
    options: HashMap<Uuid, AnswerOption>,
    // owned rows keep insertion order
    enrolments: Vec<Enrolment>,
    attempts: Vec<QuizAttempt>,
    answers: Vec<AttemptAnswer>,
}

/// Single-lock in-memory backend. Submissions hold the write lock for their
/// whole lifetime, which serializes them the way a row lock would.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn insert_pathway(&self, pathway: Pathway) {
        self.state.write().await.pathways.insert(pathway.id, pathway);
    }

    pub async fn insert_course(&self, course: Course) {
        self.state.write().await.courses.insert(course.id, course);
    }

    pub async fn insert_module(&self, module: Module) {
        self.state.write().await.modules.insert(module.id, module);
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        self.state.write().await.quizzes.insert(quiz.id, quiz);
    }

    pub async fn insert_question(&self, question: Question) {
        self.state.write().await.questions.insert(question.id, question);
    }

    pub async fn insert_option(&self, option: AnswerOption) {
        self.state.write().await.options.insert(option.id, option);
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_pathway(&self, id: Uuid) -> StoreResult<Option<Pathway>> {
        Ok(self.state.read().await.pathways.get(&id).cloned())
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.state.read().await.courses.get(&id).cloned())
    }

    async fn list_pathway_courses(&self, pathway_id: Uuid) -> StoreResult<Vec<Course>> {
        let state = self.state.read().await;
        let mut courses: Vec<Course> = state
            .courses
            .values()
            .filter(|c| c.pathway_id == Some(pathway_id))
            .cloned()
            .collect();
        courses.sort_by_key(|c| c.level);
        Ok(courses)
    }

    async fn get_module(&self, id: Uuid) -> StoreResult<Option<Module>> {
        Ok(self.state.read().await.modules.get(&id).cloned())
    }

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        Ok(self.state.read().await.quizzes.get(&id).cloned())
    }

    async fn list_course_quizzes(&self, course_id: Uuid) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        Ok(state
            .quizzes
            .values()
            .filter(|q| {
                state
                    .modules
                    .get(&q.module_id)
                    .is_some_and(|m| m.course_id == course_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EnrolmentStore for InMemoryStore {
    async fn get_enrolment(&self, id: Uuid) -> StoreResult<Option<Enrolment>> {
        let state = self.state.read().await;
        Ok(state.enrolments.iter().find(|e| e.id == id).cloned())
    }

    async fn find_enrolment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrolment>> {
        let state = self.state.read().await;
        Ok(state
            .enrolments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn list_user_enrolments(&self, user_id: Uuid) -> StoreResult<Vec<Enrolment>> {
        let state = self.state.read().await;
        let mut rows: Vec<Enrolment> = state
            .enrolments
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.enrol_date);
        Ok(rows)
    }

    async fn insert_enrolment(&self, enrolment: &Enrolment) -> StoreResult<Enrolment> {
        let mut state = self.state.write().await;
        if state
            .enrolments
            .iter()
            .any(|e| e.user_id == enrolment.user_id && e.course_id == enrolment.course_id)
        {
            return Err(StoreError::Conflict(format!(
                "enrolment for user {} in course {} exists",
                enrolment.user_id, enrolment.course_id
            )));
        }
        state.enrolments.push(enrolment.clone());
        Ok(enrolment.clone())
    }

    async fn transition_enrolment(
        &self,
        expected: EnrolmentStatus,
        enrolment: &Enrolment,
    ) -> StoreResult<Option<Enrolment>> {
        let mut state = self.state.write().await;
        let Some(row) = state
            .enrolments
            .iter_mut()
            .find(|e| e.id == enrolment.id && e.status == expected)
        else {
            return Ok(None);
        };
        row.pathway_id = enrolment.pathway_id;
        row.status = enrolment.status;
        row.disenrolled_date = enrolment.disenrolled_date;
        row.completion_date = enrolment.completion_date;
        Ok(Some(row.clone()))
    }

    async fn set_enrolment_pathway(
        &self,
        ids: &[Uuid],
        pathway_id: Option<Uuid>,
    ) -> StoreResult<Vec<Enrolment>> {
        let mut state = self.state.write().await;
        let mut updated = Vec::with_capacity(ids.len());
        for row in state.enrolments.iter_mut().filter(|e| ids.contains(&e.id)) {
            row.pathway_id = pathway_id;
            updated.push(row.clone());
        }
        Ok(updated)
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn create_attempt(
        &self,
        quiz_id: Uuid,
        enrolment_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> StoreResult<QuizAttempt> {
        // Counting and pushing under one write guard keeps numbers unique.
        let mut state = self.state.write().await;
        let last = state
            .attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id && a.enrolment_id == enrolment_id)
            .map(|a| a.count)
            .max()
            .unwrap_or(0);
        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            quiz_id,
            enrolment_id,
            count: last + 1,
            start_time,
            end_time: None,
            score: None,
            passed: None,
        };
        state.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<QuizAttempt>> {
        let state = self.state.read().await;
        Ok(state.attempts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_attempts(&self, quiz_id: Uuid, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        let mut rows: Vec<QuizAttempt> = state
            .attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id && a.enrolment_id == enrolment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.count);
        Ok(rows)
    }

    async fn list_enrolment_attempts(&self, enrolment_id: Uuid) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.enrolment_id == enrolment_id)
            .cloned()
            .collect())
    }

    async fn list_attempt_answers(&self, attempt_id: Uuid) -> StoreResult<Vec<AttemptAnswer>> {
        let state = self.state.read().await;
        let mut rows: Vec<AttemptAnswer> = state
            .answers
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| state.questions.get(&a.question_id).map(|q| q.question_number));
        Ok(rows)
    }

    async fn begin_submission(&self) -> StoreResult<Box<dyn SubmissionTx>> {
        let guard = self.state.clone().write_owned().await;
        Ok(Box::new(MemorySubmission {
            guard,
            locked: None,
            staged_answers: Vec::new(),
            closed: None,
        }))
    }
}

struct MemorySubmission {
    guard: OwnedRwLockWriteGuard<MemoryState>,
    locked: Option<Uuid>,
    staged_answers: Vec<AttemptAnswer>,
    closed: Option<QuizAttempt>,
}

#[async_trait]
impl SubmissionTx for MemorySubmission {
    async fn lock_attempt(&mut self, attempt_id: Uuid) -> StoreResult<Option<QuizAttempt>> {
        let attempt = self.guard.attempts.iter().find(|a| a.id == attempt_id).cloned();
        if attempt.is_some() {
            self.locked = Some(attempt_id);
        }
        Ok(attempt)
    }

    async fn active_questions(&mut self, quiz_id: Uuid) -> StoreResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .guard
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id && q.is_active)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_number);
        Ok(questions)
    }

    async fn find_question(&mut self, question_id: Uuid) -> StoreResult<Option<Question>> {
        Ok(self.guard.questions.get(&question_id).cloned())
    }

    async fn find_option(&mut self, option_id: Uuid) -> StoreResult<Option<AnswerOption>> {
        Ok(self.guard.options.get(&option_id).cloned())
    }

    async fn insert_answer(&mut self, answer: &AttemptAnswer) -> StoreResult<()> {
        let clash = self
            .guard
            .answers
            .iter()
            .chain(self.staged_answers.iter())
            .any(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id);
        if clash {
            return Err(StoreError::Conflict(format!(
                "attempt {} already has an answer for question {}",
                answer.attempt_id, answer.question_id
            )));
        }
        self.staged_answers.push(answer.clone());
        Ok(())
    }

    async fn close_attempt(&mut self, attempt: &QuizAttempt) -> StoreResult<()> {
        if self.locked != Some(attempt.id) {
            return Err(StoreError::Query(format!("attempt {} is not locked", attempt.id)));
        }
        self.closed = Some(attempt.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemorySubmission {
            mut guard,
            staged_answers,
            closed,
            ..
        } = *self;
        if let Some(closed) = closed {
            if let Some(row) = guard.attempts.iter_mut().find(|a| a.id == closed.id) {
                *row = closed;
            }
        }
        guard.answers.extend(staged_answers);
        Ok(())
    }
}
