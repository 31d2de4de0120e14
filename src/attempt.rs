//! Quiz attempt lifecycle: start, then one atomic graded submission.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::lifecycle::AttemptState;
use crate::models::{AnswerInput, AttemptAnswer, AttemptWithAnswers, Question, QuizAttempt};
use crate::notify::{NotificationEvent, Notifier};
use crate::progression::ProgressionCoordinator;
use crate::store::{AttemptStore, CatalogStore, EnrolmentStore, Store, SubmissionTx};

/// Minimum share of correct answers, in percent, for a pass.
pub const PASS_THRESHOLD_PERCENT: usize = 80;

/// Writes one graded answer row inside a submission.
#[async_trait]
pub trait AnswerRegistrar: Send + Sync {
    async fn register(
        &self,
        tx: &mut dyn SubmissionTx,
        attempt: &QuizAttempt,
        answer: AnswerInput,
    ) -> EngineResult<AttemptAnswer>;
}

/// Grades against the stored `is_correct` flag of the chosen option.
#[derive(Debug, Default, Clone)]
pub struct StoredOptionRegistrar;

#[async_trait]
impl AnswerRegistrar for StoredOptionRegistrar {
    async fn register(
        &self,
        tx: &mut dyn SubmissionTx,
        attempt: &QuizAttempt,
        answer: AnswerInput,
    ) -> EngineResult<AttemptAnswer> {
        let question = tx
            .find_question(answer.question_id)
            .await?
            .filter(|q| q.quiz_id == attempt.quiz_id && q.is_active)
            .ok_or_else(|| {
                EngineError::InvalidReference(format!(
                    "question {} is not an active question of quiz {}",
                    answer.question_id, attempt.quiz_id
                ))
            })?;

        let is_correct = match answer.option_id {
            None => false,
            Some(option_id) => {
                let option = tx
                    .find_option(option_id)
                    .await?
                    .filter(|o| o.question_id == question.id)
                    .ok_or_else(|| {
                        EngineError::InvalidReference(format!(
                            "option {option_id} does not belong to question {}",
                            question.id
                        ))
                    })?;
                option.is_correct
            }
        };

        let row = AttemptAnswer {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            question_id: question.id,
            option_id: answer.option_id,
            is_correct,
        };
        tx.insert_answer(&row).await?;
        Ok(row)
    }
}

#[derive(Clone)]
pub struct AttemptEngine {
    store: Arc<dyn Store>,
    progression: ProgressionCoordinator,
    registrar: Arc<dyn AnswerRegistrar>,
    notifier: Arc<dyn Notifier>,
}

impl AttemptEngine {
    pub fn new(
        store: Arc<dyn Store>,
        progression: ProgressionCoordinator,
        registrar: Arc<dyn AnswerRegistrar>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            progression,
            registrar,
            notifier,
        }
    }

    pub async fn start(&self, quiz_id: Uuid, enrolment_id: Uuid) -> EngineResult<QuizAttempt> {
        let quiz = self
            .store
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| EngineError::not_found("quiz", quiz_id))?;
        let module = self
            .store
            .get_module(quiz.module_id)
            .await?
            .ok_or_else(|| EngineError::not_found("module", quiz.module_id))?;
        let enrolment = self
            .store
            .get_enrolment(enrolment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("enrolment", enrolment_id))?;

        if enrolment.course_id != module.course_id {
            return Err(EngineError::EnrolmentMismatch { enrolment_id, quiz_id });
        }
        if !enrolment.status.is_active() {
            return Err(EngineError::NotEnrolled);
        }

        let attempt = self
            .store
            .create_attempt(quiz_id, enrolment_id, Utc::now())
            .await?;
        tracing::info!(
            attempt_id = %attempt.id,
            %quiz_id,
            %enrolment_id,
            count = attempt.count,
            "attempt started"
        );
        Ok(attempt)
    }

    /// Grades and closes an attempt in one transaction. Any error drops the
    /// unit of work, so no answer row or attempt change survives a failure.
    pub async fn submit(
        &self,
        attempt_id: Uuid,
        answers: Option<Vec<AnswerInput>>,
    ) -> EngineResult<AttemptWithAnswers> {
        let mut tx = self.store.begin_submission().await?;

        let attempt = tx
            .lock_attempt(attempt_id)
            .await?
            .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;
        AttemptState::of(&attempt).submit(attempt_id)?;

        let questions = tx.active_questions(attempt.quiz_id).await?;
        let answers = fill_unanswered(answers.unwrap_or_default(), &questions);
        ensure_one_answer_per_question(&answers)?;

        let mut rows = Vec::with_capacity(answers.len());
        for answer in answers {
            rows.push(self.registrar.register(tx.as_mut(), &attempt, answer).await?);
        }

        let correct = rows.iter().filter(|r| r.is_correct).count();
        let closed = QuizAttempt {
            end_time: Some(Utc::now()),
            score: Some(score(correct, questions.len())),
            passed: Some(passed(correct, questions.len())),
            ..attempt
        };
        tx.close_attempt(&closed).await?;
        tx.commit().await?;

        tracing::info!(
            %attempt_id,
            correct,
            total = questions.len(),
            score = ?closed.score,
            passed = ?closed.passed,
            "attempt submitted"
        );
        self.notifier
            .notify(NotificationEvent::AnswersSubmitted, attempt_id);

        // The submission is committed; a failed refresh must not turn it into an error.
        if let Err(e) = self
            .progression
            .refresh_enrolment_status(closed.enrolment_id)
            .await
        {
            tracing::error!(error = %e, enrolment_id = %closed.enrolment_id, "progression refresh failed");
        }

        Ok(AttemptWithAnswers {
            attempt: closed,
            answers: rows,
        })
    }

    pub async fn result(&self, attempt_id: Uuid) -> EngineResult<AttemptWithAnswers> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| EngineError::not_found("attempt", attempt_id))?;
        let answers = self.store.list_attempt_answers(attempt_id).await?;
        Ok(AttemptWithAnswers { attempt, answers })
    }

    pub async fn list(&self, quiz_id: Uuid, enrolment_id: Uuid) -> EngineResult<Vec<QuizAttempt>> {
        Ok(self.store.list_attempts(quiz_id, enrolment_id).await?)
    }
}

/// Appends an explicit unanswered entry for every active question the caller skipped.
fn fill_unanswered(mut answers: Vec<AnswerInput>, questions: &[Question]) -> Vec<AnswerInput> {
    let given: HashSet<Uuid> = answers.iter().map(|a| a.question_id).collect();
    answers.extend(
        questions
            .iter()
            .filter(|q| !given.contains(&q.id))
            .map(|q| AnswerInput {
                question_id: q.id,
                option_id: None,
            }),
    );
    answers
}

fn ensure_one_answer_per_question(answers: &[AnswerInput]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(answers.len());
    for a in answers {
        if !seen.insert(a.question_id) {
            return Err(EngineError::DuplicateAnswer(a.question_id));
        }
    }
    Ok(())
}

/// Share of correct answers; an empty quiz scores 0.
pub fn score(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    correct as f64 / total as f64
}

/// Integer comparison so 4/5 passes exactly at the threshold.
pub fn passed(correct: usize, total: usize) -> bool {
    total > 0 && correct * 100 >= total * PASS_THRESHOLD_PERCENT
}
