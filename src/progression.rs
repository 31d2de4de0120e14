//! Derives enrolment status from attempt outcomes and answers pathway gating
//! questions for the ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{transition, EnrolmentEvent};
use crate::models::{CourseLevel, Enrolment, EnrolmentStatus};
use crate::notify::{NotificationEvent, Notifier};
use crate::store::{AttemptStore, CatalogStore, EnrolmentStore, Store};

/// Level assumed when the student has completed nothing in the pathway.
const DEFAULT_PATHWAY_LEVEL: u8 = 1;

#[derive(Clone)]
pub struct ProgressionCoordinator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl ProgressionCoordinator {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Upgrade-only re-evaluation. A course with no quizzes is never completed here.
    pub async fn refresh_enrolment_status(&self, enrolment_id: Uuid) -> EngineResult<Enrolment> {
        loop {
            let enrolment = self
                .store
                .get_enrolment(enrolment_id)
                .await?
                .ok_or_else(|| EngineError::not_found("enrolment", enrolment_id))?;
            if !enrolment.status.is_active() {
                return Ok(enrolment);
            }

            let status = self.derive_status(&enrolment).await?;
            if status == enrolment.status {
                return Ok(enrolment);
            }

            let mut next = enrolment.clone();
            next.status = status;
            if status == EnrolmentStatus::Completed && next.completion_date.is_none() {
                next.completion_date = Some(Utc::now());
            }
            // Only lands if nobody changed the status since the read above.
            let Some(saved) = self
                .store
                .transition_enrolment(enrolment.status, &next)
                .await?
            else {
                tracing::debug!(%enrolment_id, "enrolment changed during refresh, re-evaluating");
                continue;
            };
            tracing::info!(
                enrolment_id = %saved.id,
                from = ?enrolment.status,
                to = ?saved.status,
                "enrolment status changed"
            );
            self.notifier.notify(NotificationEvent::StatusChanged, saved.id);
            return Ok(saved);
        }
    }

    async fn derive_status(&self, enrolment: &Enrolment) -> EngineResult<EnrolmentStatus> {
        let attempts = self.store.list_enrolment_attempts(enrolment.id).await?;
        let mut status = enrolment.status;
        if !attempts.is_empty() {
            status = transition(status, EnrolmentEvent::AttemptActivity)?;
        }

        let quizzes = self.store.list_course_quizzes(enrolment.course_id).await?;
        let passed: HashSet<Uuid> = attempts
            .iter()
            .filter(|a| a.passed == Some(true))
            .map(|a| a.quiz_id)
            .collect();
        if !quizzes.is_empty() && quizzes.iter().all(|q| passed.contains(&q.id)) {
            status = transition(status, EnrolmentEvent::QuizzesPassed)?;
        }
        Ok(status)
    }

    /// Highest completed course level in the pathway, 1 when nothing is completed.
    pub async fn user_pathway_level(&self, user_id: Uuid, pathway_id: Uuid) -> EngineResult<u8> {
        let enrolments = self.store.list_user_enrolments(user_id).await?;
        let courses = self.store.list_pathway_courses(pathway_id).await?;

        let level = enrolments
            .iter()
            .filter(|e| e.status == EnrolmentStatus::Completed)
            .filter_map(|e| courses.iter().find(|c| c.id == e.course_id))
            .map(|c| c.level.rank())
            .max()
            .unwrap_or(DEFAULT_PATHWAY_LEVEL);
        Ok(level)
    }

    /// True unless the course is gated by a pathway the student is actively
    /// pursuing and their level there does not strictly exceed the course level.
    pub async fn validate_prerequisite(
        &self,
        user_id: Uuid,
        pathway_id: Uuid,
        course_id: Uuid,
    ) -> EngineResult<bool> {
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("course", course_id))?;
        let Some(course_pathway) = course.pathway_id else {
            return Ok(true);
        };
        if course_pathway != pathway_id {
            return Ok(true);
        }
        if !self.is_pursuing_pathway(user_id, pathway_id).await? {
            return Ok(true);
        }

        let level = self.user_pathway_level(user_id, pathway_id).await?;
        Ok(level_unlocks(level, course.level))
    }

    async fn is_pursuing_pathway(&self, user_id: Uuid, pathway_id: Uuid) -> EngineResult<bool> {
        let enrolments = self.store.list_user_enrolments(user_id).await?;
        Ok(enrolments
            .iter()
            .any(|e| e.status.is_active() && e.pathway_id == Some(pathway_id)))
    }
}

/// Strict comparison: completing a level does not unlock another course at that level.
pub fn level_unlocks(user_level: u8, course_level: CourseLevel) -> bool {
    user_level > course_level.rank()
}
