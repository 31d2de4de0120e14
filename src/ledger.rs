//! Enrolment records: course and pathway enrol/disenrol.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, StoreError};
use crate::lifecycle::{transition, EnrolmentEvent};
use crate::models::{
    Course, CourseLevel, Enrolment, EnrolmentStatus, PathwayEnrolment, User, UserRole,
};
use crate::notify::{NotificationEvent, Notifier};
use crate::progression::ProgressionCoordinator;
use crate::store::{CatalogStore, EnrolmentStore, Store};

#[derive(Clone)]
pub struct EnrolmentLedger {
    store: Arc<dyn Store>,
    progression: ProgressionCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl EnrolmentLedger {
    pub fn new(
        store: Arc<dyn Store>,
        progression: ProgressionCoordinator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            progression,
            notifier,
        }
    }

    pub async fn get(&self, enrolment_id: Uuid) -> EngineResult<Enrolment> {
        self.store
            .get_enrolment(enrolment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("enrolment", enrolment_id))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> EngineResult<Vec<Enrolment>> {
        self.student(user_id).await?;
        Ok(self.store.list_user_enrolments(user_id).await?)
    }

    pub async fn enrol(&self, user_id: Uuid, course_id: Uuid) -> EngineResult<Enrolment> {
        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| EngineError::not_found("course", course_id))?;
        self.student(user_id).await?;

        let existing = self.store.find_enrolment(user_id, course_id).await?;
        if existing.as_ref().is_some_and(|e| e.status.is_active()) {
            return Err(EngineError::AlreadyEnrolled);
        }

        // The course only counts as part of a pathway the student already pursues.
        let pathway_id = match course.pathway_id {
            Some(p) if self.pursues_pathway(user_id, p).await? => Some(p),
            _ => None,
        };
        if let Some(p) = pathway_id {
            if !self.progression.validate_prerequisite(user_id, p, course_id).await? {
                return Err(EngineError::PrerequisiteNotMet(course_id));
            }
        }

        let enrolment = match existing {
            Some(previous) => self.reenrol(previous, pathway_id).await?,
            None => {
                let created = self.create(user_id, &course, pathway_id).await?;
                self.notifier.notify(NotificationEvent::Enrolled, created.id);
                created
            }
        };
        tracing::info!(
            enrolment_id = %enrolment.id,
            %user_id,
            %course_id,
            pathway_id = ?enrolment.pathway_id,
            status = ?enrolment.status,
            "enrolled"
        );
        Ok(enrolment)
    }

    pub async fn disenrol(&self, user_id: Uuid, course_id: Uuid) -> EngineResult<Enrolment> {
        loop {
            let mut enrolment = self
                .store
                .find_enrolment(user_id, course_id)
                .await?
                .ok_or(EngineError::NotEnrolled)?;
            let from = enrolment.status;
            enrolment.status = transition(from, EnrolmentEvent::Disenrol)?;
            enrolment.disenrolled_date = Some(Utc::now());

            // a refresh moved the status on; retry from the new one
            let Some(saved) = self.store.transition_enrolment(from, &enrolment).await? else {
                continue;
            };
            tracing::info!(enrolment_id = %saved.id, %user_id, %course_id, "disenrolled");
            self.notifier.notify(NotificationEvent::Disenrolled, saved.id);
            return Ok(saved);
        }
    }

    pub async fn enrol_pathway(
        &self,
        user_id: Uuid,
        pathway_id: Uuid,
    ) -> EngineResult<PathwayEnrolment> {
        self.store
            .get_pathway(pathway_id)
            .await?
            .ok_or_else(|| EngineError::not_found("pathway", pathway_id))?;
        self.student(user_id).await?;
        if self.pursues_pathway(user_id, pathway_id).await? {
            return Err(EngineError::AlreadyEnrolled);
        }

        let courses = self.store.list_pathway_courses(pathway_id).await?;
        let entry = courses
            .iter()
            .find(|c| c.level == CourseLevel::Beginner)
            .ok_or(EngineError::NoEntryCourse(pathway_id))?;

        let held: Vec<Uuid> = self
            .store
            .list_user_enrolments(user_id)
            .await?
            .into_iter()
            .filter(|e| e.status.is_active() && courses.iter().any(|c| c.id == e.course_id))
            .map(|e| e.id)
            .collect();

        let outcome = if held.is_empty() {
            let enrolment = match self.store.find_enrolment(user_id, entry.id).await? {
                // a disenrolled record for the entry course is flipped, not duplicated
                Some(previous) => self.reenrol(previous, Some(pathway_id)).await?,
                None => self.create(user_id, entry, Some(pathway_id)).await?,
            };
            PathwayEnrolment::Enrolled { enrolment }
        } else {
            let enrolments = self
                .store
                .set_enrolment_pathway(&held, Some(pathway_id))
                .await?;
            PathwayEnrolment::Retagged { enrolments }
        };

        tracing::info!(%user_id, %pathway_id, retagged = held.len(), "pathway enrolled");
        self.notifier
            .notify(NotificationEvent::PathwayEnrolled, pathway_id);
        Ok(outcome)
    }

    /// Drops the pathway tag; the course enrolments themselves stay.
    pub async fn disenrol_pathway(
        &self,
        user_id: Uuid,
        pathway_id: Uuid,
    ) -> EngineResult<Vec<Enrolment>> {
        let tagged: Vec<Uuid> = self
            .store
            .list_user_enrolments(user_id)
            .await?
            .into_iter()
            .filter(|e| e.pathway_id == Some(pathway_id))
            .map(|e| e.id)
            .collect();
        if tagged.is_empty() {
            return Err(EngineError::NotEnrolled);
        }

        let cleared = self.store.set_enrolment_pathway(&tagged, None).await?;
        tracing::info!(%user_id, %pathway_id, cleared = cleared.len(), "pathway disenrolled");
        self.notifier
            .notify(NotificationEvent::PathwayDisenrolled, pathway_id);
        Ok(cleared)
    }

    async fn student(&self, user_id: Uuid) -> EngineResult<User> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        if user.role != UserRole::Student {
            return Err(EngineError::RoleViolation(user_id));
        }
        Ok(user)
    }

    async fn pursues_pathway(&self, user_id: Uuid, pathway_id: Uuid) -> EngineResult<bool> {
        let enrolments = self.store.list_user_enrolments(user_id).await?;
        Ok(enrolments
            .iter()
            .any(|e| e.status.is_active() && e.pathway_id == Some(pathway_id)))
    }

    async fn create(
        &self,
        user_id: Uuid,
        course: &Course,
        pathway_id: Option<Uuid>,
    ) -> EngineResult<Enrolment> {
        let enrolment = Enrolment {
            id: Uuid::new_v4(),
            user_id,
            course_id: course.id,
            pathway_id,
            status: EnrolmentStatus::Enrolled,
            enrol_date: Utc::now(),
            disenrolled_date: None,
            completion_date: None,
        };
        match self.store.insert_enrolment(&enrolment).await {
            Ok(row) => Ok(row),
            // lost a race with a concurrent enrol for the same pair
            Err(StoreError::Conflict(_)) => Err(EngineError::AlreadyEnrolled),
            Err(e) => Err(e.into()),
        }
    }

    async fn reenrol(&self, mut previous: Enrolment, pathway_id: Option<Uuid>) -> EngineResult<Enrolment> {
        let from = previous.status;
        previous.status = transition(from, EnrolmentEvent::Enrol)?;
        previous.pathway_id = pathway_id;
        previous.disenrolled_date = None;
        let saved = self
            .store
            .transition_enrolment(from, &previous)
            .await?
            // a concurrent enrol flipped it first
            .ok_or(EngineError::AlreadyEnrolled)?;
        self.notifier.notify(NotificationEvent::Reenrolled, saved.id);

        // The re-enrolment is stored; a failed refresh must not turn it into an error.
        match self.progression.refresh_enrolment_status(saved.id).await {
            Ok(refreshed) => Ok(refreshed),
            Err(e) => {
                tracing::error!(error = %e, enrolment_id = %saved.id, "progression refresh failed");
                Ok(saved)
            }
        }
    }
}
