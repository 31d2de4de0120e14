use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    CourseOwner,
    Admin,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "course_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    /// Numeric rank used by pathway gating (beginner=1 .. advanced=3).
    pub fn rank(self) -> u8 {
        match self {
            CourseLevel::Beginner => 1,
            CourseLevel::Intermediate => 2,
            CourseLevel::Advanced => 3,
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "enrolment_status")]
pub enum EnrolmentStatus {
    #[sqlx(rename = "enrolled")]
    #[serde(rename = "enrolled")]
    Enrolled,
    #[sqlx(rename = "in progress")]
    #[serde(rename = "in progress")]
    InProgress,
    #[sqlx(rename = "completed")]
    #[serde(rename = "completed")]
    Completed,
    #[sqlx(rename = "disenrolled")]
    #[serde(rename = "disenrolled")]
    Disenrolled,
}

impl EnrolmentStatus {
    pub fn is_active(self) -> bool {
        self != EnrolmentStatus::Disenrolled
    }
}

// --- catalog (read-only from the core) ---

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Pathway {
    pub id: Uuid,
    pub title: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub pathway_id: Option<Uuid>,
    pub level: CourseLevel,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Module {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Quiz {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub question_number: i32,
    pub text: String,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct AnswerOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub option_order: i32,
    pub text: String,
    pub is_correct: bool,
}

// --- owned by the core ---

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Enrolment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub pathway_id: Option<Uuid>,
    pub status: EnrolmentStatus,
    pub enrol_date: DateTime<Utc>,
    pub disenrolled_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub enrolment_id: Uuid,
    pub count: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub passed: Option<bool>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttemptAnswer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub option_id: Option<Uuid>, // None = unanswered
    pub is_correct: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttemptWithAnswers {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub answers: Vec<AttemptAnswer>,
}

// --- requests ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrolReq {
    pub course_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PathwayEnrolReq {
    pub user_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartAttemptReq {
    pub quiz_id: Uuid,
    pub enrolment_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub option_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SubmitAttemptReq {
    #[serde(default)]
    pub answers: Option<Vec<AnswerInput>>,
}

/// Outcome of `enrol_pathway`: either a fresh entry-course enrolment or the
/// existing pathway courses re-tagged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PathwayEnrolment {
    Enrolled { enrolment: Enrolment },
    Retagged { enrolments: Vec<Enrolment> },
}
