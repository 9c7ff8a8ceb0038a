//! Assessment domain events: quizzes and assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmitted {
    pub submission_id: String,
    pub quiz_id: String,
    pub lesson_id: String,
    pub course_id: String,
    pub student_id: String,
    /// One-based attempt counter.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGraded {
    pub submission_id: String,
    pub quiz_id: String,
    pub course_id: String,
    pub student_id: String,
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSubmitted {
    pub submission_id: String,
    pub assignment_id: String,
    pub lesson_id: String,
    pub course_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentGraded {
    pub submission_id: String,
    pub assignment_id: String,
    pub course_id: String,
    pub student_id: String,
    /// Instructor who graded the submission.
    pub graded_by: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

domain_event!(QuizSubmitted => super::event_types::QUIZ_SUBMITTED);
domain_event!(QuizGraded => super::event_types::QUIZ_GRADED);
domain_event!(AssignmentSubmitted => super::event_types::ASSIGNMENT_SUBMITTED);
domain_event!(AssignmentGraded => super::event_types::ASSIGNMENT_GRADED);
