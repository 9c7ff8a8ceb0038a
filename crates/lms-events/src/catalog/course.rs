//! Course domain events, including sections and lessons.
//!
//! Lesson-level payloads carry the full subject chain
//! (`lesson_id`, `section_id`, `course_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{CourseLevel, LessonType};

/// A course draft was created by an instructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCreated {
    pub course_id: String,
    pub instructor_id: String,
    pub title: String,
    pub level: CourseLevel,
    pub price: f64,
    /// ISO-4217 code, e.g. `USD`.
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdated {
    pub course_id: String,
    pub instructor_id: String,
    pub updated_fields: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A course became visible in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePublished {
    pub course_id: String,
    pub instructor_id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseArchived {
    pub course_id: String,
    pub instructor_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDeleted {
    pub course_id: String,
    pub instructor_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCreated {
    pub section_id: String,
    pub course_id: String,
    pub title: String,
    /// Zero-based position within the course.
    pub order: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCreated {
    pub lesson_id: String,
    pub section_id: String,
    pub course_id: String,
    pub title: String,
    pub lesson_type: LessonType,
    /// Zero-based position within the section.
    pub order: u32,
    pub timestamp: DateTime<Utc>,
}

/// A student finished a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompleted {
    pub lesson_id: String,
    pub section_id: String,
    pub course_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

domain_event!(CourseCreated => super::event_types::COURSE_CREATED);
domain_event!(CourseUpdated => super::event_types::COURSE_UPDATED);
domain_event!(CoursePublished => super::event_types::COURSE_PUBLISHED);
domain_event!(CourseArchived => super::event_types::COURSE_ARCHIVED);
domain_event!(CourseDeleted => super::event_types::COURSE_DELETED);
domain_event!(SectionCreated => super::event_types::SECTION_CREATED);
domain_event!(LessonCreated => super::event_types::LESSON_CREATED);
domain_event!(LessonCompleted => super::event_types::LESSON_COMPLETED);
