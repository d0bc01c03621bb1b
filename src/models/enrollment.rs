// src/models/enrollment.rs

use serde::Serialize;
use sqlx::FromRow;

/// Represents the 'enrollments' table in the database.
/// Maps (user, course) to the experimental group the learner was assigned.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub group_name: String,
}
