use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::phone::PhoneKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub phone: String,
    pub students_present: i32,
    pub students_absent: i32,
    pub absence_reason: String,
    pub subject: String,
    pub district: String,
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub phone: PhoneKey,
    pub students_present: i32,
    pub students_absent: i32,
    pub absence_reason: String,
    pub subject: String,
    pub district: String,
}

/// Attendance joined with the submitting user, matched on phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceView {
    #[serde(flatten)]
    pub attendance: AttendanceRecord,
    pub user_id: Option<i64>,
    pub teacher_name: Option<String>,
    pub school: Option<String>,
}
