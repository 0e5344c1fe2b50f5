//! Access policy: which identity may do what, and what it gets to see.
//!
//! Every handler that reads or mutates dashboard data goes through
//! [`AccessPolicy`]. Masking only rewrites response payloads; stored records are
//! never touched.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::auth::{Identity, Role};
use crate::database::models::{AttendanceRecord, AttendanceView, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ListRegistrations,
    ViewUser,
    ListAttendance,
    ListLessonPlans,
    DeleteLessonPlan,
    ViewOwnProfile,
    CreateExportRequest,
    ListExportRequests,
    UpdateExportRequest,
    ViewUserExportRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InsufficientRole,
    NotOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Insufficient permissions")]
    InsufficientRole,

    #[error("Not allowed to access another user's data")]
    NotOwner,
}

impl From<DenyReason> for PolicyError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::InsufficientRole => PolicyError::InsufficientRole,
            DenyReason::NotOwner => PolicyError::NotOwner,
        }
    }
}

/// Records that carry fields hidden from roles below superadmin
pub trait Maskable {
    fn masked(self) -> Self;
}

pub fn masked_school(user_id: i64) -> String {
    format!("SCH-{:04}", user_id)
}

pub fn masked_teacher(user_id: i64) -> String {
    format!("Teacher-{:04}", user_id)
}

pub fn masked_user_district(user_id: i64) -> String {
    format!("District-{:02}", user_id.rem_euclid(100))
}

// Keyed on the attendance row, not the user
pub fn masked_attendance_district(record_id: i64) -> String {
    format!("DIST-{:02}", record_id.rem_euclid(100))
}

impl Maskable for UserRecord {
    fn masked(mut self) -> Self {
        self.name = masked_teacher(self.id);
        self.school = masked_school(self.id);
        self.district = masked_user_district(self.id);
        self
    }
}

impl Maskable for AttendanceRecord {
    fn masked(mut self) -> Self {
        self.district = masked_attendance_district(self.id);
        self
    }
}

impl Maskable for AttendanceView {
    fn masked(mut self) -> Self {
        self.attendance = self.attendance.masked();
        if let Some(user_id) = self.user_id {
            self.teacher_name = self.teacher_name.map(|_| masked_teacher(user_id));
            self.school = self.school.map(|_| masked_school(user_id));
        }
        self
    }
}

impl<T: Maskable> Maskable for Vec<T> {
    fn masked(self) -> Self {
        self.into_iter().map(Maskable::masked).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `identity` may perform `action` on a resource owned by `owner`
    pub fn authorize(&self, identity: &Identity, action: Action, owner: Option<i64>) -> Decision {
        if identity.role == Role::Superadmin {
            return Decision::Allow;
        }

        let owns = owner == Some(identity.subject_id);
        match action {
            Action::ListRegistrations
            | Action::ListAttendance
            | Action::ListLessonPlans
            | Action::ViewOwnProfile
            | Action::CreateExportRequest => Decision::Allow,

            Action::ViewUser => match identity.role {
                Role::Fieldworker if !owns => Decision::Deny(DenyReason::NotOwner),
                _ => Decision::Allow,
            },

            Action::ViewUserExportRequests if owns => Decision::Allow,
            Action::ViewUserExportRequests => Decision::Deny(DenyReason::NotOwner),

            Action::DeleteLessonPlan | Action::ListExportRequests | Action::UpdateExportRequest => {
                Decision::Deny(DenyReason::InsufficientRole)
            }
        }
    }

    /// [`authorize`](Self::authorize) as a `Result`, logging denials
    pub fn require(&self, identity: &Identity, action: Action, owner: Option<i64>) -> Result<(), PolicyError> {
        match self.authorize(identity, action, owner) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                warn!(
                    subject_id = identity.subject_id,
                    role = %identity.role,
                    action = ?action,
                    owner = ?owner,
                    reason = ?reason,
                    "Access denied"
                );
                Err(reason.into())
            }
        }
    }

    pub fn should_mask(&self, identity: &Identity) -> bool {
        identity.role != Role::Superadmin
    }

    pub fn mask<T: Maskable>(&self, identity: &Identity, record: T) -> T {
        if self.should_mask(identity) {
            record.masked()
        } else {
            record
        }
    }
}
