pub mod attendance;
pub mod dashboard_user;
pub mod export_request;
pub mod lesson_plan;
pub mod user;

pub use attendance::{AttendanceRecord, AttendanceView, NewAttendance};
pub use dashboard_user::{DashboardUserRecord, NewDashboardUser};
pub use export_request::{ExportRequestRecord, ExportStatus, NewExportRequest};
pub use lesson_plan::{LessonPlanRecord, NewLessonPlan};
pub use user::{NewUser, UserRecord};
