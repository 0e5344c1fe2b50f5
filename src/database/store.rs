use async_trait::async_trait;
use std::sync::Arc;

use crate::database::manager::DatabaseError;
use crate::database::memory::MemoryStore;
use crate::database::models::*;
use crate::database::postgres::PgStore;
use crate::phone::PhoneKey;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateKey` when the phone is already registered
    async fn create(&self, user: NewUser) -> Result<UserRecord, DatabaseError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError>;
    async fn list_all(&self) -> Result<Vec<UserRecord>, DatabaseError>;
    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<UserRecord>, DatabaseError>;
}

#[async_trait]
pub trait DashboardUserStore: Send + Sync {
    /// Fails with `DuplicateKey` when the phone already has a dashboard account
    async fn create(&self, user: NewDashboardUser) -> Result<DashboardUserRecord, DatabaseError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<DashboardUserRecord>, DatabaseError>;
    async fn list_all(&self) -> Result<Vec<DashboardUserRecord>, DatabaseError>;
    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<DashboardUserRecord>, DatabaseError>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn create(&self, attendance: NewAttendance) -> Result<AttendanceRecord, DatabaseError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<AttendanceRecord>, DatabaseError>;
    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, DatabaseError>;
    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<AttendanceRecord>, DatabaseError>;
}

#[async_trait]
pub trait LessonPlanStore: Send + Sync {
    async fn create(&self, plan: NewLessonPlan) -> Result<LessonPlanRecord, DatabaseError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<LessonPlanRecord>, DatabaseError>;
    async fn list_all(&self) -> Result<Vec<LessonPlanRecord>, DatabaseError>;
    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<LessonPlanRecord>, DatabaseError>;
    /// Returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait ExportRequestStore: Send + Sync {
    async fn create(&self, request: NewExportRequest) -> Result<ExportRequestRecord, DatabaseError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<ExportRequestRecord>, DatabaseError>;
    async fn list_all(&self) -> Result<Vec<ExportRequestRecord>, DatabaseError>;
    async fn list_by_requester(&self, requester_id: i64) -> Result<Vec<ExportRequestRecord>, DatabaseError>;
    /// Move a pending request to `status`; fails with `InvalidTransition` otherwise
    async fn update_status(
        &self,
        id: i64,
        status: ExportStatus,
        approved_by: Option<i64>,
    ) -> Result<ExportRequestRecord, DatabaseError>;
}

/// The record stores a running server talks to
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub dashboard_users: Arc<dyn DashboardUserStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub lesson_plans: Arc<dyn LessonPlanStore>,
    pub export_requests: Arc<dyn ExportRequestStore>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            dashboard_users: store.clone(),
            attendance: store.clone(),
            lesson_plans: store.clone(),
            export_requests: store,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            dashboard_users: store.clone(),
            attendance: store.clone(),
            lesson_plans: store.clone(),
            export_requests: store,
        }
    }
}
