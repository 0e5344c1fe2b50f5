//! In-process record stores for development and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::database::manager::DatabaseError;
use crate::database::models::*;
use crate::database::store::*;
use crate::phone::PhoneKey;

struct Table<T> {
    rows: BTreeMap<i64, T>,
    last_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T: Clone> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn all(&self) -> Vec<T> {
        self.rows.values().cloned().collect()
    }

    fn filter(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.values().filter(|row| keep(row)).cloned().collect()
    }
}

#[derive(Default)]
struct Tables {
    users: Table<UserRecord>,
    dashboard_users: Table<DashboardUserRecord>,
    attendance: Table<AttendanceRecord>,
    lesson_plans: Table<LessonPlanRecord>,
    export_requests: Table<ExportRequestRecord>,
}

/// Every record store backed by maps behind one lock. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<UserRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let table = &mut tables.users;
        if table.rows.values().any(|u| u.phone == user.phone.as_str()) {
            return Err(DatabaseError::DuplicateKey(format!("users.phone {}", user.phone)));
        }

        let record = UserRecord {
            id: table.next_id(),
            phone: user.phone.to_string(),
            name: user.name,
            school: user.school,
            district: user.district,
            language: user.language,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        Ok(self.tables.read().await.users.get(id))
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        Ok(self.tables.read().await.users.all())
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<UserRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.users.filter(|u| u.phone == phone.as_str()).into_iter().next())
    }
}

#[async_trait]
impl DashboardUserStore for MemoryStore {
    async fn create(&self, user: NewDashboardUser) -> Result<DashboardUserRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let table = &mut tables.dashboard_users;
        if table.rows.values().any(|u| u.phone == user.phone.as_str()) {
            return Err(DatabaseError::DuplicateKey(format!(
                "dashboard_users.phone {}",
                user.phone
            )));
        }

        let record = DashboardUserRecord {
            id: table.next_id(),
            phone: user.phone.to_string(),
            name: user.name,
            role: user.role,
            is_verified: user.is_verified,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<DashboardUserRecord>, DatabaseError> {
        Ok(self.tables.read().await.dashboard_users.get(id))
    }

    async fn list_all(&self) -> Result<Vec<DashboardUserRecord>, DatabaseError> {
        Ok(self.tables.read().await.dashboard_users.all())
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<DashboardUserRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .dashboard_users
            .filter(|u| u.phone == phone.as_str())
            .into_iter()
            .next())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn create(&self, attendance: NewAttendance) -> Result<AttendanceRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let table = &mut tables.attendance;
        let record = AttendanceRecord {
            id: table.next_id(),
            phone: attendance.phone.to_string(),
            students_present: attendance.students_present,
            students_absent: attendance.students_absent,
            absence_reason: attendance.absence_reason,
            subject: attendance.subject,
            district: attendance.district,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<AttendanceRecord>, DatabaseError> {
        Ok(self.tables.read().await.attendance.get(id))
    }

    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, DatabaseError> {
        Ok(self.tables.read().await.attendance.all())
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<AttendanceRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.attendance.filter(|a| a.phone == phone.as_str()))
    }
}

#[async_trait]
impl LessonPlanStore for MemoryStore {
    async fn create(&self, plan: NewLessonPlan) -> Result<LessonPlanRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let table = &mut tables.lesson_plans;
        let record = LessonPlanRecord {
            id: table.next_id(),
            phone: plan.phone.to_string(),
            score: plan.score,
            subject: plan.subject,
            feedback: plan.feedback,
            storage_path: plan.storage_path,
            original_filename: plan.original_filename,
            public_url: plan.public_url,
            created_at: Utc::now(),
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<LessonPlanRecord>, DatabaseError> {
        Ok(self.tables.read().await.lesson_plans.get(id))
    }

    async fn list_all(&self) -> Result<Vec<LessonPlanRecord>, DatabaseError> {
        Ok(self.tables.read().await.lesson_plans.all())
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<LessonPlanRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.lesson_plans.filter(|p| p.phone == phone.as_str()))
    }

    async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        Ok(self.tables.write().await.lesson_plans.rows.remove(&id).is_some())
    }
}

#[async_trait]
impl ExportRequestStore for MemoryStore {
    async fn create(&self, request: NewExportRequest) -> Result<ExportRequestRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let table = &mut tables.export_requests;
        let record = ExportRequestRecord {
            id: table.next_id(),
            requester_id: request.requester_id,
            requester_name: request.requester_name,
            requester_phone: request.requester_phone,
            data_type: request.data_type,
            record_count: request.record_count,
            reason: request.reason,
            status: ExportStatus::Pending,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ExportRequestRecord>, DatabaseError> {
        Ok(self.tables.read().await.export_requests.get(id))
    }

    async fn list_all(&self) -> Result<Vec<ExportRequestRecord>, DatabaseError> {
        Ok(self.tables.read().await.export_requests.all())
    }

    async fn list_by_requester(&self, requester_id: i64) -> Result<Vec<ExportRequestRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.export_requests.filter(|r| r.requester_id == requester_id))
    }

    async fn update_status(
        &self,
        id: i64,
        status: ExportStatus,
        approved_by: Option<i64>,
    ) -> Result<ExportRequestRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .export_requests
            .rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("export request {}", id)))?;

        record
            .transition(status, approved_by, Utc::now())
            .map_err(|current| DatabaseError::InvalidTransition { current })?;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::phone::PhoneNormalizer;

    fn phone(raw: &str) -> PhoneKey {
        PhoneNormalizer::default().normalize(raw).unwrap()
    }

    fn new_user(raw: &str) -> NewUser {
        NewUser {
            phone: phone(raw),
            name: "Jane Namuli".to_string(),
            school: "Kampala Primary".to_string(),
            district: "Kampala".to_string(),
            language: "Luganda".to_string(),
        }
    }

    #[tokio::test]
    async fn user_phone_is_unique() {
        let store = MemoryStore::new();
        let first = UserStore::create(&store, new_user("0772207616")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.phone, "+256772207616");

        let dup = UserStore::create(&store, new_user("+256772207616")).await;
        assert!(matches!(dup, Err(DatabaseError::DuplicateKey(_))));

        let found = UserStore::find_by_phone(&store, &phone("772207616")).await.unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn dashboard_and_field_ids_are_separate() {
        let store = MemoryStore::new();
        UserStore::create(&store, new_user("0772207616")).await.unwrap();
        let admin = DashboardUserStore::create(
            &store,
            NewDashboardUser {
                phone: phone("0772207616"),
                name: "Admin".to_string(),
                role: Role::Superadmin,
                is_verified: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(admin.id, 1);
    }

    #[tokio::test]
    async fn deleted_lesson_plan_ids_are_not_reused() {
        let store = MemoryStore::new();
        let plan = || NewLessonPlan {
            phone: phone("0772207616"),
            score: 80,
            subject: "Hygiene".to_string(),
            feedback: "Good".to_string(),
            storage_path: "lesson_plans/a.png".to_string(),
            original_filename: "a.png".to_string(),
            public_url: "https://example/a.png".to_string(),
        };

        let first = LessonPlanStore::create(&store, plan()).await.unwrap();
        assert!(LessonPlanStore::delete(&store, first.id).await.unwrap());
        assert!(!LessonPlanStore::delete(&store, first.id).await.unwrap());

        let second = LessonPlanStore::create(&store, plan()).await.unwrap();
        assert_eq!(second.id, first.id + 1);
    }

    #[tokio::test]
    async fn export_status_moves_once() {
        let store = MemoryStore::new();
        let request = ExportRequestStore::create(
            &store,
            NewExportRequest {
                requester_id: 3,
                requester_name: "Grace".to_string(),
                requester_phone: "+256772207616".to_string(),
                data_type: "attendance".to_string(),
                record_count: 10,
                reason: "Report".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(request.status, ExportStatus::Pending);

        let approved = store
            .update_status(request.id, ExportStatus::Approved, Some(1))
            .await
            .unwrap();
        assert_eq!(approved.approved_by, Some(1));

        let again = store.update_status(request.id, ExportStatus::Rejected, Some(1)).await;
        assert!(matches!(
            again,
            Err(DatabaseError::InvalidTransition { current: ExportStatus::Approved })
        ));

        let missing = store.update_status(99, ExportStatus::Approved, Some(1)).await;
        assert!(matches!(missing, Err(DatabaseError::NotFound(_))));

        assert_eq!(store.list_by_requester(3).await.unwrap().len(), 1);
        assert!(store.list_by_requester(4).await.unwrap().is_empty());
    }
}
