//! Postgres-backed record stores.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::manager::DatabaseError;
use crate::database::models::*;
use crate::database::store::*;
use crate::phone::PhoneKey;

const USER_COLUMNS: &str = "id, phone, name, school, district, language";
const DASHBOARD_USER_COLUMNS: &str = "id, phone, name, role, is_verified";
const ATTENDANCE_COLUMNS: &str =
    "id, phone, students_present, students_absent, absence_reason, subject, district";
const LESSON_PLAN_COLUMNS: &str =
    "id, phone, score, subject, feedback, storage_path, original_filename, public_url, created_at";
const EXPORT_REQUEST_COLUMNS: &str = "id, requester_id, requester_name, requester_phone, data_type, \
     record_count, reason, status, created_at, approved_by, approved_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<UserRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO users (phone, name, school, district, language) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user.phone.as_str())
            .bind(&user.name)
            .bind(&user.school)
            .bind(&user.district)
            .bind(&user.language)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, "users.phone"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<UserRecord>, DatabaseError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1");
        Ok(sqlx::query_as(&sql)
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl DashboardUserStore for PgStore {
    async fn create(&self, user: NewDashboardUser) -> Result<DashboardUserRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO dashboard_users (phone, name, role, is_verified) \
             VALUES ($1, $2, $3, $4) RETURNING {DASHBOARD_USER_COLUMNS}"
        );
        sqlx::query_as::<_, DashboardUserRecord>(&sql)
            .bind(user.phone.as_str())
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.is_verified)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, "dashboard_users.phone"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<DashboardUserRecord>, DatabaseError> {
        let sql = format!("SELECT {DASHBOARD_USER_COLUMNS} FROM dashboard_users WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<DashboardUserRecord>, DatabaseError> {
        let sql = format!("SELECT {DASHBOARD_USER_COLUMNS} FROM dashboard_users ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Option<DashboardUserRecord>, DatabaseError> {
        let sql = format!("SELECT {DASHBOARD_USER_COLUMNS} FROM dashboard_users WHERE phone = $1");
        Ok(sqlx::query_as(&sql)
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn create(&self, attendance: NewAttendance) -> Result<AttendanceRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO attendance (phone, students_present, students_absent, absence_reason, subject, district) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ATTENDANCE_COLUMNS}"
        );
        sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(attendance.phone.as_str())
            .bind(attendance.students_present)
            .bind(attendance.students_absent)
            .bind(&attendance.absence_reason)
            .bind(&attendance.subject)
            .bind(&attendance.district)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, "attendance"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<AttendanceRecord>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<AttendanceRecord>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<AttendanceRecord>, DatabaseError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE phone = $1 ORDER BY id");
        Ok(sqlx::query_as(&sql)
            .bind(phone.as_str())
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl LessonPlanStore for PgStore {
    async fn create(&self, plan: NewLessonPlan) -> Result<LessonPlanRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO lesson_plans (phone, score, subject, feedback, storage_path, original_filename, public_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {LESSON_PLAN_COLUMNS}"
        );
        sqlx::query_as::<_, LessonPlanRecord>(&sql)
            .bind(plan.phone.as_str())
            .bind(plan.score)
            .bind(&plan.subject)
            .bind(&plan.feedback)
            .bind(&plan.storage_path)
            .bind(&plan.original_filename)
            .bind(&plan.public_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, "lesson_plans.storage_path"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<LessonPlanRecord>, DatabaseError> {
        let sql = format!("SELECT {LESSON_PLAN_COLUMNS} FROM lesson_plans WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<LessonPlanRecord>, DatabaseError> {
        let sql = format!("SELECT {LESSON_PLAN_COLUMNS} FROM lesson_plans ORDER BY id");
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_by_phone(&self, phone: &PhoneKey) -> Result<Vec<LessonPlanRecord>, DatabaseError> {
        let sql = format!("SELECT {LESSON_PLAN_COLUMNS} FROM lesson_plans WHERE phone = $1 ORDER BY id");
        Ok(sqlx::query_as(&sql)
            .bind(phone.as_str())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM lesson_plans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExportRequestStore for PgStore {
    async fn create(&self, request: NewExportRequest) -> Result<ExportRequestRecord, DatabaseError> {
        let sql = format!(
            "INSERT INTO export_requests \
             (requester_id, requester_name, requester_phone, data_type, record_count, reason, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EXPORT_REQUEST_COLUMNS}"
        );
        sqlx::query_as::<_, ExportRequestRecord>(&sql)
            .bind(request.requester_id)
            .bind(&request.requester_name)
            .bind(&request.requester_phone)
            .bind(&request.data_type)
            .bind(request.record_count)
            .bind(&request.reason)
            .bind(ExportStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_insert(e, "export_requests"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ExportRequestRecord>, DatabaseError> {
        let sql = format!("SELECT {EXPORT_REQUEST_COLUMNS} FROM export_requests WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<ExportRequestRecord>, DatabaseError> {
        let sql = format!("SELECT {EXPORT_REQUEST_COLUMNS} FROM export_requests ORDER BY created_at DESC, id DESC");
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn list_by_requester(&self, requester_id: i64) -> Result<Vec<ExportRequestRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {EXPORT_REQUEST_COLUMNS} FROM export_requests \
             WHERE requester_id = $1 ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as(&sql)
            .bind(requester_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ExportStatus,
        approved_by: Option<i64>,
    ) -> Result<ExportRequestRecord, DatabaseError> {
        if status == ExportStatus::Pending {
            let current = ExportRequestStore::get_by_id(self, id)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("export request {}", id)))?;
            return Err(DatabaseError::InvalidTransition { current: current.status });
        }

        // Only a pending row matches, so two concurrent decisions cannot both land
        let sql = format!(
            "UPDATE export_requests SET status = $2, \
             approved_by = CASE WHEN $2 = 'approved' THEN $3 ELSE approved_by END, \
             approved_at = CASE WHEN $2 = 'approved' THEN now() ELSE approved_at END \
             WHERE id = $1 AND status = 'pending' RETURNING {EXPORT_REQUEST_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, ExportRequestRecord>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(approved_by)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => Ok(record),
            None => match ExportRequestStore::get_by_id(self, id).await? {
                Some(current) => Err(DatabaseError::InvalidTransition { current: current.status }),
                None => Err(DatabaseError::NotFound(format!("export request {}", id))),
            },
        }
    }
}
