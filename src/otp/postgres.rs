use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{OtpError, OtpRecord, OtpStore};
use crate::phone::PhoneKey;

/// Durable OTP store backed by the `otp_codes` table.
///
/// Each update runs in its own transaction holding a transaction-scoped advisory
/// lock keyed on the phone, which serialises updates for that phone even when no
/// row exists yet.
#[derive(Clone)]
pub struct PgOtpStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct OtpRow {
    phone: String,
    code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts_used: i32,
    attempts_max: i32,
    verified: bool,
    delivered: bool,
}

impl From<OtpRow> for OtpRecord {
    fn from(row: OtpRow) -> Self {
        Self {
            phone_key: PhoneKey::from_stored(row.phone),
            code: row.code,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            attempts_used: row.attempts_used.max(0) as u32,
            attempts_max: row.attempts_max.max(0) as u32,
            verified: row.verified,
            delivered: row.delivered,
        }
    }
}

/// Row change needed after `apply` turned `before` into `after`
#[derive(Debug, PartialEq)]
enum SlotWrite<'a> {
    Unchanged,
    Upsert(&'a OtpRecord),
    Delete,
}

fn slot_write<'a>(before: &Option<OtpRecord>, after: &'a Option<OtpRecord>) -> SlotWrite<'a> {
    if before == after {
        return SlotWrite::Unchanged;
    }
    match after {
        Some(record) => SlotWrite::Upsert(record),
        None => SlotWrite::Delete,
    }
}

fn store_error(e: sqlx::Error) -> OtpError {
    OtpError::Store(e.to_string())
}

impl PgOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn update(
        &self,
        phone: &PhoneKey,
        apply: &mut (dyn for<'a> FnMut(&'a mut Option<OtpRecord>) + Send),
    ) -> Result<(), OtpError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(phone.as_str())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let before: Option<OtpRecord> = sqlx::query_as::<_, OtpRow>(
            "SELECT phone, code, issued_at, expires_at, attempts_used, attempts_max, verified, delivered \
             FROM otp_codes WHERE phone = $1",
        )
        .bind(phone.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .map(OtpRecord::from);

        let mut slot = before.clone();
        apply(&mut slot);

        match slot_write(&before, &slot) {
            SlotWrite::Unchanged => {}
            SlotWrite::Upsert(record) => {
                sqlx::query(
                    "INSERT INTO otp_codes \
                     (phone, code, issued_at, expires_at, attempts_used, attempts_max, verified, delivered) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     ON CONFLICT (phone) DO UPDATE SET \
                     code = EXCLUDED.code, issued_at = EXCLUDED.issued_at, expires_at = EXCLUDED.expires_at, \
                     attempts_used = EXCLUDED.attempts_used, attempts_max = EXCLUDED.attempts_max, \
                     verified = EXCLUDED.verified, delivered = EXCLUDED.delivered",
                )
                .bind(phone.as_str())
                .bind(&record.code)
                .bind(record.issued_at)
                .bind(record.expires_at)
                .bind(record.attempts_used as i32)
                .bind(record.attempts_max as i32)
                .bind(record.verified)
                .bind(record.delivered)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
            }
            SlotWrite::Delete => {
                sqlx::query("DELETE FROM otp_codes WHERE phone = $1")
                    .bind(phone.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error)?;
            }
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
