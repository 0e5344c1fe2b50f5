//! One-time passcode ledger.
//!
//! The ledger owns every [`OtpRecord`]. At most one live record exists per
//! [`PhoneKey`]; issuing replaces it, and every verification is a single atomic
//! read-modify-write against the [`OtpStore`]. Callers only ever learn whether a
//! code was accepted; the reason for a rejection stays in the server log.

pub mod postgres;
pub mod store;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::OtpConfig;
use crate::phone::PhoneKey;
use crate::sms::SmsGateway;

pub use postgres::PgOtpStore;
pub use store::{InMemoryOtpStore, OtpStore};

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("OTP delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("OTP store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpRecord {
    pub phone_key: PhoneKey,
    #[serde(skip_serializing)]
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts_used: u32,
    pub attempts_max: u32,
    pub verified: bool,
    pub delivered: bool,
}

/// Result of applying one verification attempt to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Mismatch,
    Expired,
    Exhausted,
    AlreadyUsed,
    NotFound,
}

impl VerifyOutcome {
    pub fn is_verified(self) -> bool {
        matches!(self, VerifyOutcome::Verified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerifyOutcome::Verified => "verified",
            VerifyOutcome::Mismatch => "mismatch",
            VerifyOutcome::Expired => "expired",
            VerifyOutcome::Exhausted => "exhausted",
            VerifyOutcome::AlreadyUsed => "already_used",
            VerifyOutcome::NotFound => "not_found",
        }
    }
}

impl OtpRecord {
    pub fn new(
        phone_key: PhoneKey,
        code: String,
        now: DateTime<Utc>,
        ttl: Duration,
        attempts_max: u32,
    ) -> Self {
        Self {
            phone_key,
            code,
            issued_at: now,
            expires_at: now + ttl,
            attempts_used: 0,
            attempts_max,
            verified: false,
            delivered: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_used >= self.attempts_max
    }

    /// Still waiting on a successful SMS dispatch and usable for a retry
    fn awaiting_delivery(&self, now: DateTime<Utc>) -> bool {
        !self.delivered && !self.verified && !self.is_expired(now) && !self.is_exhausted()
    }
}

/// Applies one verification attempt to the slot for a phone.
///
/// Expired and exhausted records are evicted. Every attempt that reaches the
/// comparison counts against the budget, including the correct one.
pub fn apply_attempt(slot: &mut Option<OtpRecord>, candidate: &str, now: DateTime<Utc>) -> VerifyOutcome {
    let Some(record) = slot.as_mut() else {
        return VerifyOutcome::NotFound;
    };

    if record.is_expired(now) {
        *slot = None;
        return VerifyOutcome::Expired;
    }
    if record.is_exhausted() {
        *slot = None;
        return VerifyOutcome::Exhausted;
    }

    record.attempts_used += 1;

    if record.verified {
        return VerifyOutcome::AlreadyUsed;
    }

    if codes_match(&record.code, candidate) {
        record.verified = true;
        VerifyOutcome::Verified
    } else {
        VerifyOutcome::Mismatch
    }
}

fn codes_match(expected: &str, candidate: &str) -> bool {
    let (a, b) = (expected.as_bytes(), candidate.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Source of passcodes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Uniform decimal digits drawn from the thread-local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

pub struct OtpLedger {
    store: Arc<dyn OtpStore>,
    sms: Arc<dyn SmsGateway>,
    generator: Arc<dyn CodeGenerator>,
    config: OtpConfig,
    dispatch_timeout: std::time::Duration,
}

impl OtpLedger {
    pub fn new(
        store: Arc<dyn OtpStore>,
        sms: Arc<dyn SmsGateway>,
        config: OtpConfig,
        dispatch_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            sms,
            generator: Arc::new(RandomCodeGenerator),
            config,
            dispatch_timeout,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a fresh passcode for `phone` and dispatch it by SMS.
    ///
    /// The new record replaces any previous one and starts with a full attempt
    /// budget. The one exception is a previous record whose SMS was never
    /// delivered: its used attempts carry over, so retrying a failed dispatch
    /// does not refill the budget. On `DeliveryFailed` the record stays issued.
    pub async fn issue(&self, phone: &PhoneKey) -> Result<OtpRecord, OtpError> {
        // Durable stores keep microseconds; the record must compare equal after a round trip
        let now = Utc::now().trunc_subsecs(6);
        let code = self.generator.generate(self.config.code_length);
        let mut fresh = OtpRecord::new(
            phone.clone(),
            code,
            now,
            Duration::seconds(self.config.ttl_secs),
            self.config.max_attempts,
        );

        let mut issued: Option<OtpRecord> = None;
        self.store
            .update(phone, &mut |slot: &mut Option<OtpRecord>| {
                if let Some(previous) = slot.as_ref().filter(|r| r.awaiting_delivery(now)) {
                    fresh.attempts_used = previous.attempts_used;
                }
                *slot = Some(fresh.clone());
                issued = slot.clone();
            })
            .await?;
        let mut record = issued.ok_or_else(|| OtpError::Store("issued record missing".to_string()))?;

        info!(phone = %phone, expires_at = %record.expires_at, "Issued OTP");

        let body = self.config.message_template.replace("{code}", &record.code);
        let sent = tokio::time::timeout(self.dispatch_timeout, self.sms.send_sms(phone, &body)).await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(phone = %phone, error = %e, "OTP SMS dispatch failed");
                return Err(OtpError::DeliveryFailed(e.to_string()));
            }
            Err(_) => {
                warn!(phone = %phone, timeout = ?self.dispatch_timeout, "OTP SMS dispatch timed out");
                return Err(OtpError::DeliveryFailed("SMS gateway timed out".to_string()));
            }
        }

        let (code, issued_at) = (record.code.clone(), record.issued_at);
        self.store
            .update(phone, &mut |slot: &mut Option<OtpRecord>| {
                if let Some(current) = slot
                    .as_mut()
                    .filter(|r| r.code == code && r.issued_at == issued_at)
                {
                    current.delivered = true;
                }
            })
            .await?;
        record.delivered = true;

        Ok(record)
    }

    /// Check `candidate` against the live record for `phone`.
    ///
    /// Returns `false` for every kind of rejection.
    pub async fn verify(&self, phone: &PhoneKey, candidate: &str) -> Result<bool, OtpError> {
        self.verify_at(phone, candidate, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        phone: &PhoneKey,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, OtpError> {
        let mut outcome = VerifyOutcome::NotFound;
        self.store
            .update(phone, &mut |slot: &mut Option<OtpRecord>| {
                outcome = apply_attempt(slot, candidate, now);
            })
            .await?;

        if outcome.is_verified() {
            info!(phone = %phone, "OTP verified");
        } else {
            warn!(phone = %phone, reason = outcome.as_str(), "OTP verification failed");
        }
        Ok(outcome.is_verified())
    }

    /// Consume a verified, unexpired record. Returns whether one was present.
    pub async fn take_verified(&self, phone: &PhoneKey) -> Result<bool, OtpError> {
        let now = Utc::now();
        let mut taken = false;
        self.store
            .update(phone, &mut |slot: &mut Option<OtpRecord>| {
                if slot.as_ref().is_some_and(|r| r.verified && !r.is_expired(now)) {
                    *slot = None;
                    taken = true;
                }
            })
            .await?;
        Ok(taken)
    }

    pub async fn record(&self, phone: &PhoneKey) -> Result<Option<OtpRecord>, OtpError> {
        self.store.get(phone).await
    }
}
