use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::{OtpError, OtpRecord};
use crate::phone::PhoneKey;

/// Backing store for OTP records.
///
/// `update` is the only mutation primitive: the store hands `apply` the current
/// slot for a phone and persists whatever it leaves behind (`None` evicts), with
/// no other operation on the same phone interleaving.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn update(
        &self,
        phone: &PhoneKey,
        apply: &mut (dyn for<'a> FnMut(&'a mut Option<OtpRecord>) + Send),
    ) -> Result<(), OtpError>;

    async fn get(&self, phone: &PhoneKey) -> Result<Option<OtpRecord>, OtpError> {
        let mut current = None;
        self.update(phone, &mut |slot: &mut Option<OtpRecord>| current = slot.clone())
            .await?;
        Ok(current)
    }
}

type Slot = Arc<Mutex<Option<OtpRecord>>>;

/// Process-local store with one lock per phone
#[derive(Default)]
pub struct InMemoryOtpStore {
    slots: RwLock<HashMap<PhoneKey, Slot>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, phone: &PhoneKey) -> Slot {
        // Fast path: try read lock
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(phone) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots.entry(phone.clone()).or_default().clone()
    }

    /// Remove `phone` from the map if its slot is empty and only `slot` still
    /// references it besides the map.
    ///
    /// Runs under the map write lock, so the slot cannot be picked up
    /// concurrently while it is checked.
    async fn release_if_empty(&self, phone: &PhoneKey, slot: &Slot) {
        let mut slots = self.slots.write().await;
        let unshared = Arc::strong_count(slot) == 2;
        if unshared && slot.try_lock().is_ok_and(|guard| guard.is_none()) {
            slots.remove(phone);
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn update(
        &self,
        phone: &PhoneKey,
        apply: &mut (dyn for<'a> FnMut(&'a mut Option<OtpRecord>) + Send),
    ) -> Result<(), OtpError> {
        let slot = self.slot(phone).await;
        let emptied = {
            let mut guard = slot.lock().await;
            apply(&mut *guard);
            guard.is_none()
        };
        if emptied {
            self.release_if_empty(phone, &slot).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::apply_attempt;
    use crate::phone::PhoneNormalizer;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn update_persists_and_evicts() {
        let store = InMemoryOtpStore::new();
        let phone = PhoneNormalizer::default().normalize("0772207616").unwrap();
        let record = OtpRecord::new(phone.clone(), "123456".into(), Utc::now(), Duration::minutes(5), 3);

        store
            .update(&phone, &mut |slot: &mut Option<OtpRecord>| *slot = Some(record.clone()))
            .await
            .unwrap();
        assert_eq!(store.get(&phone).await.unwrap(), Some(record));

        store
            .update(&phone, &mut |slot: &mut Option<OtpRecord>| *slot = None)
            .await
            .unwrap();
        assert_eq!(store.get(&phone).await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_phones_leave_no_slots() {
        let store = InMemoryOtpStore::new();
        let normalizer = PhoneNormalizer::default();

        for n in 0..1000 {
            let phone = normalizer.normalize(&format!("0772{:06}", n)).unwrap();
            store
                .update(&phone, &mut |slot: &mut Option<OtpRecord>| {
                    apply_attempt(slot, "123456", Utc::now());
                })
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn live_records_keep_their_slot() {
        let store = InMemoryOtpStore::new();
        let phone = PhoneNormalizer::default().normalize("0772207616").unwrap();
        let record = OtpRecord::new(phone.clone(), "123456".into(), Utc::now(), Duration::minutes(5), 3);

        store
            .update(&phone, &mut |slot: &mut Option<OtpRecord>| *slot = Some(record.clone()))
            .await
            .unwrap();
        store
            .update(&phone, &mut |slot: &mut Option<OtpRecord>| {
                apply_attempt(slot, "000000", Utc::now());
            })
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&phone).await.unwrap().unwrap().attempts_used, 1);
    }
}
