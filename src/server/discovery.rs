use crate::feed::{DiscoveryData, DiscoveryEntry};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Counting barrier opened once every handler has finished its first cycle.
///
/// Each handler owns one [`BarrierPermit`]. Releasing it (explicitly, or by
/// dropping it when the handler task ends early) adds one permit; [`wait`]
/// resolves when all of them are in.
///
/// [`wait`]: DiscoveryBarrier::wait
#[derive(Debug)]
pub(crate) struct DiscoveryBarrier {
    permits: Arc<Semaphore>,
    parties: u32,
}

impl DiscoveryBarrier {
    /// Returns the barrier and one permit per party.
    pub(crate) fn new(parties: usize) -> (Self, Vec<BarrierPermit>) {
        let permits = Arc::new(Semaphore::new(0));
        let handles = (0..parties)
            .map(|_| BarrierPermit {
                permits: Some(Arc::clone(&permits)),
            })
            .collect();
        let parties = u32::try_from(parties).unwrap_or(u32::MAX);
        (Self { permits, parties }, handles)
    }

    pub(crate) async fn wait(&self) {
        // The semaphore is never closed, so acquiring can only fail if it were.
        if let Ok(all) = self.permits.acquire_many(self.parties).await {
            all.forget();
        }
    }
}

/// One party's share of a [`DiscoveryBarrier`]. Releases at most once.
#[derive(Debug)]
pub(crate) struct BarrierPermit {
    permits: Option<Arc<Semaphore>>,
}

impl BarrierPermit {
    pub(crate) fn release(&mut self) {
        if let Some(permits) = self.permits.take() {
            permits.add_permits(1);
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.permits.is_none()
    }
}

impl Drop for BarrierPermit {
    fn drop(&mut self) {
        self.release();
    }
}

/// Language-bucketed listing collected from the handlers' first cycles.
///
/// Feeds without a language go into the `""` bucket. Once frozen the index
/// ignores further additions.
#[derive(Debug)]
pub(crate) struct DiscoveryIndex {
    buckets: Mutex<Option<BTreeMap<String, Vec<DiscoveryEntry>>>>,
}

impl DiscoveryIndex {
    pub(crate) fn new() -> Self {
        Self {
            buckets: Mutex::new(Some(BTreeMap::new())),
        }
    }

    /// Returns `false` once the index has been frozen.
    pub(crate) fn add(&self, language: Option<&str>, entry: DiscoveryEntry) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        match buckets.as_mut() {
            Some(buckets) => {
                buckets
                    .entry(language.unwrap_or("").to_owned())
                    .or_default()
                    .push(entry);
                true
            }
            None => false,
        }
    }

    /// Takes the collected listing sorted into canonical feed order.
    pub(crate) fn freeze(&self) -> DiscoveryData {
        let taken = self
            .buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();
        let mut data = DiscoveryData::from_buckets(taken);
        data.sort_canonical();
        data
    }
}
