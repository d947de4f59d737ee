use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::backend::{Backend, MeasurementFilter, MeasurementOrder};
use crate::errors::ServiceResult;
use crate::models::Measurement;

/// Shared copy of the whole observation table, ordered by date.
/// Writers call `invalidate` after a successful write so the next read reloads.
#[derive(Clone, Default)]
pub struct MeasurementCache {
    data: Arc<RwLock<Option<Arc<Vec<Measurement>>>>>,
    generation: Arc<AtomicU64>,
}

impl MeasurementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, backend: &dyn Backend) -> ServiceResult<Arc<Vec<Measurement>>> {
        if let Some(data) = self.read().as_ref() {
            return Ok(data.clone());
        }

        let generation = self.generation.load(Ordering::Acquire);
        let rows = Arc::new(backend.select_measurements(&MeasurementFilter::all(MeasurementOrder::ByDate))?);

        let mut slot = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A write landed while loading, keep the result for this caller only
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(rows.clone());
        }
        Ok(rows)
    }

    pub fn invalidate(&self) {
        let mut slot = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }

    fn read(&self) -> Option<Arc<Vec<Measurement>>> {
        self.data.read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
