use chrono::NaiveDate;
use uuid::Uuid;

use crate::errors::ServiceResult;
use crate::models::{AdminGrant, GrantStatus, GrantUpdate, IdType, Measurement, MeasurementWrite, NewGrant, SiteInput, SiteRow, User};

pub mod pg;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use pg::PgBackend;
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryBackend, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementOrder {
    /// Most recently created first, used to pick the record a form edits.
    NewestFirst,
    #[default]
    ByDate,
    ByDateDesc,
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementFilter {
    /// Stored site spellings to match, empty for every site.
    pub sites: Vec<String>,
    pub date: Option<NaiveDate>,
    pub order: MeasurementOrder,
}

impl MeasurementFilter {
    pub fn all(order: MeasurementOrder) -> Self {
        MeasurementFilter { sites: vec![], date: None, order }
    }

    pub fn at(sites: Vec<String>, date: NaiveDate) -> Self {
        MeasurementFilter {
            sites,
            date: Some(date),
            order: MeasurementOrder::NewestFirst,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GrantFilter {
    /// Matched ignoring case.
    pub email: Option<String>,
    pub status: Option<GrantStatus>,
}

/// Tabular storage used by every component.
/// Every call may fail with `BackendUnavailable`, callers decide whether that is fatal.
pub trait Backend: Send + Sync {
    fn select_measurements(&self, filter: &MeasurementFilter) -> ServiceResult<Vec<Measurement>>;

    fn find_measurement(&self, id: IdType) -> ServiceResult<Option<Measurement>>;

    fn insert_measurement(&self, data: &MeasurementWrite) -> ServiceResult<Measurement>;

    fn update_measurement(&self, id: IdType, data: &MeasurementWrite) -> ServiceResult<Measurement>;

    fn delete_measurement(&self, id: IdType) -> ServiceResult<bool>;

    /// Ordered by site number.
    fn select_sites(&self) -> ServiceResult<Vec<SiteRow>>;

    fn insert_site(&self, data: &SiteInput) -> ServiceResult<SiteRow>;

    fn update_site(&self, id: IdType, data: &SiteInput) -> ServiceResult<SiteRow>;

    fn delete_site(&self, id: IdType) -> ServiceResult<bool>;

    fn select_grants(&self, filter: &GrantFilter) -> ServiceResult<Vec<AdminGrant>>;

    fn insert_grant(&self, data: &NewGrant) -> ServiceResult<AdminGrant>;

    fn update_grant(&self, id: IdType, data: &GrantUpdate) -> ServiceResult<AdminGrant>;

    fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<User>>;

    fn find_user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>>;

    fn insert_user(&self, user: &User) -> ServiceResult<User>;

    fn update_user_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User>;
}
