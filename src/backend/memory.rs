use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::models::{AdminGrant, GrantUpdate, IdType, Measurement, MeasurementWrite, NewGrant, SiteInput, SiteRow, SiteWrite, User};
use crate::sites::fallback_sites;

use super::{Backend, GrantFilter, MeasurementFilter, MeasurementOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Measurements,
    Sites,
    Grants,
    Users,
}

impl Table {
    fn name(&self) -> &'static str {
        match self {
            Table::Measurements => "water_quality",
            Table::Sites => "sites",
            Table::Grants => "pending_admins",
            Table::Users => "user_account",
        }
    }
}

#[derive(Default)]
struct Tables {
    measurements: Vec<Measurement>,
    sites: Vec<SiteRow>,
    grants: Vec<AdminGrant>,
    users: Vec<User>,
    next_id: IdType,
    last_created: Option<NaiveDateTime>,
    unavailable: HashSet<Table>,
}

impl Tables {
    fn next_id(&mut self) -> IdType {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing, so "newest first" is deterministic within a test.
    fn next_timestamp(&mut self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn check(&self, table: Table) -> ServiceResult<()> {
        if self.unavailable.contains(&table) {
            Err(ServiceError::BackendUnavailable(format!("{} is offline", table.name())))
        } else {
            Ok(())
        }
    }

    fn check_site_unique(&self, data: &SiteWrite, skip: Option<IdType>) -> ServiceResult<()> {
        let clash = self.sites.iter()
            .filter(|x| Some(x.id) != skip)
            .any(|x| x.full_name == data.full_name || x.short_name == data.short_name);
        if clash {
            Err(ServiceError::AlreadyPresent("Site name".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-process `Backend` used by the tests, every table can be taken offline on demand.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the three historical monitoring sites.
    pub fn with_default_sites() -> Self {
        let backend = Self::new();
        {
            let mut tables = backend.lock_raw();
            let now = Utc::now().naive_utc();
            for site in fallback_sites() {
                let id = tables.next_id();
                if let Ok(data) = SiteWrite::try_from(&site_input(&site)) {
                    tables.sites.push(site_row(id, data, now));
                }
            }
        }
        backend
    }

    pub fn set_unavailable(&self, table: Table, unavailable: bool) {
        let mut tables = self.lock_raw();
        if unavailable {
            tables.unavailable.insert(table);
        } else {
            tables.unavailable.remove(&table);
        }
    }

    pub fn measurement_count(&self) -> usize {
        self.lock_raw().measurements.len()
    }

    fn lock_raw(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self, table: Table) -> ServiceResult<MutexGuard<'_, Tables>> {
        let tables = self.lock_raw();
        tables.check(table)?;
        Ok(tables)
    }
}

fn site_input(site: &crate::models::Site) -> SiteInput {
    SiteInput {
        site_number: site.site_number,
        full_name: site.full_name.clone(),
        short_name: site.short_name.clone(),
        latitude: site.latitude,
        longitude: site.longitude,
        elevation: site.elevation,
        description: site.description.clone(),
    }
}

fn site_row(id: IdType, data: SiteWrite, updated_at: NaiveDateTime) -> SiteRow {
    SiteRow {
        id,
        site_number: data.site_number,
        full_name: data.full_name,
        short_name: data.short_name,
        latitude: data.latitude,
        longitude: data.longitude,
        elevation: data.elevation,
        description: data.description,
        updated_at,
    }
}

fn measurement_row(id: IdType, data: &MeasurementWrite, created_at: NaiveDateTime) -> Measurement {
    Measurement {
        id,
        site: data.site.clone(),
        date: data.date,
        dissolved_oxygen_mg: data.dissolved_oxygen_mg,
        dissolved_oxygen_sat: data.dissolved_oxygen_sat,
        hardness: data.hardness,
        alkalinity: data.alkalinity,
        ph: data.ph,
        temperature: data.temperature,
        flow: data.flow,
        notes: data.notes.clone(),
        user_id: data.user_id,
        created_at,
    }
}

impl Backend for MemoryBackend {
    fn select_measurements(&self, filter: &MeasurementFilter) -> ServiceResult<Vec<Measurement>> {
        let tables = self.lock(Table::Measurements)?;
        let mut rows: Vec<Measurement> = tables.measurements.iter()
            .filter(|x| filter.sites.is_empty() || filter.sites.contains(&x.site))
            .filter(|x| filter.date.map_or(true, |date| x.date == date))
            .cloned()
            .collect();

        match filter.order {
            MeasurementOrder::NewestFirst => rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id))),
            MeasurementOrder::ByDate => rows.sort_by(|a, b| (a.date, a.created_at, a.id).cmp(&(b.date, b.created_at, b.id))),
            MeasurementOrder::ByDateDesc => rows.sort_by(|a, b| (b.date, b.created_at, b.id).cmp(&(a.date, a.created_at, a.id))),
        }
        Ok(rows)
    }

    fn find_measurement(&self, id: IdType) -> ServiceResult<Option<Measurement>> {
        let tables = self.lock(Table::Measurements)?;
        Ok(tables.measurements.iter().find(|x| x.id == id).cloned())
    }

    fn insert_measurement(&self, data: &MeasurementWrite) -> ServiceResult<Measurement> {
        let mut tables = self.lock(Table::Measurements)?;
        let id = tables.next_id();
        let created_at = tables.next_timestamp();
        let row = measurement_row(id, data, created_at);
        tables.measurements.push(row.clone());
        Ok(row)
    }

    fn update_measurement(&self, id: IdType, data: &MeasurementWrite) -> ServiceResult<Measurement> {
        let mut tables = self.lock(Table::Measurements)?;
        let row = tables.measurements.iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| ServiceError::NotFound("Record".to_string()))?;
        *row = measurement_row(id, data, row.created_at);
        Ok(row.clone())
    }

    fn delete_measurement(&self, id: IdType) -> ServiceResult<bool> {
        let mut tables = self.lock(Table::Measurements)?;
        let before = tables.measurements.len();
        tables.measurements.retain(|x| x.id != id);
        Ok(tables.measurements.len() != before)
    }

    fn select_sites(&self) -> ServiceResult<Vec<SiteRow>> {
        let tables = self.lock(Table::Sites)?;
        let mut rows = tables.sites.clone();
        rows.sort_by_key(|x| (x.site_number, x.id));
        Ok(rows)
    }

    fn insert_site(&self, data: &SiteInput) -> ServiceResult<SiteRow> {
        let data = SiteWrite::try_from(data)?;
        let mut tables = self.lock(Table::Sites)?;
        tables.check_site_unique(&data, None)?;
        let id = tables.next_id();
        let row = site_row(id, data, Utc::now().naive_utc());
        tables.sites.push(row.clone());
        Ok(row)
    }

    fn update_site(&self, id: IdType, data: &SiteInput) -> ServiceResult<SiteRow> {
        let data = SiteWrite::try_from(data)?;
        let mut tables = self.lock(Table::Sites)?;
        tables.check_site_unique(&data, Some(id))?;
        let row = tables.sites.iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| ServiceError::NotFound("Record".to_string()))?;
        *row = site_row(id, data, Utc::now().naive_utc());
        Ok(row.clone())
    }

    fn delete_site(&self, id: IdType) -> ServiceResult<bool> {
        let mut tables = self.lock(Table::Sites)?;
        let before = tables.sites.len();
        tables.sites.retain(|x| x.id != id);
        Ok(tables.sites.len() != before)
    }

    fn select_grants(&self, filter: &GrantFilter) -> ServiceResult<Vec<AdminGrant>> {
        let tables = self.lock(Table::Grants)?;
        Ok(tables.grants.iter()
            .filter(|x| filter.email.as_ref().map_or(true, |email| x.email.to_lowercase() == email.to_lowercase()))
            .filter(|x| filter.status.map_or(true, |status| x.status == status.as_str()))
            .cloned()
            .collect())
    }

    fn insert_grant(&self, data: &NewGrant) -> ServiceResult<AdminGrant> {
        let mut tables = self.lock(Table::Grants)?;
        let id = tables.next_id();
        let row = AdminGrant {
            id,
            email: data.email.clone(),
            status: data.status.clone(),
            approved_by: data.approved_by.clone(),
            approved_at: data.approved_at,
        };
        tables.grants.push(row.clone());
        Ok(row)
    }

    fn update_grant(&self, id: IdType, data: &GrantUpdate) -> ServiceResult<AdminGrant> {
        let mut tables = self.lock(Table::Grants)?;
        let row = tables.grants.iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| ServiceError::NotFound("Record".to_string()))?;
        row.status = data.status.clone();
        if data.approved_by.is_some() {
            row.approved_by = data.approved_by.clone();
        }
        if data.approved_at.is_some() {
            row.approved_at = data.approved_at;
        }
        Ok(row.clone())
    }

    fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let tables = self.lock(Table::Users)?;
        Ok(tables.users.iter().find(|x| x.email == email).cloned())
    }

    fn find_user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        let tables = self.lock(Table::Users)?;
        Ok(tables.users.iter().find(|x| x.id == id).cloned())
    }

    fn insert_user(&self, user: &User) -> ServiceResult<User> {
        let mut tables = self.lock(Table::Users)?;
        if tables.users.iter().any(|x| x.email == user.email || x.id == user.id) {
            return Err(ServiceError::AlreadyPresent("Email".to_string()));
        }
        tables.users.push(user.clone());
        Ok(user.clone())
    }

    fn update_user_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User> {
        let mut tables = self.lock(Table::Users)?;
        let user = tables.users.iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| ServiceError::NotFound("Record".to_string()))?;
        user.password_hash = password_hash.to_string();
        Ok(user.clone())
    }
}
