use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::models::{AdminGrant, GrantUpdate, IdType, Measurement, MeasurementWrite, NewGrant, SiteInput, SiteRow, SiteWrite, User};

use super::{Backend, GrantFilter, MeasurementFilter, MeasurementOrder};

diesel::define_sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Connections are opened lazily, so a database that is down at startup
    /// only degrades the requests that need it.
    pub fn new(database_url: &str, max_size: u32) -> Self {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(max_size)
            .build_unchecked(manager);
        PgBackend { pool }
    }

    pub fn run_migrations(&self) -> ServiceResult<()> {
        let mut conn = self.pool.get()?;
        let applied = conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| ServiceError::BackendUnavailable(format!("Migration error: {}", e)))?;
        for version in applied {
            log::info!("Applied migration {}", version);
        }
        Ok(())
    }
}

impl Backend for PgBackend {
    fn select_measurements(&self, filter: &MeasurementFilter) -> ServiceResult<Vec<Measurement>> {
        use crate::schema::water_quality::dsl;

        let mut conn = self.pool.get()?;
        let mut query = dsl::water_quality
            .select(Measurement::as_select())
            .into_boxed();

        if !filter.sites.is_empty() {
            query = query.filter(dsl::site.eq_any(filter.sites.clone()));
        }
        if let Some(date) = filter.date {
            query = query.filter(dsl::date.eq(date));
        }

        query = match filter.order {
            MeasurementOrder::NewestFirst => query.order((dsl::created_at.desc(), dsl::id.desc())),
            MeasurementOrder::ByDate => query.order((dsl::date.asc(), dsl::created_at.asc(), dsl::id.asc())),
            MeasurementOrder::ByDateDesc => query.order((dsl::date.desc(), dsl::created_at.desc(), dsl::id.desc())),
        };

        Ok(query.load(&mut conn)?)
    }

    fn find_measurement(&self, id: IdType) -> ServiceResult<Option<Measurement>> {
        use crate::schema::water_quality::dsl;

        let mut conn = self.pool.get()?;
        Ok(dsl::water_quality.find(id)
            .select(Measurement::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn insert_measurement(&self, data: &MeasurementWrite) -> ServiceResult<Measurement> {
        use crate::schema::water_quality::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::insert_into(dsl::water_quality)
            .values(data)
            .returning(Measurement::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_measurement(&self, id: IdType, data: &MeasurementWrite) -> ServiceResult<Measurement> {
        use crate::schema::water_quality::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::update(dsl::water_quality.find(id))
            .set(data)
            .returning(Measurement::as_returning())
            .get_result(&mut conn)?)
    }

    fn delete_measurement(&self, id: IdType) -> ServiceResult<bool> {
        use crate::schema::water_quality::dsl;

        let mut conn = self.pool.get()?;
        let del_count = diesel::delete(dsl::water_quality.find(id))
            .execute(&mut conn)?;
        Ok(del_count == 1)
    }

    fn select_sites(&self) -> ServiceResult<Vec<SiteRow>> {
        use crate::schema::sites::dsl;

        let mut conn = self.pool.get()?;
        Ok(dsl::sites
            .select(SiteRow::as_select())
            .order((dsl::site_number.asc(), dsl::id.asc()))
            .load(&mut conn)?)
    }

    fn insert_site(&self, data: &SiteInput) -> ServiceResult<SiteRow> {
        use crate::schema::sites::dsl;

        let data = SiteWrite::try_from(data)?;
        let mut conn = self.pool.get()?;
        Ok(diesel::insert_into(dsl::sites)
            .values(&data)
            .returning(SiteRow::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_site(&self, id: IdType, data: &SiteInput) -> ServiceResult<SiteRow> {
        use crate::schema::sites::dsl;

        let data = SiteWrite::try_from(data)?;
        let mut conn = self.pool.get()?;
        Ok(diesel::update(dsl::sites.find(id))
            .set((&data, dsl::updated_at.eq(Utc::now().naive_utc())))
            .returning(SiteRow::as_returning())
            .get_result(&mut conn)?)
    }

    fn delete_site(&self, id: IdType) -> ServiceResult<bool> {
        use crate::schema::sites::dsl;

        let mut conn = self.pool.get()?;
        let del_count = diesel::delete(dsl::sites.find(id))
            .execute(&mut conn)?;
        Ok(del_count == 1)
    }

    fn select_grants(&self, filter: &GrantFilter) -> ServiceResult<Vec<AdminGrant>> {
        use crate::schema::pending_admins::dsl;

        let mut conn = self.pool.get()?;
        let mut query = dsl::pending_admins
            .select(AdminGrant::as_select())
            .into_boxed();

        // Older rows keep the address as it was typed
        if let Some(email) = &filter.email {
            query = query.filter(lower(dsl::email).eq(email.to_lowercase()));
        }
        if let Some(status) = filter.status {
            query = query.filter(dsl::status.eq(status.as_str()));
        }

        Ok(query.order(dsl::id.asc()).load(&mut conn)?)
    }

    fn insert_grant(&self, data: &NewGrant) -> ServiceResult<AdminGrant> {
        use crate::schema::pending_admins::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::insert_into(dsl::pending_admins)
            .values(data)
            .returning(AdminGrant::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_grant(&self, id: IdType, data: &GrantUpdate) -> ServiceResult<AdminGrant> {
        use crate::schema::pending_admins::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::update(dsl::pending_admins.find(id))
            .set(data)
            .returning(AdminGrant::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        use crate::schema::user_account::dsl;

        let mut conn = self.pool.get()?;
        Ok(dsl::user_account
            .filter(dsl::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_user_by_id(&self, id: Uuid) -> ServiceResult<Option<User>> {
        use crate::schema::user_account::dsl;

        let mut conn = self.pool.get()?;
        Ok(dsl::user_account.find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn insert_user(&self, user: &User) -> ServiceResult<User> {
        use crate::schema::user_account::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::insert_into(dsl::user_account)
            .values(user)
            .returning(User::as_returning())
            .get_result(&mut conn)?)
    }

    fn update_user_password(&self, id: Uuid, password_hash: &str) -> ServiceResult<User> {
        use crate::schema::user_account::dsl;

        let mut conn = self.pool.get()?;
        Ok(diesel::update(dsl::user_account.find(id))
            .set(dsl::password_hash.eq(password_hash))
            .returning(User::as_returning())
            .get_result(&mut conn)?)
    }
}
