use std::fmt;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};

use super::schema::*;

pub type IdType = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum, Serialize, Deserialize)]
pub enum GrantStatus {
    Approved,
    Denied,
}

impl GrantStatus {
    pub fn from_str(name: &str) -> Option<GrantStatus> {
        match name {
            "approved" => Some(GrantStatus::Approved),
            "denied" => Some(GrantStatus::Denied),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Approved => "approved",
            GrantStatus::Denied => "denied",
        }
    }
}

/// One of the seven numeric columns of a water quality observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, juniper::GraphQLEnum, Serialize, Deserialize)]
pub enum Metric {
    DissolvedOxygenMg,
    DissolvedOxygenSat,
    Hardness,
    Alkalinity,
    Ph,
    Temperature,
    Flow,
}

/// Display order of the charts and of the entry form fields.
pub const ALL_METRICS: [Metric; 7] = [
    Metric::DissolvedOxygenMg,
    Metric::DissolvedOxygenSat,
    Metric::Hardness,
    Metric::Alkalinity,
    Metric::Ph,
    Metric::Temperature,
    Metric::Flow,
];

impl Metric {
    pub fn key(&self) -> &'static str {
        match self {
            Metric::DissolvedOxygenMg => "dissolved_oxygen_mg",
            Metric::DissolvedOxygenSat => "dissolved_oxygen_sat",
            Metric::Hardness => "hardness",
            Metric::Alkalinity => "alkalinity",
            Metric::Ph => "ph",
            Metric::Temperature => "temperature",
            Metric::Flow => "flow",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        ALL_METRICS.iter().copied().find(|x| x.key() == key)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Metric::DissolvedOxygenMg => "Dissolved Oxygen (mg/L)",
            Metric::DissolvedOxygenSat => "Dissolved Oxygen (% saturation)",
            Metric::Hardness => "Hardness (mg/L CaCO3)",
            Metric::Alkalinity => "Alkalinity (mg/L CaCO3)",
            Metric::Ph => "pH (S.U.s)",
            Metric::Temperature => "Temperature (°C)",
            Metric::Flow => "Flow (cfs)",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::DissolvedOxygenMg => "mg/L",
            Metric::DissolvedOxygenSat => "% saturation",
            Metric::Hardness | Metric::Alkalinity => "mg/L CaCO3",
            Metric::Ph => "S.U.s",
            Metric::Temperature => "°C",
            Metric::Flow => "cfs",
        }
    }

    /// Inclusive bounds accepted by the entry form.
    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        match self {
            Metric::DissolvedOxygenSat => (Some(0.0), Some(200.0)),
            Metric::Ph => (Some(0.0), Some(14.0)),
            Metric::Temperature => (None, None),
            _ => (Some(0.0), None),
        }
    }

    pub fn coerce(&self, value: f64) -> ServiceResult<f64> {
        if !value.is_finite() {
            return Err(ServiceError::BadRequest(format!("{} must be a finite number", self.title())));
        }
        let (min, max) = self.range();
        if min.map_or(false, |min| value < min) || max.map_or(false, |max| value > max) {
            return Err(ServiceError::BadRequest(format!(
                "{} must be between {} and {}",
                self.title(),
                min.map_or_else(|| "-inf".to_string(), |x| x.to_string()),
                max.map_or_else(|| "+inf".to_string(), |x| x.to_string()),
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The seven metrics of an observation, `None` being "not measured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub dissolved_oxygen_mg: Option<f64>,
    pub dissolved_oxygen_sat: Option<f64>,
    pub hardness: Option<f64>,
    pub alkalinity: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub flow: Option<f64>,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::DissolvedOxygenMg => self.dissolved_oxygen_mg,
            Metric::DissolvedOxygenSat => self.dissolved_oxygen_sat,
            Metric::Hardness => self.hardness,
            Metric::Alkalinity => self.alkalinity,
            Metric::Ph => self.ph,
            Metric::Temperature => self.temperature,
            Metric::Flow => self.flow,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::DissolvedOxygenMg => &mut self.dissolved_oxygen_mg,
            Metric::DissolvedOxygenSat => &mut self.dissolved_oxygen_sat,
            Metric::Hardness => &mut self.hardness,
            Metric::Alkalinity => &mut self.alkalinity,
            Metric::Ph => &mut self.ph,
            Metric::Temperature => &mut self.temperature,
            Metric::Flow => &mut self.flow,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = water_quality)]
pub struct Measurement {
    pub id: IdType,
    pub site: String,
    pub date: NaiveDate,
    pub dissolved_oxygen_mg: Option<f64>,
    pub dissolved_oxygen_sat: Option<f64>,
    pub hardness: Option<f64>,
    pub alkalinity: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub flow: Option<f64>,
    pub notes: String,
    pub user_id: Uuid,
    pub created_at: NaiveDateTime,
}

impl Measurement {
    pub fn metrics(&self) -> MetricValues {
        MetricValues {
            dissolved_oxygen_mg: self.dissolved_oxygen_mg,
            dissolved_oxygen_sat: self.dissolved_oxygen_sat,
            hardness: self.hardness,
            alkalinity: self.alkalinity,
            ph: self.ph,
            temperature: self.temperature,
            flow: self.flow,
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.metrics().get(metric)
    }
}

/// Write payload shared by inserts and updates.
/// Updates must clear a metric that became "not available", so `None` is written as NULL.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = water_quality, treat_none_as_null = true)]
pub struct MeasurementWrite {
    pub site: String,
    pub date: NaiveDate,
    pub dissolved_oxygen_mg: Option<f64>,
    pub dissolved_oxygen_sat: Option<f64>,
    pub hardness: Option<f64>,
    pub alkalinity: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub flow: Option<f64>,
    pub notes: String,
    pub user_id: Uuid,
}

impl MeasurementWrite {
    pub fn new(site: String, date: NaiveDate, metrics: &MetricValues, notes: String, user_id: Uuid) -> Self {
        MeasurementWrite {
            site,
            date,
            dissolved_oxygen_mg: metrics.dissolved_oxygen_mg,
            dissolved_oxygen_sat: metrics.dissolved_oxygen_sat,
            hardness: metrics.hardness,
            alkalinity: metrics.alkalinity,
            ph: metrics.ph,
            temperature: metrics.temperature,
            flow: metrics.flow,
            notes,
            user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = sites)]
pub struct SiteRow {
    pub id: IdType,
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: BigDecimal,
    pub longitude: BigDecimal,
    pub elevation: i32,
    pub description: String,
    pub updated_at: NaiveDateTime,
}

/// A monitoring location. `id` is `None` for the built-in fallback entries.
#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
#[graphql(description = "A monitoring site")]
pub struct Site {
    pub id: Option<IdType>,
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: i32,
    pub description: String,
}

impl From<SiteRow> for Site {
    fn from(row: SiteRow) -> Site {
        Site {
            id: Some(row.id),
            site_number: row.site_number,
            full_name: row.full_name,
            short_name: row.short_name,
            latitude: row.latitude.to_f64().unwrap_or_default(),
            longitude: row.longitude.to_f64().unwrap_or_default(),
            elevation: row.elevation,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLInputObject)]
pub struct SiteInput {
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: i32,
    pub description: String,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = sites)]
pub struct SiteWrite {
    pub site_number: i32,
    pub full_name: String,
    pub short_name: String,
    pub latitude: BigDecimal,
    pub longitude: BigDecimal,
    pub elevation: i32,
    pub description: String,
}

fn to_decimal(name: &str, value: f64) -> ServiceResult<BigDecimal> {
    BigDecimal::from_f64(value)
        .ok_or_else(|| ServiceError::BadRequest(format!("{} must be a finite number", name)))
}

impl TryFrom<&SiteInput> for SiteWrite {
    type Error = ServiceError;

    fn try_from(x: &SiteInput) -> ServiceResult<SiteWrite> {
        Ok(SiteWrite {
            site_number: x.site_number,
            full_name: x.full_name.clone(),
            short_name: x.short_name.clone(),
            latitude: to_decimal("latitude", x.latitude)?,
            longitude: to_decimal("longitude", x.longitude)?,
            elevation: x.elevation,
            description: x.description.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = pending_admins)]
pub struct AdminGrant {
    pub id: IdType,
    pub email: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
}

impl AdminGrant {
    pub fn grant_status(&self) -> Option<GrantStatus> {
        GrantStatus::from_str(self.status.as_str())
    }

    pub fn is_approved(&self) -> bool {
        self.grant_status() == Some(GrantStatus::Approved)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pending_admins)]
pub struct NewGrant {
    pub email: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
}

/// Revocations only touch `status`, approvals also stamp the approver.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = pending_admins)]
pub struct GrantUpdate {
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_account)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_keys_round_trip() {
        for metric in ALL_METRICS.iter() {
            assert_eq!(Metric::from_key(metric.key()), Some(*metric));
        }
        assert_eq!(Metric::from_key("turbidity"), None);
    }

    #[test]
    fn coerce_checks_ranges() {
        assert_eq!(Metric::Ph.coerce(7.2).unwrap(), 7.2);
        assert!(Metric::Ph.coerce(14.5).is_err());
        assert!(Metric::DissolvedOxygenSat.coerce(201.0).is_err());
        assert_eq!(Metric::Flow.coerce(0.0).unwrap(), 0.0);
        assert!(Metric::Flow.coerce(-1.0).is_err());
        assert_eq!(Metric::Temperature.coerce(-3.5).unwrap(), -3.5);
        assert!(Metric::Hardness.coerce(f64::NAN).is_err());
    }

    #[test]
    fn metric_values_by_metric() {
        let mut values = MetricValues::default();
        values.set(Metric::Ph, Some(7.0));
        values.set(Metric::Flow, Some(0.0));
        assert_eq!(values.get(Metric::Ph), Some(7.0));
        assert_eq!(values.get(Metric::Flow), Some(0.0));
        assert_eq!(values.get(Metric::Hardness), None);
    }

    #[test]
    fn grant_status_strings() {
        assert_eq!(GrantStatus::from_str("approved"), Some(GrantStatus::Approved));
        assert_eq!(GrantStatus::from_str("Approved"), None);
        assert_eq!(GrantStatus::Denied.as_str(), "denied");
    }
}
