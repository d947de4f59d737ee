use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{Backend, MeasurementFilter, MeasurementOrder};
use crate::cache::MeasurementCache;
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{IdType, Measurement, MeasurementWrite, Metric, MetricValues, ALL_METRICS};
use crate::sites::{full_name_for, storage_spellings, storage_token, SiteListing, SiteRegistry};

/// Session key of the serialized `EntryState`.
pub const SESSION_KEY: &str = "entry_state";

/// A staged form field: the number typed in the box and its "not available" toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricInput {
    pub value: Option<f64>,
    pub not_available: bool,
}

impl MetricInput {
    pub fn value(value: f64) -> Self {
        MetricInput { value: Some(value), not_available: false }
    }

    pub fn not_available() -> Self {
        MetricInput { value: None, not_available: true }
    }

    /// The toggle wins over whatever is staged in the box.
    pub fn resolve(&self) -> Option<f64> {
        if self.not_available {
            None
        } else {
            self.value
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricInputs(BTreeMap<Metric, MetricInput>);

impl MetricInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a form: stored NULLs show up as toggled fields.
    pub fn from_values(values: &MetricValues) -> Self {
        let mut inputs = Self::new();
        for metric in ALL_METRICS.iter().copied() {
            inputs.set(metric, MetricInput {
                value: values.get(metric),
                not_available: values.get(metric).is_none(),
            });
        }
        inputs
    }

    pub fn set(&mut self, metric: Metric, input: MetricInput) {
        self.0.insert(metric, input);
    }

    pub fn with(mut self, metric: Metric, input: MetricInput) -> Self {
        self.set(metric, input);
        self
    }

    pub fn get(&self, metric: Metric) -> MetricInput {
        self.0.get(&metric).copied().unwrap_or_default()
    }

    pub fn resolve(&self) -> ServiceResult<MetricValues> {
        let mut values = MetricValues::default();
        for metric in ALL_METRICS.iter().copied() {
            let value = match self.get(metric).resolve() {
                Some(x) => Some(metric.coerce(x)?),
                None => None,
            };
            values.set(metric, value);
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Full site name as shown in the registry.
    pub site: String,
    pub date: NaiveDate,
    pub metrics: MetricInputs,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Inserted(IdType),
    Updated(IdType),
}

impl Outcome {
    pub fn id(&self) -> IdType {
        match self {
            Outcome::Inserted(id) | Outcome::Updated(id) => *id,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Outcome::Updated(_))
    }

    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Inserted(_) => "Data saved successfully!",
            Outcome::Updated(_) => "Data updated successfully!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistingRecord {
    /// Most recently created match.
    pub record: Measurement,
    /// Older matches for the same site and date, newest first.
    pub duplicate_ids: Vec<IdType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum, Serialize, Deserialize)]
pub enum FormMode {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
pub struct FormField {
    pub metric: Metric,
    pub title: String,
    pub unit: String,
    pub value: Option<f64>,
    pub not_available: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, juniper::GraphQLObject)]
pub struct EntryForm {
    pub site: String,
    pub date: NaiveDate,
    pub mode: FormMode,
    pub existing_id: Option<IdType>,
    pub fields: Vec<FormField>,
    pub notes: String,
    pub duplicate_ids: Vec<IdType>,
}

impl EntryForm {
    fn build(site: &str, date: NaiveDate, existing: Option<&ExistingRecord>) -> EntryForm {
        let (inputs, notes) = match existing {
            Some(x) => (MetricInputs::from_values(&x.record.metrics()), x.record.notes.clone()),
            None => (MetricInputs::new(), String::new()),
        };

        let fields = ALL_METRICS.iter()
            .map(|metric| {
                let input = inputs.get(*metric);
                let (min, max) = metric.range();
                FormField {
                    metric: *metric,
                    title: metric.title().to_string(),
                    unit: metric.unit().to_string(),
                    value: input.value,
                    not_available: input.not_available,
                    min,
                    max,
                }
            })
            .collect();

        EntryForm {
            site: site.to_string(),
            date,
            mode: if existing.is_some() { FormMode::Update } else { FormMode::Create },
            existing_id: existing.map(|x| x.record.id),
            fields,
            notes,
            duplicate_ids: existing.map(|x| x.duplicate_ids.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum FormState {
    #[default]
    Idle,
    PointSelected { site: String, date: NaiveDate },
    Editing { site: String, date: NaiveDate, existing_id: Option<IdType> },
    Submitted { site: String, date: NaiveDate, outcome: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
pub enum EntryPhase {
    Idle,
    PointSelected,
    Editing,
    Submitted,
}

/// Per-session workflow state:
/// `Idle -> PointSelected -> Editing -> Submitted -> Idle`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryState {
    pub form: FormState,
    /// Record armed by a first delete request, deleted by the second.
    pub pending_delete: Option<IdType>,
}

impl EntryState {
    pub fn phase(&self) -> EntryPhase {
        match self.form {
            FormState::Idle => EntryPhase::Idle,
            FormState::PointSelected { .. } => EntryPhase::PointSelected,
            FormState::Editing { .. } => EntryPhase::Editing,
            FormState::Submitted { .. } => EntryPhase::Submitted,
        }
    }

    pub fn site(&self) -> Option<&str> {
        match &self.form {
            FormState::Idle => None,
            FormState::PointSelected { site, .. }
            | FormState::Editing { site, .. }
            | FormState::Submitted { site, .. } => Some(site.as_str()),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match &self.form {
            FormState::Idle => None,
            FormState::PointSelected { date, .. }
            | FormState::Editing { date, .. }
            | FormState::Submitted { date, .. } => Some(*date),
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match &self.form {
            FormState::Submitted { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }

    pub fn select_point(&mut self, site: String, date: NaiveDate) -> ServiceResult<()> {
        if let FormState::Editing { .. } = self.form {
            return Err(ServiceError::BadRequest("An entry form is open, submit or reset it first".to_string()));
        }
        self.form = FormState::PointSelected { site, date };
        Ok(())
    }

    pub fn open(&mut self, site: String, date: NaiveDate, existing_id: Option<IdType>) {
        self.form = FormState::Editing { site, date, existing_id };
    }

    /// The record id the open form writes to, if the form matches `site` and `date`.
    pub fn editing_target(&self, site: &str, date: NaiveDate) -> ServiceResult<Option<IdType>> {
        match &self.form {
            FormState::Editing { site: s, date: d, existing_id } if s == site && *d == date => Ok(*existing_id),
            _ => Err(ServiceError::BadRequest("No entry form is open for this site and date".to_string())),
        }
    }

    pub fn submitted(&mut self, outcome: Outcome) -> ServiceResult<()> {
        match std::mem::take(&mut self.form) {
            FormState::Editing { site, date, .. } => {
                self.form = FormState::Submitted { site, date, outcome };
                Ok(())
            }
            other => {
                self.form = other;
                Err(ServiceError::BadRequest("No entry form is open".to_string()))
            }
        }
    }

    pub fn acknowledge(&mut self) -> ServiceResult<()> {
        match self.form {
            FormState::Submitted { .. } => {
                self.form = FormState::Idle;
                Ok(())
            }
            _ => Err(ServiceError::BadRequest("Nothing to acknowledge".to_string())),
        }
    }

    pub fn reset(&mut self) {
        self.form = FormState::Idle;
    }
}

/// A record with its display names.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementView {
    pub record: Measurement,
    pub site_name: String,
    pub short_name: String,
}

impl MeasurementView {
    pub fn new(record: Measurement, listing: &SiteListing) -> Self {
        MeasurementView {
            site_name: full_name_for(&record.site),
            short_name: listing.short_name_for(&record.site),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub site: String,
    pub date: NaiveDate,
    /// Newest first, the first one is the record forms edit.
    pub records: Vec<MeasurementView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
pub enum DeleteStep {
    ConfirmRequired,
    Deleted,
}

#[derive(Clone)]
pub struct EntryController {
    backend: Arc<dyn Backend>,
    registry: SiteRegistry,
    cache: MeasurementCache,
}

impl EntryController {
    pub fn new(backend: Arc<dyn Backend>, registry: SiteRegistry, cache: MeasurementCache) -> Self {
        EntryController { backend, registry, cache }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn resolve_existing(&self, site_full_name: &str, date: NaiveDate) -> ServiceResult<Option<ExistingRecord>> {
        let mut rows = self.backend
            .select_measurements(&MeasurementFilter::at(storage_spellings(site_full_name), date))?
            .into_iter();

        let record = match rows.next() {
            None => return Ok(None),
            Some(x) => x,
        };
        let duplicate_ids: Vec<IdType> = rows.map(|x| x.id).collect();
        if !duplicate_ids.is_empty() {
            log::warn!("{} records for {} on {}, editing #{} (older: {:?})",
                       duplicate_ids.len() + 1, site_full_name, date, record.id, duplicate_ids);
        }

        Ok(Some(ExistingRecord { record, duplicate_ids }))
    }

    pub fn open_form(&self, site: &str, date: NaiveDate) -> ServiceResult<EntryForm> {
        let site = required_site(site)?;
        let existing = self.resolve_existing(site, date)?;
        Ok(EntryForm::build(site, date, existing.as_ref()))
    }

    /// Inserts or updates a single record, `existing_id` comes from `resolve_existing`.
    pub fn submit(
        &self,
        listing: &SiteListing,
        submission: &Submission,
        user_id: Uuid,
        existing_id: Option<IdType>,
    ) -> ServiceResult<Outcome> {
        let site = required_site(&submission.site)?;
        if !listing.is_known(site) {
            return Err(ServiceError::BadRequest(format!("Unknown site '{}'", site)));
        }
        let metrics = submission.metrics.resolve()?;

        let data = MeasurementWrite::new(storage_token(site), submission.date, &metrics, submission.notes.clone(), user_id);
        let outcome = match existing_id {
            Some(id) => Outcome::Updated(self.backend.update_measurement(id, &data)?.id),
            None => Outcome::Inserted(self.backend.insert_measurement(&data)?.id),
        };
        self.cache.invalidate();

        log::info!("{:?} for {} on {}", outcome, site, submission.date);
        Ok(outcome)
    }

    pub fn open_entry(&self, state: &mut EntryState, site: &str, date: NaiveDate) -> ServiceResult<EntryForm> {
        let form = self.open_form(site, date)?;
        state.open(form.site.clone(), date, form.existing_id);
        Ok(form)
    }

    pub fn submit_entry(
        &self,
        state: &mut EntryState,
        listing: &SiteListing,
        submission: &Submission,
        user_id: Uuid,
    ) -> ServiceResult<Outcome> {
        let existing_id = state.editing_target(submission.site.trim(), submission.date)?;
        let outcome = self.submit(listing, submission, user_id, existing_id)?;
        state.submitted(outcome)?;
        Ok(outcome)
    }

    pub fn measurements(&self) -> ServiceResult<Arc<Vec<Measurement>>> {
        self.cache.get_or_load(self.backend.as_ref())
    }

    pub fn list_entries(&self, listing: &SiteListing) -> ServiceResult<Vec<MeasurementView>> {
        Ok(self.backend
            .select_measurements(&MeasurementFilter::all(MeasurementOrder::ByDateDesc))?
            .into_iter()
            .map(|x| MeasurementView::new(x, listing))
            .collect())
    }

    pub fn duplicate_entries(&self, listing: &SiteListing) -> ServiceResult<Vec<DuplicateGroup>> {
        let rows = self.backend.select_measurements(&MeasurementFilter::all(MeasurementOrder::NewestFirst))?;

        let mut groups: HashMap<(String, NaiveDate), Vec<Measurement>> = HashMap::new();
        for row in rows {
            groups.entry((full_name_for(&row.site), row.date)).or_default().push(row);
        }

        let mut duplicates: Vec<DuplicateGroup> = groups.into_iter()
            .filter(|(_, records)| records.len() > 1)
            .map(|((site, date), records)| DuplicateGroup {
                site,
                date,
                records: records.into_iter().map(|x| MeasurementView::new(x, listing)).collect(),
            })
            .collect();
        duplicates.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.site.cmp(&b.site)));
        Ok(duplicates)
    }

    /// Rewrites a record in place, ownership stays with the original submitter.
    pub fn admin_update(&self, listing: &SiteListing, id: IdType, submission: &Submission) -> ServiceResult<Measurement> {
        let current = self.backend.find_measurement(id)?
            .ok_or_else(|| ServiceError::NotFound("Entry".to_string()))?;

        let site = required_site(&submission.site)?;
        if !listing.is_known(site) {
            return Err(ServiceError::BadRequest(format!("Unknown site '{}'", site)));
        }
        let metrics = submission.metrics.resolve()?;

        let data = MeasurementWrite::new(storage_token(site), submission.date, &metrics, submission.notes.clone(), current.user_id);
        let record = self.backend.update_measurement(id, &data)?;
        self.cache.invalidate();
        Ok(record)
    }

    /// First call arms the deletion, a second call with the same id performs it.
    pub fn admin_delete(&self, state: &mut EntryState, id: IdType) -> ServiceResult<DeleteStep> {
        if state.pending_delete == Some(id) {
            state.pending_delete = None;
            if !self.backend.delete_measurement(id)? {
                return Err(ServiceError::NotFound("Entry".to_string()));
            }
            self.cache.invalidate();
            log::info!("Deleted entry #{}", id);
            return Ok(DeleteStep::Deleted);
        }

        if self.backend.find_measurement(id)?.is_none() {
            return Err(ServiceError::NotFound("Entry".to_string()));
        }
        state.pending_delete = Some(id);
        Ok(DeleteStep::ConfirmRequired)
    }
}

fn required_site(site: &str) -> ServiceResult<&str> {
    let site = site.trim();
    if site.is_empty() {
        Err(ServiceError::BadRequest("Please select a site".to_string()))
    } else {
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Table};

    const BLUE: &str = "Blue River at Silverthorne Pavilion- 196";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn setup() -> (Arc<MemoryBackend>, EntryController, SiteListing) {
        let backend = Arc::new(MemoryBackend::with_default_sites());
        let registry = SiteRegistry::new(backend.clone());
        let listing = registry.list_sites();
        let controller = EntryController::new(backend.clone(), registry, MeasurementCache::new());
        (backend, controller, listing)
    }

    fn submission(site: &str, inputs: MetricInputs) -> Submission {
        Submission { site: site.to_string(), date: date(1), metrics: inputs, notes: String::new() }
    }

    #[test]
    fn not_available_overrides_staged_value() {
        let input = MetricInput { value: Some(0.0), not_available: true };
        assert_eq!(input.resolve(), None);
        assert_eq!(MetricInput::value(0.0).resolve(), Some(0.0));

        let inputs = MetricInputs::new()
            .with(Metric::Ph, MetricInput { value: Some(99.0), not_available: true })
            .with(Metric::Flow, MetricInput::value(0.0));
        let values = inputs.resolve().unwrap();
        assert_eq!(values.ph, None);
        assert_eq!(values.flow, Some(0.0));
        assert_eq!(values.hardness, None);
    }

    #[test]
    fn full_name_rows_of_legacy_sites_are_found() {
        let (backend, controller, listing) = setup();
        let mut metrics = MetricValues::default();
        metrics.flow = Some(2.0);
        let older = backend.insert_measurement(&MeasurementWrite::new("Site 1".to_string(), date(1), &metrics, String::new(), Uuid::nil())).unwrap();
        let newer = backend.insert_measurement(&MeasurementWrite::new(BLUE.to_string(), date(1), &metrics, String::new(), Uuid::nil())).unwrap();

        let existing = controller.resolve_existing(BLUE, date(1)).unwrap().unwrap();
        assert_eq!(existing.record.id, newer.id);
        assert_eq!(existing.duplicate_ids, vec![older.id]);

        let groups = controller.duplicate_entries(&listing).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].site, BLUE);
        let ids: Vec<IdType> = groups[0].records.iter().map(|x| x.record.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        let inputs = MetricInputs::new().with(Metric::Flow, MetricInput::value(3.0));
        controller.submit(&listing, &submission(BLUE, inputs), Uuid::nil(), Some(existing.record.id)).unwrap();
        assert_eq!(backend.measurement_count(), 2);
    }

    #[test]
    fn out_of_range_is_rejected_before_writing() {
        let (backend, controller, listing) = setup();
        let inputs = MetricInputs::new().with(Metric::Ph, MetricInput::value(15.0));
        assert!(controller.submit(&listing, &submission(BLUE, inputs), Uuid::nil(), None).is_err());
        assert_eq!(backend.measurement_count(), 0);
    }

    #[test]
    fn insert_then_update_same_record() {
        let (backend, controller, listing) = setup();
        let inputs = MetricInputs::new().with(Metric::DissolvedOxygenMg, MetricInput::value(8.5));

        assert!(controller.resolve_existing(BLUE, date(1)).unwrap().is_none());
        let first = controller.submit(&listing, &submission(BLUE, inputs.clone()), Uuid::nil(), None).unwrap();
        assert!(!first.is_update());

        let existing = controller.resolve_existing(BLUE, date(1)).unwrap().unwrap();
        assert_eq!(existing.record.site, "Site 1");
        assert_eq!(existing.record.dissolved_oxygen_mg, Some(8.5));
        assert_eq!(existing.record.ph, None);

        let second = controller.submit(&listing, &submission(BLUE, inputs), Uuid::nil(), Some(existing.record.id)).unwrap();
        assert_eq!(second, Outcome::Updated(first.id()));
        assert_eq!(backend.measurement_count(), 1);
    }

    #[test]
    fn newest_duplicate_wins() {
        let (backend, controller, listing) = setup();
        let snake = "Snake River KSS- 52";
        let older = controller.submit(&listing, &submission(snake, MetricInputs::new()), Uuid::nil(), None).unwrap();
        let newer = controller.submit(&listing, &submission(snake, MetricInputs::new()), Uuid::nil(), None).unwrap();
        assert_eq!(backend.measurement_count(), 2);

        let existing = controller.resolve_existing(snake, date(1)).unwrap().unwrap();
        assert_eq!(existing.record.id, newer.id());
        assert_eq!(existing.duplicate_ids, vec![older.id()]);

        let groups = controller.duplicate_entries(&listing).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].site, snake);
        assert_eq!(groups[0].records[0].record.id, newer.id());
        assert_eq!(groups[0].records[0].short_name, "Snake River");
    }

    #[test]
    fn unknown_site_is_rejected() {
        let (_, controller, listing) = setup();
        let result = controller.submit(&listing, &submission("Mystery Creek", MetricInputs::new()), Uuid::nil(), None);
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        let result = controller.submit(&listing, &submission("  ", MetricInputs::new()), Uuid::nil(), None);
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn backend_failure_is_reported() {
        let (backend, controller, listing) = setup();
        backend.set_unavailable(Table::Measurements, true);
        assert!(matches!(controller.open_form(BLUE, date(1)), Err(ServiceError::BackendUnavailable(_))));
        let result = controller.submit(&listing, &submission(BLUE, MetricInputs::new()), Uuid::nil(), None);
        assert!(matches!(result, Err(ServiceError::BackendUnavailable(_))));
    }

    #[test]
    fn form_is_prepopulated() {
        let (_, controller, listing) = setup();
        let inputs = MetricInputs::new()
            .with(Metric::Temperature, MetricInput::value(0.0))
            .with(Metric::Ph, MetricInput::value(7.1));
        controller.submit(&listing, &submission(BLUE, inputs), Uuid::nil(), None).unwrap();

        let form = controller.open_form(BLUE, date(1)).unwrap();
        assert_eq!(form.mode, FormMode::Update);
        let field = |metric| form.fields.iter().find(|x| x.metric == metric).unwrap();
        assert_eq!(field(Metric::Temperature).value, Some(0.0));
        assert!(!field(Metric::Temperature).not_available);
        assert!(field(Metric::Flow).not_available);

        let empty = controller.open_form(BLUE, date(2)).unwrap();
        assert_eq!(empty.mode, FormMode::Create);
        assert!(empty.fields.iter().all(|x| x.value.is_none() && !x.not_available));
    }

    #[test]
    fn state_transitions() {
        let mut state = EntryState::default();
        assert_eq!(state.phase(), EntryPhase::Idle);
        assert!(state.acknowledge().is_err());
        assert!(state.submitted(Outcome::Inserted(1)).is_err());
        assert_eq!(state.phase(), EntryPhase::Idle);

        state.select_point(BLUE.to_string(), date(1)).unwrap();
        assert_eq!(state.phase(), EntryPhase::PointSelected);
        state.open(BLUE.to_string(), date(1), None);
        assert!(state.select_point(BLUE.to_string(), date(2)).is_err());
        assert!(state.editing_target(BLUE, date(2)).is_err());
        assert_eq!(state.editing_target(BLUE, date(1)).unwrap(), None);

        state.submitted(Outcome::Inserted(3)).unwrap();
        assert_eq!(state.outcome(), Some(Outcome::Inserted(3)));
        state.acknowledge().unwrap();
        assert_eq!(state, EntryState::default());
    }

    #[test]
    fn session_flow_requires_open_form() {
        let (_, controller, listing) = setup();
        let mut state = EntryState::default();
        let sub = submission(BLUE, MetricInputs::new());
        assert!(controller.submit_entry(&mut state, &listing, &sub, Uuid::nil()).is_err());

        controller.open_entry(&mut state, BLUE, date(1)).unwrap();
        let outcome = controller.submit_entry(&mut state, &listing, &sub, Uuid::nil()).unwrap();
        assert_eq!(state.phase(), EntryPhase::Submitted);
        assert_eq!(outcome.message(), "Data saved successfully!");
    }

    #[test]
    fn delete_needs_confirmation() {
        let (backend, controller, listing) = setup();
        let a = controller.submit(&listing, &submission(BLUE, MetricInputs::new()), Uuid::nil(), None).unwrap().id();
        let mut b_sub = submission(BLUE, MetricInputs::new());
        b_sub.date = date(2);
        let b = controller.submit(&listing, &b_sub, Uuid::nil(), None).unwrap().id();

        let mut state = EntryState::default();
        assert_eq!(controller.admin_delete(&mut state, a).unwrap(), DeleteStep::ConfirmRequired);
        assert_eq!(controller.admin_delete(&mut state, b).unwrap(), DeleteStep::ConfirmRequired);
        assert_eq!(backend.measurement_count(), 2);
        assert_eq!(controller.admin_delete(&mut state, b).unwrap(), DeleteStep::Deleted);
        assert_eq!(backend.measurement_count(), 1);
        assert!(matches!(controller.admin_delete(&mut state, b), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn admin_update_keeps_owner() {
        let (_, controller, listing) = setup();
        let owner = Uuid::new_v4();
        let id = controller.submit(&listing, &submission(BLUE, MetricInputs::new()), owner, None).unwrap().id();

        let mut changed = submission("Swan River Reach A- 1007", MetricInputs::new().with(Metric::Hardness, MetricInput::value(40.0)));
        changed.notes = "moved".to_string();
        let record = controller.admin_update(&listing, id, &changed).unwrap();
        assert_eq!(record.site, "Site 3");
        assert_eq!(record.user_id, owner);
        assert_eq!(record.hardness, Some(40.0));
        assert_eq!(record.notes, "moved");
    }

    #[test]
    fn cache_sees_writes() {
        let (_, controller, listing) = setup();
        assert!(controller.measurements().unwrap().is_empty());
        controller.submit(&listing, &submission(BLUE, MetricInputs::new()), Uuid::nil(), None).unwrap();
        assert_eq!(controller.measurements().unwrap().len(), 1);
    }
}
