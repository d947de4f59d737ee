use std::cell::{OnceCell, RefCell};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use juniper::{graphql_object, DefaultScalarValue, EmptySubscription, RootNode};
use uuid::Uuid;

use crate::AppData;
use crate::chart::{identify_point, render_all, render_series, Chart, PointSelection};
use crate::entry::{DeleteStep, DuplicateGroup, EntryForm, EntryPhase, EntryState, MeasurementView, MetricInput, MetricInputs, Outcome, Submission};
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{AdminGrant, GrantStatus, IdType, Metric, Site, SiteInput, User};
use crate::security::{views_for, AdminRoster, PermissionCheckable, View};
use crate::sites::{SiteListing, SiteSource};

pub struct Context {
    pub app: Arc<AppData>,
    pub identity: RefCell<Option<String>>,
    user: RefCell<Option<User>>,
    pub entry_state: RefCell<EntryState>,
    sites: OnceCell<SiteListing>,
}

impl Context {
    pub fn new(
        app_data: Arc<AppData>,
        original_identity: Option<String>,
        original_user: Option<User>,
        entry_state: EntryState,
    ) -> Context {
        Context {
            app: app_data,
            identity: RefCell::new(original_identity),
            user: RefCell::new(original_user),
            entry_state: RefCell::new(entry_state),
            sites: OnceCell::new(),
        }
    }

    pub fn get_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    pub fn get_user_required(&self) -> ServiceResult<User> {
        self.get_user().ok_or(ServiceError::LoginRequired)
    }

    pub fn get_admin_required(&self) -> ServiceResult<User> {
        let user = self.get_user_required()?;
        user.ensure_admin(&self.app.auth)?;
        Ok(user)
    }

    pub fn is_admin(&self) -> bool {
        self.user.borrow().as_ref()
            .map_or(false, |x| self.app.auth.is_admin(&x.email))
    }

    /// Switching identity also drops the entry workflow of the previous one.
    pub fn save_user(&self, user: Option<User>) -> ServiceResult<()> {
        if let Some(user) = user {
            let id_str = self.app.auth.save_identity(&user)?;
            self.identity.replace(Some(id_str));
            self.user.replace(Some(user));
        } else {
            self.identity.replace(None);
            self.user.replace(None);
        }
        self.entry_state.replace(EntryState::default());
        Ok(())
    }

    /// Read once per request.
    pub fn sites(&self) -> &SiteListing {
        self.sites.get_or_init(|| self.app.registry.list_sites())
    }

    pub fn into_session(self) -> (Option<String>, EntryState) {
        (self.identity.into_inner(), self.entry_state.into_inner())
    }
}

impl juniper::Context for Context {}

#[graphql_object(context = Context, scalar = DefaultScalarValue, description = "An user account")]
impl User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn email(&self) -> &str {
        self.email.as_str()
    }

    fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    fn is_admin(&self, ctx: &Context) -> bool {
        ctx.app.auth.is_admin(&self.email)
    }
}

#[derive(juniper::GraphQLObject)]
#[graphql(context = Context, scalar = DefaultScalarValue)]
pub struct Viewer {
    pub user: Option<User>,
    pub is_admin: bool,
    pub views: Vec<View>,
}

#[graphql_object(context = Context, scalar = DefaultScalarValue)]
impl SiteListing {
    fn source(&self) -> SiteSource {
        self.source
    }

    fn sites(&self) -> Vec<Site> {
        self.sites.clone()
    }

    /// Sites cannot be edited while only the built-in list is available
    fn editable(&self) -> bool {
        self.source == SiteSource::Live
    }
}

#[graphql_object(context = Context, scalar = DefaultScalarValue, name = "Entry", description = "A water quality observation")]
impl MeasurementView {
    fn id(&self) -> IdType {
        self.record.id
    }

    /// Full site name, legacy tokens are resolved.
    fn site(&self) -> &str {
        self.site_name.as_str()
    }

    fn short_name(&self) -> &str {
        self.short_name.as_str()
    }

    fn date(&self) -> NaiveDate {
        self.record.date
    }

    fn dissolved_oxygen_mg(&self) -> Option<f64> {
        self.record.dissolved_oxygen_mg
    }

    fn dissolved_oxygen_sat(&self) -> Option<f64> {
        self.record.dissolved_oxygen_sat
    }

    fn hardness(&self) -> Option<f64> {
        self.record.hardness
    }

    fn alkalinity(&self) -> Option<f64> {
        self.record.alkalinity
    }

    fn ph(&self) -> Option<f64> {
        self.record.ph
    }

    fn temperature(&self) -> Option<f64> {
        self.record.temperature
    }

    fn flow(&self) -> Option<f64> {
        self.record.flow
    }

    fn value(&self, metric: Metric) -> Option<f64> {
        self.record.value(metric)
    }

    fn notes(&self) -> &str {
        self.record.notes.as_str()
    }

    fn user_id(&self) -> Uuid {
        self.record.user_id
    }

    fn created_at(&self) -> NaiveDateTime {
        self.record.created_at
    }
}

#[graphql_object(context = Context, scalar = DefaultScalarValue)]
impl DuplicateGroup {
    fn site(&self) -> &str {
        self.site.as_str()
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    /// Newest first
    fn records(&self) -> Vec<MeasurementView> {
        self.records.clone()
    }

    /// The record the entry form edits.
    fn kept_id(&self) -> Option<IdType> {
        self.records.first().map(|x| x.record.id)
    }
}

#[graphql_object(context = Context, scalar = DefaultScalarValue, name = "AdminGrant")]
impl AdminGrant {
    fn id(&self) -> IdType {
        self.id
    }

    fn email(&self) -> &str {
        self.email.as_str()
    }

    fn status(&self) -> Option<GrantStatus> {
        self.grant_status()
    }

    fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    fn approved_at(&self) -> Option<NaiveDateTime> {
        self.approved_at
    }
}

#[graphql_object(context = Context, scalar = DefaultScalarValue)]
impl AdminRoster {
    /// Configured admin, always privileged.
    fn bootstrap(&self) -> Option<&str> {
        self.bootstrap.as_deref()
    }

    fn grants(&self) -> Vec<AdminGrant> {
        self.grants.clone()
    }
}

#[derive(juniper::GraphQLObject)]
pub struct SubmitResult {
    pub id: IdType,
    pub updated: bool,
    pub message: String,
}

impl From<Outcome> for SubmitResult {
    fn from(outcome: Outcome) -> Self {
        SubmitResult {
            id: outcome.id(),
            updated: outcome.is_update(),
            message: outcome.message().to_string(),
        }
    }
}

#[derive(juniper::GraphQLObject)]
pub struct EntryStatus {
    pub phase: EntryPhase,
    pub site: Option<String>,
    pub date: Option<NaiveDate>,
    pub outcome: Option<SubmitResult>,
    pub pending_delete: Option<IdType>,
}

impl From<&EntryState> for EntryStatus {
    fn from(state: &EntryState) -> Self {
        EntryStatus {
            phase: state.phase(),
            site: state.site().map(str::to_string),
            date: state.date(),
            outcome: state.outcome().map(SubmitResult::from),
            pending_delete: state.pending_delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
pub enum SelectionStatus {
    Single,
    Ambiguous,
    NoData,
}

#[derive(juniper::GraphQLObject)]
pub struct PointSelectionResult {
    pub status: SelectionStatus,
    pub date: NaiveDate,
    /// Set when the point belongs to exactly one site.
    pub site: Option<String>,
    /// Sites to choose from when the date is shared.
    pub candidates: Vec<String>,
}

#[derive(juniper::GraphQLInputObject)]
pub struct AuthInput {
    pub email: String,
    pub password: String,
}

#[derive(juniper::GraphQLInputObject)]
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(juniper::GraphQLInputObject)]
pub struct MetricFieldInput {
    pub metric: Metric,
    pub value: Option<f64>,
    /// Stores NULL whatever the value.
    pub not_available: Option<bool>,
}

#[derive(juniper::GraphQLInputObject)]
pub struct EntryInput {
    pub site: String,
    pub date: NaiveDate,
    pub metrics: Vec<MetricFieldInput>,
    pub notes: Option<String>,
}

impl From<EntryInput> for Submission {
    fn from(input: EntryInput) -> Self {
        let mut metrics = MetricInputs::new();
        for field in input.metrics {
            let input = match (field.not_available.unwrap_or(false), field.value) {
                (true, _) => MetricInput::not_available(),
                (false, Some(value)) => MetricInput::value(value),
                (false, None) => MetricInput::default(),
            };
            metrics.set(field.metric, input);
        }
        Submission {
            site: input.site.trim().to_string(),
            date: input.date,
            metrics,
            notes: input.notes.unwrap_or_default(),
        }
    }
}

fn load_charts(ctx: &Context) -> ServiceResult<Vec<Chart>> {
    let records = ctx.app.entries.measurements()?;
    let selectable = ctx.is_admin();
    let mut charts = render_all(&records, ctx.sites(), &ctx.app.gap_policy);
    for chart in charts.iter_mut() {
        chart.selectable = selectable;
    }
    Ok(charts)
}

pub struct QueryRoot;

#[graphql_object(context = Context, scalar = DefaultScalarValue)]
impl QueryRoot {
    fn api_version() -> &'static str {
        "1.0"
    }

    fn viewer(ctx: &Context) -> Viewer {
        let user = ctx.get_user();
        let is_admin = ctx.is_admin();
        Viewer {
            views: views_for(user.is_some(), is_admin),
            user,
            is_admin,
        }
    }

    fn sites(ctx: &Context) -> SiteListing {
        ctx.sites().clone()
    }

    fn site_details(ctx: &Context, full_name: String) -> Option<Site> {
        ctx.sites().find(&full_name).cloned()
    }

    fn charts(ctx: &Context) -> ServiceResult<Vec<Chart>> {
        load_charts(ctx)
    }

    fn chart(ctx: &Context, metric: Metric) -> ServiceResult<Chart> {
        let records = ctx.app.entries.measurements()?;
        let mut chart = render_series(&records, metric, ctx.sites(), &ctx.app.gap_policy);
        chart.selectable = ctx.is_admin();
        Ok(chart)
    }

    fn entry_state(ctx: &Context) -> ServiceResult<EntryStatus> {
        ctx.get_user_required()?;
        Ok(EntryStatus::from(&*ctx.entry_state.borrow()))
    }

    /// Preview of the form for a site and date, the workflow state is untouched.
    fn entry_form(ctx: &Context, site: String, date: NaiveDate) -> ServiceResult<EntryForm> {
        ctx.get_user_required()?;
        ctx.app.entries.open_form(&site, date)
    }

    fn entries(ctx: &Context) -> ServiceResult<Vec<MeasurementView>> {
        ctx.get_admin_required()?;
        ctx.app.entries.list_entries(ctx.sites())
    }

    fn duplicate_entries(ctx: &Context) -> ServiceResult<Vec<DuplicateGroup>> {
        ctx.get_admin_required()?;
        ctx.app.entries.duplicate_entries(ctx.sites())
    }

    fn admins(ctx: &Context) -> ServiceResult<AdminRoster> {
        let user = ctx.get_user_required()?;
        ctx.app.auth.list_admins(&user)
    }
}

pub struct MutationRoot;

#[graphql_object(context = Context, scalar = DefaultScalarValue)]
impl MutationRoot {
    fn sign_up(ctx: &Context, data: SignUpInput) -> ServiceResult<User> {
        ctx.app.auth.sign_up(&data.email, &data.password, &data.confirm_password)
    }

    fn login(ctx: &Context, data: AuthInput) -> ServiceResult<User> {
        let user = ctx.app.auth.sign_in(&data.email, &data.password)?;
        ctx.save_user(Some(user.clone()))?;
        Ok(user)
    }

    fn logout(ctx: &Context) -> ServiceResult<bool> {
        ctx.save_user(None)?;
        Ok(true)
    }

    /// Admins click a plotted sample, a shared date asks for an explicit choice.
    fn select_point(ctx: &Context, metric: Metric, date: NaiveDate) -> ServiceResult<PointSelectionResult> {
        ctx.get_admin_required()?;
        let records = ctx.app.entries.measurements()?;

        let result = match identify_point(&records, metric, date, ctx.sites(), &ctx.app.gap_policy) {
            PointSelection::Single { site, date } => {
                ctx.entry_state.borrow_mut().select_point(site.clone(), date)?;
                PointSelectionResult { status: SelectionStatus::Single, date, site: Some(site), candidates: vec![] }
            }
            PointSelection::Ambiguous { date, candidates } => {
                PointSelectionResult { status: SelectionStatus::Ambiguous, date, site: None, candidates }
            }
            PointSelection::NoData => {
                PointSelectionResult { status: SelectionStatus::NoData, date, site: None, candidates: vec![] }
            }
        };
        Ok(result)
    }

    /// Settles an ambiguous selection, only the offered candidates are accepted.
    fn choose_point(ctx: &Context, metric: Metric, site: String, date: NaiveDate) -> ServiceResult<EntryStatus> {
        ctx.get_admin_required()?;
        let site = site.trim();
        let records = ctx.app.entries.measurements()?;
        let offered = match identify_point(&records, metric, date, ctx.sites(), &ctx.app.gap_policy) {
            PointSelection::Single { site, .. } => vec![site],
            PointSelection::Ambiguous { candidates, .. } => candidates,
            PointSelection::NoData => vec![],
        };
        if !offered.iter().any(|x| x == site) {
            return Err(ServiceError::BadRequest("No plotted sample for this site and date".to_string()));
        }

        let mut state = ctx.entry_state.borrow_mut();
        state.select_point(site.to_string(), date)?;
        Ok(EntryStatus::from(&*state))
    }

    /// Site and date default to the selected point.
    fn open_entry_form(ctx: &Context, site: Option<String>, date: Option<NaiveDate>) -> ServiceResult<EntryForm> {
        ctx.get_user_required()?;
        let mut state = ctx.entry_state.borrow_mut();

        let site = site.or_else(|| state.site().map(str::to_string));
        let date = date.or_else(|| state.date());
        let (site, date) = match (site, date) {
            (Some(site), Some(date)) => (site, date),
            _ => return Err(ServiceError::BadRequest("Please select a site and a date".to_string())),
        };

        ctx.app.entries.open_entry(&mut state, &site, date)
    }

    fn submit_entry(ctx: &Context, input: EntryInput) -> ServiceResult<SubmitResult> {
        let user = ctx.get_user_required()?;
        let submission = Submission::from(input);
        let mut state = ctx.entry_state.borrow_mut();
        let outcome = ctx.app.entries.submit_entry(&mut state, ctx.sites(), &submission, user.id)?;
        Ok(outcome.into())
    }

    fn acknowledge_submission(ctx: &Context) -> ServiceResult<EntryStatus> {
        ctx.get_user_required()?;
        let mut state = ctx.entry_state.borrow_mut();
        state.acknowledge()?;
        Ok(EntryStatus::from(&*state))
    }

    fn reset_entry(ctx: &Context) -> ServiceResult<EntryStatus> {
        ctx.get_user_required()?;
        let mut state = ctx.entry_state.borrow_mut();
        state.reset();
        Ok(EntryStatus::from(&*state))
    }

    fn update_entry(ctx: &Context, id: IdType, input: EntryInput) -> ServiceResult<MeasurementView> {
        ctx.get_admin_required()?;
        let record = ctx.app.entries.admin_update(ctx.sites(), id, &Submission::from(input))?;
        Ok(MeasurementView::new(record, ctx.sites()))
    }

    /// Call twice with the same id to delete.
    fn delete_entry(ctx: &Context, id: IdType) -> ServiceResult<DeleteStep> {
        ctx.get_admin_required()?;
        let mut state = ctx.entry_state.borrow_mut();
        ctx.app.entries.admin_delete(&mut state, id)
    }

    fn add_site(ctx: &Context, data: SiteInput) -> ServiceResult<Site> {
        ctx.get_admin_required()?;
        ctx.app.registry.add_site(&data)
    }

    fn update_site(ctx: &Context, id: IdType, data: SiteInput) -> ServiceResult<Site> {
        ctx.get_admin_required()?;
        ctx.app.registry.update_site(id, &data)
    }

    fn delete_site(ctx: &Context, id: IdType) -> ServiceResult<bool> {
        ctx.get_admin_required()?;
        ctx.app.registry.delete_site(id)?;
        Ok(true)
    }

    fn create_admin(ctx: &Context, data: SignUpInput) -> ServiceResult<AdminGrant> {
        let user = ctx.get_user_required()?;
        ctx.app.auth.create_admin_account(&user, &data.email, &data.password, &data.confirm_password)
    }

    fn grant_admin(ctx: &Context, email: String) -> ServiceResult<AdminGrant> {
        let user = ctx.get_user_required()?;
        ctx.app.auth.grant_admin(&user, &email)
    }

    fn revoke_admin(ctx: &Context, id: IdType) -> ServiceResult<AdminGrant> {
        let user = ctx.get_user_required()?;
        ctx.app.auth.revoke_admin(&user, id)
    }
}

pub type Schema = RootNode<'static, QueryRoot, MutationRoot, EmptySubscription<Context>>;

pub fn create_schema() -> Schema {
    Schema::new(QueryRoot {}, MutationRoot {}, EmptySubscription::new())
}
