use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{Backend, GrantFilter};
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{AdminGrant, GrantStatus, GrantUpdate, IdType, NewGrant, User};

const MIN_PASSWORD_LEN: usize = 6;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> ServiceResult<()> {
    let valid = email.split_once('@')
        .map_or(false, |(name, domain)| !name.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(ServiceError::BadRequest("Please enter a valid email address".to_string()))
    }
}

fn check_new_password(password: &str, confirm: &str) -> ServiceResult<()> {
    if password != confirm {
        return Err(ServiceError::BadRequest("Passwords don't match!".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::BadRequest(format!("Password must be at least {} characters", MIN_PASSWORD_LEN)));
    }
    Ok(())
}

pub fn verify_hash(hash: &str, password: &str) -> bool {
    bcrypt::verify(password, hash)
        .unwrap_or_else(|err| {
            log::warn!("Unreadable password hash: {}", err);
            false
        })
}

/// Contents of the identity cookie.
#[derive(Debug, Serialize, Deserialize)]
struct SessionIdentity {
    id: Uuid,
    email: String,
}

/// Tabs of the dashboard, exposed according to the viewer's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
pub enum View {
    ViewData,
    EntryForm,
    DataEntries,
    ManageSites,
    ManageAdmins,
}

pub fn views_for(signed_in: bool, admin: bool) -> Vec<View> {
    let mut views = vec![View::ViewData];
    if signed_in {
        views.push(View::EntryForm);
    }
    if signed_in && admin {
        views.extend([View::DataEntries, View::ManageSites, View::ManageAdmins]);
    }
    views
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminRoster {
    pub bootstrap: Option<String>,
    pub grants: Vec<AdminGrant>,
}

#[derive(Clone)]
pub struct Authenticator {
    backend: Arc<dyn Backend>,
    bootstrap_admin: Option<String>,
    hash_cost: u32,
}

impl Authenticator {
    pub fn new(backend: Arc<dyn Backend>, bootstrap_admin: Option<String>, hash_cost: u32) -> Self {
        Authenticator {
            backend,
            bootstrap_admin: bootstrap_admin.map(|x| normalize_email(&x)),
            hash_cost,
        }
    }

    pub fn bootstrap_admin(&self) -> Option<&str> {
        self.bootstrap_admin.as_deref()
    }

    pub fn hash_password(&self, password: &str) -> ServiceResult<String> {
        Ok(bcrypt::hash(password, self.hash_cost)?)
    }

    pub fn sign_up(&self, email: &str, password: &str, confirm: &str) -> ServiceResult<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        check_new_password(password, confirm)?;

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: self.hash_password(password)?,
            created_at: Utc::now().naive_utc(),
        };
        let user = self.backend.insert_user(&user)?;
        log::info!("New account {}", user.email);
        Ok(user)
    }

    /// Unknown accounts and wrong passwords fail the same way.
    pub fn sign_in(&self, email: &str, password: &str) -> ServiceResult<User> {
        let user = match self.backend.find_user_by_email(&normalize_email(email))? {
            None => return Err(ServiceError::InvalidCredentials),
            Some(u) => u,
        };

        if !verify_hash(user.password_hash.as_str(), password) {
            Err(ServiceError::InvalidCredentials)
        } else {
            Ok(user)
        }
    }

    /// Never fails: an unreachable grants table only leaves the bootstrap admin.
    pub fn is_admin(&self, email: &str) -> bool {
        let email = normalize_email(email);
        if self.bootstrap_admin.as_deref() == Some(email.as_str()) {
            return true;
        }

        let filter = GrantFilter { email: Some(email), status: Some(GrantStatus::Approved) };
        match self.backend.select_grants(&filter) {
            Ok(grants) => grants.iter().any(|x| x.is_approved()),
            Err(e) => {
                log::warn!("Cannot read admin grants: {}", e);
                false
            }
        }
    }

    /// Approves `email`, reusing its grant row when one exists.
    pub fn grant_admin(&self, actor: &User, email: &str) -> ServiceResult<AdminGrant> {
        actor.ensure_admin(self)?;
        let email = normalize_email(email);
        validate_email(&email)?;

        let now = Utc::now().naive_utc();
        let existing = self.backend.select_grants(&GrantFilter { email: Some(email.clone()), status: None })?;
        let grant = match existing.first() {
            Some(grant) => self.backend.update_grant(grant.id, &GrantUpdate {
                status: GrantStatus::Approved.as_str().to_string(),
                approved_by: Some(actor.email.clone()),
                approved_at: Some(now),
            })?,
            None => self.backend.insert_grant(&NewGrant {
                email,
                status: GrantStatus::Approved.as_str().to_string(),
                approved_by: Some(actor.email.clone()),
                approved_at: Some(now),
            })?,
        };
        log::info!("{} granted admin rights to {}", actor.email, grant.email);
        Ok(grant)
    }

    pub fn create_admin_account(&self, actor: &User, email: &str, password: &str, confirm: &str) -> ServiceResult<AdminGrant> {
        actor.ensure_admin(self)?;
        match self.sign_up(email, password, confirm) {
            Ok(_) => {}
            Err(ServiceError::AlreadyPresent(_)) => log::info!("{} is already registered, granting only", email),
            Err(e) => return Err(e),
        }
        self.grant_admin(actor, email)
    }

    /// Flips the grant to `denied`, the row is kept.
    pub fn revoke_admin(&self, actor: &User, grant_id: IdType) -> ServiceResult<AdminGrant> {
        actor.ensure_admin(self)?;
        let grant = self.backend.update_grant(grant_id, &GrantUpdate {
            status: GrantStatus::Denied.as_str().to_string(),
            approved_by: None,
            approved_at: None,
        })?;
        log::info!("{} revoked admin rights of {}", actor.email, grant.email);
        Ok(grant)
    }

    pub fn list_admins(&self, actor: &User) -> ServiceResult<AdminRoster> {
        actor.ensure_admin(self)?;
        let grants = self.backend.select_grants(&GrantFilter { email: None, status: Some(GrantStatus::Approved) })?;
        Ok(AdminRoster {
            bootstrap: self.bootstrap_admin.clone(),
            grants,
        })
    }

    /// Creates the account, or resets its password when `replace` is set.
    pub fn setup_account(&self, email: &str, password: &str, replace: bool) -> ServiceResult<()> {
        match self.backend.find_user_by_email(&normalize_email(email))? {
            None => {
                self.sign_up(email, password, password)?;
            }
            Some(ref user) if replace => {
                self.backend.update_user_password(user.id, &self.hash_password(password)?)?;
                log::info!("Password of {} replaced", user.email);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn save_identity(&self, user: &User) -> ServiceResult<String> {
        serde_json::to_string(&SessionIdentity {
            id: user.id,
            email: user.email.clone(),
        }).map_err(|e| ServiceError::InternalServerError(format!("Identity error: {}", e)))
    }

    pub fn parse_identity(&self, identity: &str) -> ServiceResult<Option<User>> {
        let cookie: SessionIdentity = match serde_json::from_str(identity) {
            Ok(x) => x,
            Err(_) => return Ok(None),
        };

        let user = match self.backend.find_user_by_id(cookie.id)? {
            None => return Ok(None),
            Some(u) => u,
        };
        if user.email != cookie.email {
            Ok(None)
        } else {
            Ok(Some(user))
        }
    }
}

pub trait PermissionCheckable {
    fn ensure_admin(&self, auth: &Authenticator) -> ServiceResult<()>;
}

impl PermissionCheckable for User {
    fn ensure_admin(&self, auth: &Authenticator) -> ServiceResult<()> {
        if !auth.is_admin(&self.email) {
            Err(ServiceError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Table};

    const BOOTSTRAP: &str = "megandaiger@gmail.com";

    fn setup() -> (Arc<MemoryBackend>, Authenticator) {
        let backend = Arc::new(MemoryBackend::new());
        let auth = Authenticator::new(backend.clone(), Some(BOOTSTRAP.to_string()), 4);
        (backend, auth)
    }

    #[test]
    fn sign_up_validation() {
        let (_, auth) = setup();
        let err = auth.sign_up("a@b.org", "secret1", "secret2").unwrap_err();
        assert_eq!(err.to_string(), "Bad Request: Passwords don't match!");
        assert!(auth.sign_up("a@b.org", "short", "short").is_err());
        assert!(auth.sign_up("not-an-email", "secret1", "secret1").is_err());

        let user = auth.sign_up(" A@B.org ", "secret1", "secret1").unwrap();
        assert_eq!(user.email, "a@b.org");
        assert!(matches!(auth.sign_up("a@b.org", "secret1", "secret1"), Err(ServiceError::AlreadyPresent(_))));
    }

    #[test]
    fn sign_in_errors_are_generic() {
        let (_, auth) = setup();
        auth.sign_up("a@b.org", "secret1", "secret1").unwrap();

        assert!(auth.sign_in("A@b.org", "secret1").is_ok());
        assert!(matches!(auth.sign_in("a@b.org", "wrong!!"), Err(ServiceError::InvalidCredentials)));
        assert!(matches!(auth.sign_in("nobody@b.org", "secret1"), Err(ServiceError::InvalidCredentials)));
    }

    #[test]
    fn bootstrap_admin_survives_outages() {
        let (backend, auth) = setup();
        backend.set_unavailable(Table::Grants, true);
        assert!(auth.is_admin(BOOTSTRAP));
        assert!(auth.is_admin("MeganDaiger@gmail.com"));
        assert!(!auth.is_admin("someone@else.org"));
    }

    #[test]
    fn grant_rows_match_any_case() {
        let (backend, auth) = setup();
        backend.insert_grant(&NewGrant {
            email: "Jane.Doe@Example.org".to_string(),
            status: GrantStatus::Approved.as_str().to_string(),
            approved_by: Some(BOOTSTRAP.to_string()),
            approved_at: None,
        }).unwrap();
        backend.insert_grant(&NewGrant {
            email: "Old.Admin@Example.org".to_string(),
            status: GrantStatus::Denied.as_str().to_string(),
            approved_by: None,
            approved_at: None,
        }).unwrap();

        assert!(auth.is_admin("Jane.Doe@Example.org"));
        assert!(auth.is_admin("jane.doe@example.org"));
        assert!(!auth.is_admin("Old.Admin@Example.org"));

        // Granting again reuses the mixed-case row
        let root = auth.sign_up(BOOTSTRAP, "secret1", "secret1").unwrap();
        let grant = auth.grant_admin(&root, "old.admin@example.org").unwrap();
        assert_eq!(grant.email, "Old.Admin@Example.org");
        assert!(auth.is_admin("old.admin@example.org"));
        assert_eq!(backend.select_grants(&GrantFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn grants_decide_admin() {
        let (_, auth) = setup();
        let root = auth.sign_up(BOOTSTRAP, "secret1", "secret1").unwrap();
        let volunteer = auth.sign_up("vol@b.org", "secret1", "secret1").unwrap();

        assert!(!auth.is_admin("vol@b.org"));
        assert!(matches!(auth.grant_admin(&volunteer, "x@b.org"), Err(ServiceError::Unauthorized)));

        let grant = auth.grant_admin(&root, "vol@b.org").unwrap();
        assert_eq!(grant.approved_by.as_deref(), Some(BOOTSTRAP));
        assert!(auth.is_admin("vol@b.org"));

        let revoked = auth.revoke_admin(&root, grant.id).unwrap();
        assert_eq!(revoked.grant_status(), Some(GrantStatus::Denied));
        assert!(!auth.is_admin("vol@b.org"));

        // Same row is reused
        let again = auth.grant_admin(&root, "vol@b.org").unwrap();
        assert_eq!(again.id, grant.id);
        assert_eq!(auth.list_admins(&root).unwrap().grants.len(), 1);
    }

    #[test]
    fn create_admin_account_for_existing_user() {
        let (_, auth) = setup();
        let root = auth.sign_up(BOOTSTRAP, "secret1", "secret1").unwrap();
        auth.sign_up("vol@b.org", "secret1", "secret1").unwrap();

        auth.create_admin_account(&root, "vol@b.org", "ignored1", "ignored1").unwrap();
        assert!(auth.is_admin("vol@b.org"));
        assert!(auth.sign_in("vol@b.org", "secret1").is_ok());

        auth.create_admin_account(&root, "new@b.org", "secret2", "secret2").unwrap();
        assert!(auth.sign_in("new@b.org", "secret2").is_ok());
    }

    #[test]
    fn identity_round_trip() {
        let (_, auth) = setup();
        let user = auth.sign_up("a@b.org", "secret1", "secret1").unwrap();
        let cookie = auth.save_identity(&user).unwrap();
        assert_eq!(auth.parse_identity(&cookie).unwrap(), Some(user));
        assert_eq!(auth.parse_identity("garbage").unwrap(), None);
    }

    #[test]
    fn views_by_role() {
        assert_eq!(views_for(false, false), vec![View::ViewData]);
        assert_eq!(views_for(true, false), vec![View::ViewData, View::EntryForm]);
        assert_eq!(views_for(true, true).len(), 5);
    }

    #[test]
    fn setup_account_replaces_password() {
        let (_, auth) = setup();
        auth.setup_account(BOOTSTRAP, "first-pass", false).unwrap();
        auth.setup_account(BOOTSTRAP, "second-pass", false).unwrap();
        assert!(auth.sign_in(BOOTSTRAP, "first-pass").is_ok());

        auth.setup_account(BOOTSTRAP, "second-pass", true).unwrap();
        assert!(auth.sign_in(BOOTSTRAP, "second-pass").is_ok());
    }
}
