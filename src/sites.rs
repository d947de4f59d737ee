use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{IdType, Site, SiteInput};

/// Storage tokens of the three original sites, newer sites are stored by full name.
const LEGACY_TOKENS: [(&str, &str); 3] = [
    ("Site 1", "Blue River at Silverthorne Pavilion- 196"),
    ("Site 2", "Snake River KSS- 52"),
    ("Site 3", "Swan River Reach A- 1007"),
];

pub fn storage_token(full_name: &str) -> String {
    LEGACY_TOKENS.iter()
        .find(|(_, name)| *name == full_name)
        .map(|(token, _)| token.to_string())
        .unwrap_or_else(|| full_name.to_string())
}

pub fn full_name_for(token: &str) -> String {
    LEGACY_TOKENS.iter()
        .find(|(x, _)| *x == token)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Every way a site can appear in the `site` column: legacy sites were
/// also written under their full name.
pub fn storage_spellings(full_name: &str) -> Vec<String> {
    let token = storage_token(full_name);
    if token == full_name {
        vec![token]
    } else {
        vec![token, full_name.to_string()]
    }
}

pub fn is_legacy_name(full_name: &str) -> bool {
    LEGACY_TOKENS.iter().any(|(_, name)| *name == full_name)
}

pub fn is_legacy_token(token: &str) -> bool {
    LEGACY_TOKENS.iter().any(|(x, _)| *x == token)
}

/// Served when the sites table cannot be read.
pub fn fallback_sites() -> Vec<Site> {
    vec![
        Site {
            id: None,
            site_number: 52,
            full_name: "Snake River KSS- 52".to_string(),
            short_name: "Snake River".to_string(),
            latitude: 39.6123,
            longitude: -106.0856,
            elevation: 9150,
            description: "Monitoring location on the Snake River at Keystone Science School, providing data on this important tributary.".to_string(),
        },
        Site {
            id: None,
            site_number: 196,
            full_name: "Blue River at Silverthorne Pavilion- 196".to_string(),
            short_name: "Blue River".to_string(),
            latitude: 39.6297,
            longitude: -106.0711,
            elevation: 9035,
            description: "Located at Silverthorne Pavilion, this site monitors the Blue River as it flows through the town of Silverthorne.".to_string(),
        },
        Site {
            id: None,
            site_number: 1007,
            full_name: "Swan River Reach A- 1007".to_string(),
            short_name: "Swan River".to_string(),
            latitude: 39.6445,
            longitude: -106.0789,
            elevation: 9200,
            description: "Swan River monitoring site in Reach A, tracking water quality in this scenic mountain watershed.".to_string(),
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, juniper::GraphQLEnum)]
pub enum SiteSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteListing {
    pub sites: Vec<Site>,
    pub source: SiteSource,
}

impl SiteListing {
    pub fn find(&self, full_name: &str) -> Option<&Site> {
        self.sites.iter().find(|x| x.full_name == full_name)
    }

    /// Accepts both storage tokens and full names.
    pub fn position(&self, token: &str) -> Option<usize> {
        let full_name = full_name_for(token);
        self.sites.iter().position(|x| x.full_name == full_name)
    }

    pub fn is_known(&self, full_name: &str) -> bool {
        self.find(full_name).is_some() || is_legacy_name(full_name)
    }

    pub fn short_name_for(&self, token: &str) -> String {
        let full_name = full_name_for(token);
        if let Some(site) = self.find(&full_name) {
            return site.short_name.clone();
        }
        if is_legacy_token(token) || is_legacy_name(&full_name) {
            if let Some(site) = fallback_sites().into_iter().find(|x| x.full_name == full_name) {
                return site.short_name;
            }
        }
        token.to_string()
    }

    pub fn names(&self) -> Vec<(String, String)> {
        self.sites.iter()
            .map(|x| (x.full_name.clone(), x.short_name.clone()))
            .collect()
    }
}

#[derive(Clone)]
pub struct SiteRegistry {
    backend: Arc<dyn Backend>,
}

impl SiteRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        SiteRegistry { backend }
    }

    /// Never fails: a read error yields the fallback table, an empty table stays empty.
    pub fn list_sites(&self) -> SiteListing {
        match self.backend.select_sites() {
            Ok(rows) => SiteListing {
                sites: rows.into_iter().map(Site::from).collect(),
                source: SiteSource::Live,
            },
            Err(e) => {
                log::warn!("Cannot read sites, using the built-in list: {}", e);
                SiteListing {
                    sites: fallback_sites(),
                    source: SiteSource::Fallback,
                }
            }
        }
    }

    pub fn list_site_names(&self) -> Vec<(String, String)> {
        self.list_sites().names()
    }

    pub fn get_site_details(&self) -> HashMap<String, Site> {
        self.list_sites().sites.into_iter()
            .map(|x| (x.full_name.clone(), x))
            .collect()
    }

    pub fn add_site(&self, input: &SiteInput) -> ServiceResult<Site> {
        let input = validate(input)?;
        self.ensure_unique(&input, None)?;
        let row = self.backend.insert_site(&input)?;
        log::info!("Added site {} ({})", row.full_name, row.id);
        Ok(row.into())
    }

    pub fn update_site(&self, id: IdType, input: &SiteInput) -> ServiceResult<Site> {
        let input = validate(input)?;
        self.ensure_unique(&input, Some(id))?;
        Ok(self.backend.update_site(id, &input)?.into())
    }

    pub fn delete_site(&self, id: IdType) -> ServiceResult<()> {
        if self.backend.delete_site(id)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Site".to_string()))
        }
    }

    // Reads the live table: writes are refused while only the fallback is available
    fn ensure_unique(&self, input: &SiteInput, skip: Option<IdType>) -> ServiceResult<()> {
        let rows = self.backend.select_sites()?;
        for row in rows.iter().filter(|x| Some(x.id) != skip) {
            if row.full_name == input.full_name {
                return Err(ServiceError::AlreadyPresent("Site full name".to_string()));
            }
            if row.short_name == input.short_name {
                return Err(ServiceError::AlreadyPresent("Site short name".to_string()));
            }
        }
        Ok(())
    }
}

fn validate(input: &SiteInput) -> ServiceResult<SiteInput> {
    let input = SiteInput {
        full_name: input.full_name.trim().to_string(),
        short_name: input.short_name.trim().to_string(),
        description: input.description.trim().to_string(),
        ..input.clone()
    };

    if input.full_name.is_empty() || input.short_name.is_empty() || input.description.is_empty() {
        return Err(ServiceError::BadRequest("Full name, short name and description are required".to_string()));
    }
    if is_legacy_token(&input.full_name) {
        return Err(ServiceError::BadRequest(format!("'{}' is a reserved name", input.full_name)));
    }
    if !(-90.0..=90.0).contains(&input.latitude) {
        return Err(ServiceError::BadRequest("Latitude must be between -90 and 90".to_string()));
    }
    if !(-180.0..=180.0).contains(&input.longitude) {
        return Err(ServiceError::BadRequest("Longitude must be between -180 and 180".to_string()));
    }
    Ok(input)
}
