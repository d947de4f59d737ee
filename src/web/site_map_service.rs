use actix_web::{web, Error, HttpResponse};
use serde_json::{json, Value};

use crate::AppData;
use crate::sites::{SiteListing, SiteSource};

/// GeoJSON positions are `[longitude, latitude]`.
pub fn sites_geojson(listing: &SiteListing) -> Value {
    let features: Vec<Value> = listing.sites.iter()
        .map(|site| json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [site.longitude, site.latitude],
            },
            "properties": {
                "id": site.id,
                "site_number": site.site_number,
                "full_name": site.full_name,
                "short_name": site.short_name,
                "elevation": site.elevation,
                "description": site.description,
            },
        }))
        .collect();

    json!({
        "type": "FeatureCollection",
        "source": match listing.source {
            SiteSource::Live => "live",
            SiteSource::Fallback => "fallback",
        },
        "features": features,
    })
}

pub async fn site_map(ctx: web::Data<AppData>) -> Result<HttpResponse, Error> {
    let listing = web::block(move || ctx.registry.list_sites()).await?;

    Ok(HttpResponse::Ok()
        .content_type("application/geo+json")
        .body(sites_geojson(&listing).to_string()))
}
