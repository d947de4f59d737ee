use actix_web::web;

use super::graphql_service::{graphiql, graphql};
use super::site_map_service::site_map;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/graphql").route(web::post().to(graphql)))
            .service(web::resource("/graphiql").route(web::get().to(graphiql)))
            .service(web::resource("/sites/map").route(web::get().to(site_map)))
    );
}
