use actix_identity::Identity;
use actix_session::Session;
use actix_web::{web, Error, HttpMessage, HttpRequest, HttpResponse};
use juniper::http::{graphiql::graphiql_source, GraphQLRequest};

use crate::AppData;
use crate::entry::{EntryState, SESSION_KEY};
use crate::errors::ServiceError;

use super::graphql_schema;

pub async fn graphql(
    ctx: web::Data<AppData>,
    request: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    data: web::Json<GraphQLRequest>,
) -> Result<HttpResponse, Error> {
    let original_identity = identity.as_ref().and_then(|x| x.id().ok());
    let original_state: EntryState = session.get(SESSION_KEY)
        .unwrap_or_else(|e| {
            log::warn!("Dropping unreadable entry state: {}", e);
            None
        })
        .unwrap_or_default();

    let app = ctx.into_inner();
    let block_identity = original_identity.clone();
    let block_state = original_state.clone();
    let data = data.into_inner();

    let (body, new_identity, new_state) = web::block(move || {
        let user = match block_identity.as_deref() {
            None => None,
            Some(x) => app.auth.parse_identity(x).unwrap_or_else(|e| {
                log::error!("Cannot load the session user: {}", e);
                None
            }),
        };
        let req_ctx = graphql_schema::Context::new(app.clone(), block_identity, user, block_state);

        let body = {
            let res = data.execute_sync(&*app.graphql_schema, &req_ctx);
            serde_json::to_string(&res)?
        };
        let (identity, state) = req_ctx.into_session();
        Ok::<_, serde_json::Error>((body, identity, state))
    }).await??;

    let mut logged_out = false;
    if new_identity != original_identity {
        match new_identity {
            None => {
                if let Some(identity) = identity {
                    identity.logout();
                    logged_out = true;
                }
            }
            Some(x) => {
                Identity::login(&request.extensions(), x)
                    .map_err(|e| ServiceError::InternalServerError(format!("Login error: {}", e)))?;
            }
        }
    }

    // Logging out purges the whole session
    if !logged_out && new_state != original_state {
        session.insert(SESSION_KEY, &new_state)
            .map_err(|e| ServiceError::InternalServerError(format!("Session error: {}", e)))?;
    }

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(body))
}

pub async fn graphiql() -> HttpResponse {
    let html = graphiql_source("/api/graphql", None);
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}
