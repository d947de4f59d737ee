use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use actix_http::Request;
use actix_identity::IdentityMiddleware;
use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use water_quality_server::AppData;
use water_quality_server::backend::MemoryBackend;
use water_quality_server::config::Settings;
use water_quality_server::web::{api_service, session_middleware};

pub const ADMIN_EMAIL: &str = "megandaiger@gmail.com";
pub const ADMIN_PASSWORD: &str = "password";
pub const BLUE_RIVER: &str = "Blue River at Silverthorne Pavilion- 196";
pub const SNAKE_RIVER: &str = "Snake River KSS- 52";
pub const SWAN_RIVER: &str = "Swan River Reach A- 1007";

lazy_static! {
    static ref COOKIE_KEY: String = hex::encode(rand::thread_rng().gen::<[u8; 32]>());
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
pub struct ExecutionError {
    pub locations: Option<Value>,
    pub path: Option<Vec<Value>>,
    pub message: String,
    pub extensions: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
pub struct GraphQLResult {
    pub data: Option<Value>,
    pub errors: Option<Vec<ExecutionError>>,
}

pub trait ExecutionErrorContainer {
    fn expect_service_error(&self, error_type: &str);
}

impl<T> ExecutionErrorContainer for Result<T, Vec<ExecutionError>> {
    fn expect_service_error(&self, error_type: &str) {
        let errors = self.as_ref().err().expect("Expected errored result");

        if !errors.iter().any(|x| {
            x.extensions.as_ref().map(|x| x.get("type").map(String::as_str) == Some(error_type)).unwrap_or(false)
        }) {
            panic!("Cannot find error: {} in {:?}", error_type, errors)
        }
    }
}

pub struct GraphQlQueryBuilder {
    query: String,
    variables: HashMap<String, Value>,
}

impl GraphQlQueryBuilder {
    pub fn query<S: Into<String>>(query: S) -> GraphQlQueryBuilder {
        GraphQlQueryBuilder {
            query: query.into(),
            variables: HashMap::new(),
        }
    }

    pub fn add_variable<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    fn to_json(&self) -> Value {
        json!({
            "query": self.query,
            "variables": self.variables,
        })
    }
}

pub fn query<S: Into<String>>(query: S) -> GraphQlQueryBuilder {
    GraphQlQueryBuilder::query(query)
}

fn json_object_extract_first(val: &Value) -> Option<Value> {
    val.as_object().and_then(|x| x.values().next()).cloned()
}

pub fn create_random_email() -> String {
    let data = rand::thread_rng().gen::<[u8; 8]>();
    format!("{}@example.org", hex::encode(data))
}

fn manage_errors(errors: Vec<ExecutionError>) -> ! {
    let errors = errors.iter()
        .map(|x| x.message.clone())
        .collect::<Vec<String>>()
        .join("\n");
    panic!("{}", errors)
}

pub struct GraphQlTester<S> {
    service: Rc<S>,
    pub data: AppData,
    pub backend: Arc<MemoryBackend>,
    /// Cookie name to value, as a browser would keep them.
    pub cookies: HashMap<String, String>,
}

impl<S, B> GraphQlTester<S>
    where S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
          B: MessageBody,
{
    /// Same application, fresh cookie jar.
    pub fn fork(&self) -> Self {
        GraphQlTester {
            service: self.service.clone(),
            data: self.data.clone(),
            backend: self.backend.clone(),
            cookies: HashMap::new(),
        }
    }

    fn store_cookies(&mut self, res: &ServiceResponse<B>) {
        for cookie in res.response().cookies() {
            if cookie.value().is_empty() {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies.insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    fn with_cookies(&self, mut req: test::TestRequest) -> test::TestRequest {
        for (name, value) in self.cookies.iter() {
            req = req.cookie(Cookie::new(name.clone(), value.clone()));
        }
        req
    }

    pub async fn submit_raw(&mut self, query: GraphQlQueryBuilder) -> Result<Value, Vec<ExecutionError>> {
        let req = self.with_cookies(
            test::TestRequest::post()
                .uri("/api/graphql")
                .set_json(query.to_json())
        );

        let res = test::call_service(&*self.service, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        self.store_cookies(&res);

        let body = test::read_body(res).await;
        let res: GraphQLResult = serde_json::from_slice(&body).expect("Invalid GraphQL response");
        if let Some(errors) = res.errors {
            return Err(errors);
        }
        Ok(res.data.expect("Missing data"))
    }

    pub async fn submit(&mut self, query: GraphQlQueryBuilder) -> Value {
        match self.submit_raw(query).await {
            Ok(val) => json_object_extract_first(&val).expect("Cannot parse value"),
            Err(errors) => manage_errors(errors),
        }
    }

    pub async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
        let req = self.with_cookies(test::TestRequest::get().uri(uri));
        let res = test::call_service(&*self.service, req.to_request()).await;
        let status = res.status();
        self.store_cookies(&res);

        let body = test::read_body(res).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn login(&mut self, email: &str, password: &str) {
        self.submit(
            query(r#"mutation login($auth: AuthInput!) { login(data: $auth) { id } }"#)
                .add_variable("auth", json!({
                    "email": email,
                    "password": password,
                }))
        ).await;
    }

    pub async fn login_admin(&mut self) {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    }

    /// Signs up a volunteer account and returns its email.
    pub async fn create_random_user(&mut self, password: &str) -> String {
        let email = create_random_email();
        self.submit(
            query(r#"mutation signUp($data: SignUpInput!) { signUp(data: $data) { email } }"#)
                .add_variable("data", json!({
                    "email": &email,
                    "password": password,
                    "confirmPassword": password,
                }))
        ).await;
        email
    }

    pub async fn login_volunteer(&mut self) -> String {
        let email = self.create_random_user("volunteer").await;
        self.login(&email, "volunteer").await;
        email
    }
}

pub fn test_settings() -> Settings {
    let mut vars = HashMap::new();
    vars.insert("DATABASE_URL".to_string(), "postgres://unused".to_string());
    vars.insert("COOKIE_SECRET_KEY".to_string(), COOKIE_KEY.clone());
    vars.insert("BOOTSTRAP_ADMIN_EMAIL".to_string(), ADMIN_EMAIL.to_string());
    vars.insert("PASSWORD_HASH_COST".to_string(), "4".to_string());
    Settings::from_map(&vars).expect("Invalid test settings")
}

pub async fn init_app() -> GraphQlTester<impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>> {
    init_app_with(Arc::new(MemoryBackend::with_default_sites())).await
}

pub async fn init_app_with(
    backend: Arc<MemoryBackend>,
) -> GraphQlTester<impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>> {
    let settings = test_settings();
    let data = AppData::new(&settings, backend.clone());
    data.setup_bootstrap_admin(ADMIN_PASSWORD, true).unwrap();

    let service = test::init_service(
        App::new()
            .app_data(web::Data::new(data.clone()))
            .wrap(IdentityMiddleware::default())
            .wrap(session_middleware(&settings.cookie_secret_key, None))
            .configure(api_service::config)
    ).await;

    GraphQlTester {
        service: Rc::new(service),
        data,
        backend,
        cookies: HashMap::new(),
    }
}

pub trait IntoPrimitive {
    fn to_i64(&self) -> i64;
    fn to_f64(&self) -> f64;
    fn to_bool(&self) -> bool;
    fn to_str(&self) -> &str;
}

impl IntoPrimitive for Value {
    fn to_i64(&self) -> i64 {
        self.as_i64().expect("Value is not i64")
    }

    fn to_f64(&self) -> f64 {
        self.as_f64().expect("Value is not f64")
    }

    fn to_bool(&self) -> bool {
        self.as_bool().expect("Value is not bool")
    }

    fn to_str(&self) -> &str {
        self.as_str().expect("Value is not string")
    }
}

pub fn assert_eq_set(mut left: Value, mut right: Value) {
    let left = left.as_array_mut().expect("Left is not array");
    let right = right.as_array_mut().expect("Right is not array");

    assert_eq!(left.len(), right.len());
    left.sort_by_cached_key(|x| format!("{}", x));
    right.sort_by_cached_key(|x| format!("{}", x));
    assert_eq!(left, right)
}
