use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use derive_more::Display;
use diesel::result::{DatabaseErrorKind, Error as DBError};
use juniper::{graphql_value, FieldError, IntoFieldError};

#[derive(Debug, Display)]
pub enum ServiceError {
    #[display("Internal Server Error: {_0}")]
    InternalServerError(String),

    #[display("Backend Unavailable: {_0}")]
    BackendUnavailable(String),

    #[display("Bad Request: {_0}")]
    BadRequest(String),

    #[display("{_0} Not Found")]
    NotFound(String),

    #[display("Unauthorized")]
    Unauthorized,

    #[display("Invalid Credentials")]
    InvalidCredentials,

    #[display("Login Required")]
    LoginRequired,

    #[display("{_0} Already Present")]
    AlreadyPresent(String),
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    pub fn type_code(&self) -> &'static str {
        match self {
            ServiceError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ServiceError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Unauthorized => "UNAUTHORIZED",
            ServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            ServiceError::LoginRequired => "LOGIN_REQUIRED",
            ServiceError::AlreadyPresent(_) => "ALREADY_PRESENT",
        }
    }
}

impl IntoFieldError for ServiceError {
    fn into_field_error(self) -> FieldError {
        let error_type = self.type_code();
        match self {
            ServiceError::InternalServerError(mex) => {
                log::error!("internal error: {}", mex);
                FieldError::new(
                    "Internal server error",
                    graphql_value!({ "type": error_type }),
                )
            }
            ServiceError::BackendUnavailable(mex) => {
                log::error!("backend unavailable: {}", mex);
                FieldError::new(
                    "The data store is unavailable, please retry later",
                    graphql_value!({ "type": error_type }),
                )
            }
            ServiceError::BadRequest(message) => FieldError::new(
                message,
                graphql_value!({ "type": error_type }),
            ),
            ServiceError::NotFound(type_name) => FieldError::new(
                format!("{} not found!", type_name),
                graphql_value!({ "type": error_type }),
            ),
            ServiceError::Unauthorized => FieldError::new(
                "Higher authorization required",
                graphql_value!({ "type": error_type }),
            ),
            // Same message for unknown accounts and wrong passwords
            ServiceError::InvalidCredentials => FieldError::new(
                "Login failed. Please check your credentials.",
                graphql_value!({ "type": error_type }),
            ),
            ServiceError::LoginRequired => FieldError::new(
                "Login required",
                graphql_value!({ "type": error_type }),
            ),
            ServiceError::AlreadyPresent(type_name) => FieldError::new(
                format!("{} already taken", type_name),
                graphql_value!({ "type": error_type }),
            ),
        }
    }
}

impl From<DBError> for ServiceError {
    fn from(error: DBError) -> ServiceError {
        match error {
            DBError::DatabaseError(kind, info) => {
                let message = info.details().unwrap_or_else(|| info.message()).to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation => ServiceError::AlreadyPresent(message),
                    DatabaseErrorKind::ForeignKeyViolation | DatabaseErrorKind::CheckViolation => {
                        ServiceError::BadRequest(message)
                    }
                    kind => ServiceError::BackendUnavailable(format!("DB error, {:?} {}", kind, message)),
                }
            }
            DBError::NotFound => ServiceError::NotFound("Record".to_string()),
            err => ServiceError::InternalServerError(format!("DB error, {}", err)),
        }
    }
}

impl From<r2d2::Error> for ServiceError {
    fn from(error: r2d2::Error) -> ServiceError {
        ServiceError::BackendUnavailable(format!("Pool error: {}", error))
    }
}

impl From<bcrypt::BcryptError> for ServiceError {
    fn from(error: bcrypt::BcryptError) -> ServiceError {
        ServiceError::InternalServerError(format!("Hashing error: {}", error))
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::BadRequest(_) | ServiceError::AlreadyPresent(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::FORBIDDEN,
            ServiceError::InvalidCredentials | ServiceError::LoginRequired => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::InternalServerError(_) => HttpResponse::build(self.status_code()).body("Internal Server Error"),
            ServiceError::Unauthorized => HttpResponse::new(StatusCode::FORBIDDEN),
            x => HttpResponse::build(self.status_code()).body(x.to_string()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
