// Error responses for the registry API
// Maps muster_common errors to HTTP statuses and `{code, message, data}` bodies

use std::fmt::{Display, Formatter};

use actix_web::HttpResponse;

pub use muster_common::error::{
    MusterError, PARAMETER_VALIDATE_ERROR, REGISTRY_UNAVAILABLE, SERVER_ERROR, SERVICE_NOT_EXIST,
};

use crate::model::response as common;

// Local wrapper so actix-web's ResponseError can be implemented here
// (orphan rules forbid implementing it on muster_common::AppError)
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<MusterError> for AppError {
    fn from(value: MusterError) -> Self {
        AppError {
            inner: anyhow::Error::new(value),
        }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl actix_web::error::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        if let Some(e) = self.downcast_ref::<MusterError>() {
            match e {
                MusterError::IllegalArgument(message) | MusterError::ConfigError(message) => {
                    common::Result::<String>::http_response(
                        400,
                        PARAMETER_VALIDATE_ERROR.code,
                        message.to_string(),
                        String::new(),
                    )
                }
                MusterError::NotFound(_) => common::Result::<String>::http_response(
                    404,
                    SERVICE_NOT_EXIST.code,
                    e.to_string(),
                    String::new(),
                ),
                MusterError::Unavailable(message) => common::Result::<String>::http_response(
                    503,
                    REGISTRY_UNAVAILABLE.code,
                    message.to_string(),
                    String::new(),
                ),
                MusterError::InternalError(message) => common::Result::<String>::http_response(
                    500,
                    SERVER_ERROR.code,
                    message.to_string(),
                    String::new(),
                ),
            }
        } else {
            common::Result::<String>::http_response(
                500,
                SERVER_ERROR.code,
                self.inner.to_string(),
                String::new(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use actix_web::http::StatusCode;

    fn status_of(err: MusterError) -> StatusCode {
        AppError::from(err).error_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(MusterError::IllegalArgument("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(MusterError::NotFound("svc".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(MusterError::Unavailable("redis down".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(MusterError::InternalError("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_plain_anyhow_is_server_error() {
        let err = AppError::from(anyhow::anyhow!("unexpected"));
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
