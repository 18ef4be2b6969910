//! Registry API handlers
//!
//! - POST /register - register or heartbeat an instance
//! - GET /services - every live instance
//! - GET /services/{name} - live instances of one service, 404 when none

use std::sync::Arc;

use actix_web::{
    HttpRequest, HttpResponse, Scope, error::JsonPayloadError, get, post, web,
};
use muster_api::RegisterRequest;
use muster_common::error::PARAMETER_MISSING;

use crate::error::AppError;
use crate::model::response::Result;
use crate::service::RegistryService;

/// Register or refresh an instance.
///
/// POST /register
#[post("/register")]
async fn register(
    registry: web::Data<Arc<RegistryService>>,
    body: web::Json<RegisterRequest>,
) -> std::result::Result<HttpResponse, AppError> {
    let response = registry.register(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /services
#[get("/services")]
async fn list_services(
    registry: web::Data<Arc<RegistryService>>,
) -> std::result::Result<HttpResponse, AppError> {
    let instances = registry.list_all().await?;
    Ok(HttpResponse::Ok().json(instances))
}

/// GET /services/{name}
#[get("/services/{name}")]
async fn list_service_instances(
    registry: web::Data<Arc<RegistryService>>,
    name: web::Path<String>,
) -> std::result::Result<HttpResponse, AppError> {
    let instances = registry.list_by_name(&name).await?;
    Ok(HttpResponse::Ok().json(instances))
}

/// Malformed or missing JSON bodies answer 400 with the error envelope.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        let message = err.to_string();
        let response = Result::<String>::http_response(
            400,
            PARAMETER_MISSING.code,
            message,
            String::new(),
        );
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

/// Registry routes. The app must register `web::Data<Arc<RegistryService>>`.
pub fn registry_routes() -> Scope {
    web::scope("")
        .app_data(json_config())
        .service(register)
        .service(list_services)
        .service(list_service_instances)
}
