//! HTTP server setup

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};

use crate::api::registry_routes;
use crate::service::RegistryService;

/// Creates and binds the registry HTTP server.
pub fn registry_server(
    registry: Arc<RegistryService>,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(registry.clone()))
            .service(registry_routes())
    })
    .bind((address, port))?
    .disable_signals()
    .run())
}
