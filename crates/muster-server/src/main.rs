//! Main entry point for the muster registry server.

use std::sync::Arc;

use muster_server::{
    model::Configuration,
    service::RegistryService,
    startup::{self, ShutdownSignal},
};
use tracing::{error, info};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let registry_options = configuration.registry_options()?;
    let bus_options = configuration.bus_options()?;
    info!(
        store = ?registry_options.store,
        bus = ?bus_options.kind,
        exchange = %bus_options.exchange,
        "Starting muster registry"
    );

    let shutdown = ShutdownSignal::new();
    let store = startup::build_store(&registry_options, shutdown.subscribe()).await?;
    let bus = muster_bus::build_bus(bus_options);
    let registry = Arc::new(RegistryService::new(store, bus.clone()));

    let address = configuration.server_address();
    let port = configuration.server_port();
    let server = startup::registry_server(registry, address.clone(), port)?;
    let handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);
    info!("Registry API listening on {}:{}", address, port);

    tokio::select! {
        result = &mut server_task => {
            error!("Registry API exited unexpectedly");
            result??;
        }
        _ = startup::wait_for_shutdown_signal() => {
            handle.stop(true).await;
            server_task.await??;
        }
    }

    shutdown.shutdown();
    if let Err(e) = bus.close().await {
        error!("Failed to close message bus: {}", e);
    }

    info!("Registry stopped");
    Ok(())
}
