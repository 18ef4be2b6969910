//! Application startup utilities.

mod http;
mod logging;
mod shutdown;
mod store;

pub use http::registry_server;
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use store::build_store;
