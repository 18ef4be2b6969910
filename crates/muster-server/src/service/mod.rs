pub mod registry;

pub use registry::RegistryService;
