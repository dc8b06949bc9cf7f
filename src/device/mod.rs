pub mod models;
pub mod registry;
pub mod repo;

pub use self::registry::DeviceRegistry;
