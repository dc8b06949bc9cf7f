pub mod audit;
pub mod backup;
pub mod password;
pub mod service;
pub mod session;

pub use self::service::{AuthService, LoginOutcome, RegisterOutcome, ResetOutcome};
