pub mod engine;
pub mod models;
pub mod proof;
pub mod repo;

pub use self::engine::ChallengeEngine;
