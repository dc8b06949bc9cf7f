//! Password manager backend: accounts, authenticator devices and
//! challenge-based two-factor ceremonies.

pub mod account;
pub mod api;
pub mod auth;
pub mod challenge;
pub mod cli;
pub mod codes;
pub mod device;
pub mod error;
