//! Backend module - provider contract, adapters, and registry

pub mod clock;
pub mod fal;
pub mod http;
pub mod mock;
pub mod registry;
pub mod replicate;
pub mod retry;
pub mod traits;
