//! Gateway module - provider selection, failover, and health checking

pub mod failover;
pub mod health_check;
pub mod selector;
pub mod weights;
