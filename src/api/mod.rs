//! HTTP API - thin JSON layer over the generation service

pub mod handlers;
pub mod routes;
