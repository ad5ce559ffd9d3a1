//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the request boundary decoupled from storage details.

pub mod recalc_service;
pub mod resource_service;
