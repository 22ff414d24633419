//! # Billing Library
//!
//! Durable orchestration of bills on top of `workflow_framework`. This library exposes
//! the core modules of the application for the binary and for integration testing.

pub mod bill_actor;
pub mod clients;
pub mod config;
pub mod lifecycle;
pub mod model;
pub mod store;
