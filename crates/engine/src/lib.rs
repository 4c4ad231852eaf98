//! Mentor Engine
//!
//! This crate hosts the orchestration and persistence layer around the
//! `mentor-core` domain: configuration, store contracts and backends, scope
//! admission control, the analytics recorder, and the orchestrator that a
//! transport layer calls into. The transport itself (HTTP routes, schema
//! validation, auth) lives outside this workspace.

pub mod analytics;
pub mod bootstrap;
pub mod config;
pub mod orchestrator;
pub mod scope;
pub mod store;
pub mod telemetry;
