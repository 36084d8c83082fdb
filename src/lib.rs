//! Assetforge - theme asset build orchestrator
//!
//! This library provides functionality to:
//! - Register tasks with prerequisites and run them in dependency order
//! - Transform stylesheets, scripts and images through staged pipelines
//! - Skip unchanged files via content fingerprinting
//! - Watch sources and dispatch changes to tasks
//! - Serve a live-reload proxy that pushes updates to browsers
//! - Keep project version fields in sync across manifests

pub mod cache;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod reload;
pub mod report;
pub mod tasks;
pub mod version;
pub mod watch;
