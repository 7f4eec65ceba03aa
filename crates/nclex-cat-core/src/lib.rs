//! nclex-cat-core: computerized adaptive testing engine.
//!
//! This crate defines the item and session data model, the 3PL ability
//! estimator, maximum-information item selection, the stopping rule and the
//! session controller that ties them together. It also carries the TOML item
//! bank loader and a simulation harness for checking the test's behaviour
//! against candidates of known ability.

pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimation;
pub mod irt;
pub mod model;
pub mod parser;
pub mod probability;
pub mod report;
pub mod selection;
pub mod session;
pub mod simulation;
pub mod statistics;
pub mod stopping;
