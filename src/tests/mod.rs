//! Test helpers and cross-module tests.
//!
//! - `shared`: scripted channel, reference chain, peer message builders
//! - `integration`: dial a fake node over TCP and run the full protocol

pub mod shared;
pub mod integration;
