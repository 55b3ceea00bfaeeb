//! Dew Point Bridge library.
//!
//! A virtual sensor that derives the dew point from a temperature entity
//! and a relative humidity entity, plus the setup wizard that binds it to
//! them and the host plumbing it runs on.

pub mod config;
pub mod config_flow;
pub mod constants;
pub mod dew_point;
pub mod entity;
pub mod error;
pub mod host;
pub mod input;
pub mod integration;
pub mod sensor;
