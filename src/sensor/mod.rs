//! Derived dew point sensor.
//!
//! [`DewPointSensor`] holds the last reading of each source channel and the
//! computed value. [`setup_entry`] attaches one to the host for a config
//! entry and drives it from the state bus until its [`SensorHandle`] is
//! removed.

pub mod dew_point_sensor;
pub mod handle;
pub mod published;

pub use dew_point_sensor::DewPointSensor;
pub use handle::{SensorHandle, setup_entry};
pub use published::{DewPointAttributes, PublishedState};
