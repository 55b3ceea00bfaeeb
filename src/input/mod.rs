//! External sources feeding entity states into the host.
//!
//! Current input sources:
//! - `mqtt`: statestream mirror of an upstream home-automation install

pub mod mqtt;
