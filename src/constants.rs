//! Constants shared by the setup wizard and the derived sensor.

/// Integration domain, stored on every config entry.
pub const DOMAIN: &str = "dew_point_calculator";

pub const CONF_TEMPERATURE_SENSOR: &str = "temperature_sensor";
pub const CONF_HUMIDITY_SENSOR: &str = "humidity_sensor";
pub const CONF_DEW_POINT_NAME: &str = "dew_point_name";

/// Title and entity name used when the form's name field is left empty.
pub const DEFAULT_NAME: &str = "Dew Point";

/// Entity domain for both source sensors and the derived sensor.
pub const SENSOR_DOMAIN: &str = "sensor";

/// Sentinel state strings that carry no numeric reading.
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

pub const UNIT_CELSIUS: &str = "°C";
