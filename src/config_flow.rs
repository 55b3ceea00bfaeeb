//! Setup wizard for a dew point sensor.
//!
//! A single `user` step collects the temperature entity, the humidity
//! entity and an optional name. Submitting it either re-displays the form
//! with per-field errors, aborts because the pair is already configured, or
//! creates (and persists) a config entry. The sensor itself is created later
//! when the entry is set up.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};

use crate::constants::{
    CONF_DEW_POINT_NAME, CONF_HUMIDITY_SENSOR, CONF_TEMPERATURE_SENSOR, DEFAULT_NAME,
    SENSOR_DOMAIN,
};
use crate::entity::DeviceClass;
use crate::error::Result;
use crate::host::{ConfigEntry, ConfigRecord, EntryRegistry, StateLookup, fingerprint};

/// Fields of the `user` step form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    TemperatureSensor,
    HumiditySensor,
    DewPointName,
}

impl FormField {
    pub fn key(self) -> &'static str {
        match self {
            FormField::TemperatureSensor => CONF_TEMPERATURE_SENSOR,
            FormField::HumiditySensor => CONF_HUMIDITY_SENSOR,
            FormField::DewPointName => CONF_DEW_POINT_NAME,
        }
    }
}

/// Field-scoped validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    SensorNotFound,
}

/// Reason a flow ended without creating an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
}

/// Submitted form values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub temperature_sensor: String,
    pub humidity_sensor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dew_point_name: Option<String>,
}

impl UserInput {
    pub fn new(temperature_sensor: impl Into<String>, humidity_sensor: impl Into<String>) -> Self {
        Self {
            temperature_sensor: temperature_sensor.into(),
            humidity_sensor: humidity_sensor.into(),
            dew_point_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.dew_point_name = Some(name.into());
        self
    }

    /// The chosen name, or the default one when left empty.
    pub fn name(&self) -> &str {
        match self.dew_point_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_NAME,
        }
    }
}

/// How a form field is picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Existing entity restricted to a domain and device class.
    Entity {
        domain: &'static str,
        device_class: DeviceClass,
    },
    /// Free text.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub field: FormField,
    pub required: bool,
    pub selector: Selector,
    pub default: Option<String>,
}

/// Form description for the `user` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSchema {
    pub fields: Vec<SchemaField>,
}

impl FormSchema {
    /// Build the form, pre-filled with a previous submission if any.
    fn user_step(previous: Option<&UserInput>) -> Self {
        let entity = |device_class| Selector::Entity {
            domain: SENSOR_DOMAIN,
            device_class,
        };

        Self {
            fields: vec![
                SchemaField {
                    field: FormField::TemperatureSensor,
                    required: true,
                    selector: entity(DeviceClass::Temperature),
                    default: previous.map(|p| p.temperature_sensor.clone()),
                },
                SchemaField {
                    field: FormField::HumiditySensor,
                    required: true,
                    selector: entity(DeviceClass::Humidity),
                    default: previous.map(|p| p.humidity_sensor.clone()),
                },
                SchemaField {
                    field: FormField::DewPointName,
                    required: false,
                    selector: Selector::Text,
                    default: Some(match previous {
                        Some(p) => p.name().to_string(),
                        None => DEFAULT_NAME.to_string(),
                    }),
                },
            ],
        }
    }

    pub fn field(&self, field: FormField) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.field == field)
    }

    /// Pre-filled value for `field`.
    pub fn default_for(&self, field: FormField) -> Option<&str> {
        self.field(field)?.default.as_deref()
    }
}

/// Outcome of a flow step.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    ShowForm {
        step_id: &'static str,
        schema: FormSchema,
        errors: BTreeMap<FormField, FlowError>,
    },
    CreateEntry {
        title: String,
        entry: ConfigEntry,
    },
    Abort {
        reason: AbortReason,
    },
}

/// One run of the setup wizard.
pub struct DewPointConfigFlow<'a> {
    states: &'a dyn StateLookup,
    registry: &'a dyn EntryRegistry,
    unique_id: Option<String>,
}

impl<'a> DewPointConfigFlow<'a> {
    pub const VERSION: u32 = ConfigEntry::VERSION;
    pub const STEP_USER: &'static str = "user";

    pub fn new(states: &'a dyn StateLookup, registry: &'a dyn EntryRegistry) -> Self {
        Self {
            states,
            registry,
            unique_id: None,
        }
    }

    /// Fingerprint claimed by the last valid submission.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Handle the `user` step. `None` shows the empty form.
    pub fn step_user(&mut self, user_input: Option<UserInput>) -> Result<FlowResult> {
        let mut errors = BTreeMap::new();

        if let Some(input) = user_input.as_ref() {
            if self.states.get(&input.temperature_sensor).is_none() {
                errors.insert(FormField::TemperatureSensor, FlowError::SensorNotFound);
            }
            if self.states.get(&input.humidity_sensor).is_none() {
                errors.insert(FormField::HumiditySensor, FlowError::SensorNotFound);
            }

            if errors.is_empty() {
                let unique_id = fingerprint(&input.temperature_sensor, &input.humidity_sensor);
                if self.registry.is_configured(&unique_id) {
                    info!("[Flow] {} is already configured", unique_id);
                    return Ok(FlowResult::Abort {
                        reason: AbortReason::AlreadyConfigured,
                    });
                }
                self.unique_id = Some(unique_id);

                let title = input.name().to_string();
                let record = ConfigRecord::new(
                    &input.temperature_sensor,
                    &input.humidity_sensor,
                    &title,
                );
                let entry = ConfigEntry::new(&title, record);
                self.registry.create_entry(entry.clone())?;
                info!(
                    "[Flow] Created entry {} ({}) for {}",
                    entry.entry_id, title, entry.unique_id
                );

                return Ok(FlowResult::CreateEntry { title, entry });
            }
        }

        Ok(FlowResult::ShowForm {
            step_id: Self::STEP_USER,
            schema: FormSchema::user_step(user_input.as_ref()),
            errors,
        })
    }
}
