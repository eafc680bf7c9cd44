//! Typed records built from raw upstream payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The value of textual fields missing from a payload.
pub const NOT_AVAILABLE: &str = "N/A";

/// A pilot of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pilot {
    pub name: String,
    /// The pilot's species, the first one if the upstream lists several.
    pub species: Option<String>,
    pub homeworld: Option<String>,
    pub films: Vec<String>,
    pub edited: String,
}

impl Pilot {
    /// Builds a pilot from an upstream `people` object.
    pub fn from_api(data: &Value) -> Self {
        let species = match data.get("species") {
            Some(Value::Array(list)) => list.first().and_then(Value::as_str).map(str::to_owned),
            Some(Value::String(species)) => Some(species.clone()),
            _ => None,
        };
        let films = data
            .get("films")
            .and_then(Value::as_array)
            .map(|films| {
                films
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: str_field(data, "name").unwrap_or_default(),
            species,
            homeworld: str_field(data, "homeworld"),
            films,
            edited: str_field(data, "edited").unwrap_or_else(|| NOT_AVAILABLE.to_owned()),
        }
    }
}

/// A vehicle enriched with its pilots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub name: String,
    pub model: String,
    pub vehicle_class: String,
    pub edited: String,
    pub pilots: Vec<Pilot>,
}

fn str_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_owned)
}

/// Builds a [`VehicleRecord`] from an upstream `vehicles` object and the `people` objects of its
/// pilots.
///
/// A missing `model`, `vehicle_class` or `edited` becomes [`NOT_AVAILABLE`].
pub fn transform_vehicle_data(raw_vehicle: &Value, pilot_details: &[Value]) -> VehicleRecord {
    let or_not_available =
        |field: &str| str_field(raw_vehicle, field).unwrap_or_else(|| NOT_AVAILABLE.to_owned());

    VehicleRecord {
        name: str_field(raw_vehicle, "name").unwrap_or_default(),
        model: or_not_available("model"),
        vehicle_class: or_not_available("vehicle_class"),
        edited: or_not_available("edited"),
        pilots: pilot_details.iter().map(Pilot::from_api).collect(),
    }
}
