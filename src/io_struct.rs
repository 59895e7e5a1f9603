use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Body of `POST /plan-trip`. Immutable once accepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TripRequest {
    pub user_input: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub callback_url: Option<String>,
}

/// Immediate acknowledgment returned by `POST /plan-trip`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TripAccepted {
    pub status: String,
    pub request_id: String,
    pub notifications: Vec<crate::notify::Notification>,
}

/// Request to the generation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub idea: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creativity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl GenerateRequest {
    pub fn new(idea: impl Into<String>) -> Self {
        GenerateRequest {
            idea: idea.into(),
            creativity: None,
            max_length: None,
        }
    }
}

/// Response from the generation stage. Only `raw_text` is consumed; the
/// service also reports timings and model metadata which we carry but ignore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub raw_text: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Request to the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CityPriority {
    Mandatory,
    Optional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityItem {
    pub name: String,
    pub priority: CityPriority,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSegment {
    pub from_city: String,
    pub to_city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// The extraction stage's six-key contract. The parser guarantees all six
/// keys are present even when it falls back to heuristic parsing; extra
/// fields (parse strategy, confidence) pass through untouched to geocoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedPlan {
    pub sequence: Vec<String>,
    pub cities: Vec<CityItem>,
    pub landmarks: Vec<String>,
    pub hotels: Vec<String>,
    pub roads: Vec<String>,
    pub transport_segments: Vec<TransportSegment>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ParsedPlan {
    /// Per-key item counts, used in milestone notification details.
    pub fn summary(&self) -> Value {
        json!({
            "sequence": self.sequence.len(),
            "cities": self.cities.len(),
            "landmarks": self.landmarks.len(),
            "hotels": self.hotels.len(),
            "roads": self.roads.len(),
            "transport_segments": self.transport_segments.len(),
        })
    }
}

/// A location enriched with optional coordinates by the geocoding stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransportSegment {
    pub from_city: GeoEntity,
    pub to_city: GeoEntity,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Geographic bounds for map framing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Output of the geocoding stage, forwarded verbatim to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPlan {
    pub cities: Vec<GeoEntity>,
    pub landmarks: Vec<GeoEntity>,
    pub hotels: Vec<GeoEntity>,
    pub roads: Vec<GeoEntity>,
    pub transport_segments: Vec<GeoTransportSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl GeoPlan {
    pub fn summary(&self) -> Value {
        json!({
            "cities": self.cities.len(),
            "landmarks": self.landmarks.len(),
            "hotels": self.hotels.len(),
            "roads": self.roads.len(),
            "transport_segments": self.transport_segments.len(),
            "bounding_box": self.bounding_box.is_some(),
        })
    }
}

/// Final artifact of one successful run. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub travel_plan: String,
    pub map_html: String,
    pub enriched_data: GeoPlan,
}
