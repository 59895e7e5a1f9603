use std::fmt;

/// Identity of a downstream pipeline stage. Passed explicitly to the stage
/// client so logs and notifications never have to guess from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Generation,
    Extraction,
    Geocoding,
    Rendering,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Generation,
        Stage::Extraction,
        Stage::Geocoding,
        Stage::Rendering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generation => "generation",
            Stage::Extraction => "extraction",
            Stage::Geocoding => "geocoding",
            Stage::Rendering => "rendering",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One endpoint per stage, read once at startup.
#[derive(Debug, Clone)]
pub struct StageEndpoints {
    pub generation: String,
    pub extraction: String,
    pub geocoding: String,
    pub rendering: String,
}

impl StageEndpoints {
    pub fn from_env() -> Self {
        StageEndpoints {
            generation: env_or("LLM_API_URL", "http://localhost:8000/generate"),
            extraction: env_or("PARSER_API_URL", "http://localhost:8001/parse"),
            geocoding: env_or("GEO_API_URL", "http://localhost:8002/geocode"),
            rendering: env_or("MAP_API_URL", "http://localhost:8003/render"),
        }
    }

    pub fn url(&self, stage: Stage) -> &str {
        match stage {
            Stage::Generation => &self.generation,
            Stage::Extraction => &self.extraction,
            Stage::Geocoding => &self.geocoding,
            Stage::Rendering => &self.rendering,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
