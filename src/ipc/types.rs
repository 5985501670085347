use serde::Deserialize;

use crate::config::ResultdConfig;
use crate::model::Dataset;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything one session knows. Owned by the request loop.
pub struct AppState {
    pub config: ResultdConfig,
    pub dataset: Option<Dataset>,
}

impl AppState {
    pub fn new(config: ResultdConfig) -> Self {
        Self {
            config,
            dataset: None,
        }
    }
}
