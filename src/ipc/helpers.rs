use serde_json::{json, Value};

use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::model::Dataset;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::new(
            "bad_params",
            format!("{} must be a string", key),
        )),
    }
}

/// A positive integer, or `None` when absent.
pub fn get_optional_count(params: &Value, key: &str) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                HandlerErr::new("bad_params", format!("{} must be a positive integer", key))
            }),
    }
}

pub fn require_dataset(state: &AppState) -> Result<&Dataset, HandlerErr> {
    state
        .dataset
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_data", "no results ingested yet"))
}

/// Wraps a view model with the dataset it came from. Without data the model
/// is the empty one and `hasData` is false.
pub fn view(dataset: Option<&Dataset>, model: Value) -> Value {
    let mut out = json!({
        "hasData": dataset.map(|d| !d.records.is_empty()).unwrap_or(false),
        "datasetId": dataset.map(|d| d.id.clone()),
    });
    if let (Some(obj), Value::Object(m)) = (out.as_object_mut(), model) {
        obj.extend(m);
    }
    out
}
