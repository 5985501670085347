use log::info;
use serde_json::{json, Map, Value};

use crate::config::Section;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::get_optional_str;
use crate::ipc::types::{AppState, Request};

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let section = match get_optional_str(&req.params, "section") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let sections: Vec<Section> = match section.as_deref() {
        None => Section::ALL.to_vec(),
        Some(raw) => match Section::parse(raw) {
            Ok(s) => vec![s],
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
    };
    let mut out = Map::new();
    for s in sections {
        out.insert(s.key().to_string(), state.config.section_json(s));
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let section = match Section::parse(section_raw) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    match state.config.apply_patch(section, patch_obj) {
        Ok(value) => {
            info!("setup: {} updated", section.key());
            ok(&req.id, json!({ "section": section.key(), "value": value }))
        }
        Err(e) => err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "section": section.key() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
