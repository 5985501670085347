use serde_json::{json, Value};

use crate::calc::{self, SearchMode};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_count, get_optional_str, get_required_str, view, HandlerErr};
use crate::config::GradingConfig;
use crate::ipc::types::{AppState, Request};
use crate::model::StudentRecord;

const DASHBOARD_TOP_BOTTOM: usize = 5;

fn records(state: &AppState) -> &[StudentRecord] {
    state
        .dataset
        .as_ref()
        .map(|d| d.records.as_slice())
        .unwrap_or(&[])
}

/// The dataset's own grading rules, not whatever setup says now.
fn grading(state: &AppState) -> &GradingConfig {
    state
        .dataset
        .as_ref()
        .map(|d| &d.grading)
        .unwrap_or(&state.config.grading)
}

fn to_value<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> Value {
    let model = calc::dashboard(records(state), DASHBOARD_TOP_BOTTOM, grading(state));
    ok(&req.id, view(state.dataset.as_ref(), to_value(&model)))
}

fn handle_rankings(state: &mut AppState, req: &Request) -> Value {
    let top_n = match get_optional_count(&req.params, "topN") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let rows = calc::top_n(records(state), top_n);
    ok(
        &req.id,
        view(
            state.dataset.as_ref(),
            json!({ "topN": top_n, "rows": rows }),
        ),
    )
}

fn handle_pass_fail(state: &mut AppState, req: &Request) -> Value {
    let model = calc::pass_fail(records(state));
    ok(&req.id, view(state.dataset.as_ref(), to_value(&model)))
}

fn handle_divisions(state: &mut AppState, req: &Request) -> Value {
    let buckets = calc::divisions(records(state));
    ok(
        &req.id,
        view(state.dataset.as_ref(), json!({ "divisions": buckets })),
    )
}

fn handle_subjects(state: &mut AppState, req: &Request) -> Value {
    let pass_mark = grading(state).pass_mark_percent;
    let stats = calc::subject_stats(records(state), pass_mark);
    ok(
        &req.id,
        view(
            state.dataset.as_ref(),
            json!({ "passMarkPercent": pass_mark, "subjects": stats }),
        ),
    )
}

pub(crate) fn parse_search(params: &Value) -> Result<(String, SearchMode), HandlerErr> {
    let query = get_required_str(params, "query")?;
    let mode = match get_optional_str(params, "mode")? {
        None => SearchMode::default(),
        Some(raw) => SearchMode::parse(&raw).ok_or_else(|| {
            HandlerErr::new("bad_params", format!("unknown search mode: {}", raw))
        })?,
    };
    Ok((query, mode))
}

fn handle_search(state: &mut AppState, req: &Request) -> Value {
    let (query, mode) = match parse_search(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let hits = calc::search(records(state), &query, mode);
    ok(
        &req.id,
        view(
            state.dataset.as_ref(),
            json!({
                "query": query,
                "mode": mode.as_str(),
                "count": hits.len(),
                "records": hits,
            }),
        ),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "analytics.dashboard" => Some(handle_dashboard(state, req)),
        "analytics.rankings" => Some(handle_rankings(state, req)),
        "analytics.passFail" => Some(handle_pass_fail(state, req)),
        "analytics.divisions" => Some(handle_divisions(state, req)),
        "analytics.subjects" => Some(handle_subjects(state, req)),
        "analytics.search" => Some(handle_search(state, req)),
        _ => None,
    }
}
