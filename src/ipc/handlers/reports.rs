use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::config::{ReportFormat, SubjectOrder};
use crate::export::{build_table, read_report, write_report, ReportView};
use crate::ipc::error::ok;
use crate::ipc::handlers::analytics::parse_search;
use crate::ipc::helpers::{
    get_optional_count, get_optional_str, get_required_str, require_dataset, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

/// Explicit `format`, then the file extension, then the configured default.
fn resolve_format(
    raw: Option<&str>,
    out_path: &Path,
    fallback: ReportFormat,
) -> Result<ReportFormat, HandlerErr> {
    if let Some(raw) = raw {
        return ReportFormat::parse(raw)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("unknown format: {}", raw)));
    }
    let by_ext = out_path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ReportFormat::parse);
    Ok(by_ext.unwrap_or(fallback))
}

fn resolve_view(params: &Value, default_top_n: usize) -> Result<ReportView, HandlerErr> {
    let raw = get_optional_str(params, "view")?.unwrap_or_else(|| "all".to_string());
    match raw.as_str() {
        "all" => Ok(ReportView::All),
        "passed" => Ok(ReportView::Passed),
        "failed" => Ok(ReportView::Failed),
        "top" => Ok(ReportView::Top(
            get_optional_count(params, "topN")?.unwrap_or(default_top_n),
        )),
        "search" => {
            let (query, mode) = parse_search(params)?;
            Ok(ReportView::Search { query, mode })
        }
        other => Err(HandlerErr::new(
            "bad_params",
            format!("unknown view: {}", other),
        )),
    }
}

fn export(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let dataset = require_dataset(state)?;
    let out_path = PathBuf::from(get_required_str(&req.params, "outPath")?);
    let report_cfg = &state.config.report;

    let format = resolve_format(
        get_optional_str(&req.params, "format")?.as_deref(),
        &out_path,
        report_cfg.default_format,
    )?;
    let view = resolve_view(&req.params, report_cfg.top_n)?;
    let order = match get_optional_str(&req.params, "subjectOrder")? {
        None => report_cfg.subject_order,
        Some(raw) => SubjectOrder::parse(&raw).ok_or_else(|| {
            HandlerErr::new("bad_params", format!("unknown subjectOrder: {}", raw))
        })?,
    };

    let rows = view.select(&dataset.records);
    let table = build_table(&rows, order);
    write_report(&out_path, &table, format, &report_cfg.sheet_name).map_err(|e| {
        HandlerErr::new("export_failed", format!("{:#}", e))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;

    Ok(json!({
        "path": out_path.to_string_lossy(),
        "format": format.as_str(),
        "view": view.name(),
        "rowsWritten": table.rows.len(),
        "columns": table.columns,
        "datasetId": dataset.id,
    }))
}

fn handle_reports_export(state: &mut AppState, req: &Request) -> Value {
    match export(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_reports_read(_state: &mut AppState, req: &Request) -> Value {
    let path = match get_required_str(&req.params, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };
    match read_report(&path) {
        Ok(sheet) => ok(
            &req.id,
            json!({
                "path": path.to_string_lossy(),
                "rowCount": sheet.rows.len(),
                "sheet": sheet,
            }),
        ),
        Err(e) => HandlerErr::new("read_failed", format!("{:#}", e))
            .with_details(json!({ "path": path.to_string_lossy() }))
            .response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.export" => Some(handle_reports_export(state, req)),
        "reports.read" => Some(handle_reports_read(state, req)),
        _ => None,
    }
}
