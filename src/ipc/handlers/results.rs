use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::calc;
use crate::extract::{read_file, ExtractError, Extractor};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_count, get_required_str, view, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Dataset;

const SAMPLE_ROWS: usize = 5;
const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

fn ingest(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(&req.params, "path")?);
    let extractor = Extractor::from_config(&state.config.layout, &state.config.grading)
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;

    let bytes = read_file(&path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let extraction = extractor.extract(&bytes).map_err(|e| match e {
        ExtractError::Unreadable(_) => HandlerErr::new("pdf_unreadable", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() })),
        ExtractError::Io { .. } => HandlerErr::new("io_failed", e.to_string()),
    })?;

    let diagnostics = extraction.diagnostics();
    if !extraction.has_records() {
        warn!(
            "no student records found in {} ({} pages, {} blocks)",
            path.to_string_lossy(),
            extraction.pages,
            extraction.blocks_found
        );
        return Err(
            HandlerErr::new("no_data_found", "no student records found in document")
                .with_details(json!({
                    "path": path.to_string_lossy(),
                    "pages": extraction.pages,
                    "blocksFound": extraction.blocks_found,
                    "diagnostics": diagnostics,
                })),
        );
    }

    let dataset = Dataset {
        id: uuid::Uuid::new_v4().to_string(),
        fingerprint: format!("{:x}", Sha256::digest(&bytes)),
        source_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string()),
        ingested_at: Utc::now().to_rfc3339(),
        layout_kind: extractor.kind().as_str().to_string(),
        grading: state.config.grading.clone(),
        skipped_count: extraction.skipped.len(),
        warning_count: extraction.warnings.len(),
        records: extraction.records,
    };
    info!(
        "ingested {} as dataset {}: {} records",
        dataset.source_name,
        dataset.id,
        dataset.records.len()
    );

    let result = json!({
        "datasetId": dataset.id,
        "fingerprint": dataset.fingerprint,
        "sourceName": dataset.source_name,
        "layoutKind": dataset.layout_kind,
        "pages": extraction.pages,
        "blocksFound": extraction.blocks_found,
        "recordCount": dataset.records.len(),
        "skippedCount": dataset.skipped_count,
        "warningCount": dataset.warning_count,
        "subjects": dataset.subjects(),
        "diagnostics": diagnostics,
        "sample": calc::sample(&dataset.records, SAMPLE_ROWS),
    });
    state.dataset = Some(dataset);
    Ok(result)
}

fn handle_results_ingest(state: &mut AppState, req: &Request) -> Value {
    match ingest(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_results_summary(state: &mut AppState, req: &Request) -> Value {
    let ds = state.dataset.as_ref();
    let model = match ds {
        Some(d) => json!({
            "dataset": d,
            "recordCount": d.records.len(),
            "subjects": d.subjects(),
        }),
        None => json!({
            "dataset": null,
            "recordCount": 0,
            "subjects": [],
        }),
    };
    ok(&req.id, view(ds, model))
}

fn handle_results_records(state: &mut AppState, req: &Request) -> Value {
    let page = match get_optional_count(&req.params, "page") {
        Ok(v) => v.unwrap_or(1),
        Err(e) => return e.response(&req.id),
    };
    let page_size = match get_optional_count(&req.params, "pageSize") {
        Ok(v) => v.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        Err(e) => return e.response(&req.id),
    };
    let ds = state.dataset.as_ref();
    let records = ds.map(|d| d.records.as_slice()).unwrap_or(&[]);
    let rows: Vec<_> = records
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    ok(
        &req.id,
        view(
            ds,
            json!({
                "page": page,
                "pageSize": page_size,
                "total": records.len(),
                "records": rows,
            }),
        ),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "results.ingest" => Some(handle_results_ingest(state, req)),
        "results.summary" => Some(handle_results_summary(state, req)),
        "results.records" => Some(handle_results_records(state, req)),
        _ => None,
    }
}
