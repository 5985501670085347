mod test_support;

use serde_json::json;
use std::process::{Command, Stdio};
use test_support::{
    request_err, request_ok, spawn_sidecar, spawn_sidecar_with_args, temp_dir, write_pdf,
    CLASS_SHEET,
};

#[test]
fn setup_get_returns_defaults() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let all = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(all["layout"]["kind"], json!("labeled"));
    assert_eq!(all["grading"]["passMarkPercent"], json!(35.0));
    assert_eq!(all["grading"]["distinctionMin"], json!(75.0));
    assert_eq!(all["report"]["defaultFormat"], json!("xlsx"));
    assert_eq!(all["report"]["sheetName"], json!("Results"));
    assert_eq!(all["report"]["topN"], json!(10));

    let one = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.get",
        json!({ "section": "report" }),
    );
    assert!(one.get("report").is_some());
    assert!(one.get("grading").is_none());

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "setup.get",
        json!({ "section": "printer" }),
    );
    assert_eq!(e["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn setup_update_validates_and_merges() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "grading", "patch": { "passMarkPercent": 40 } }),
    );
    assert_eq!(res["section"], json!("grading"));
    assert_eq!(res["value"]["passMarkPercent"], json!(40.0));
    assert_eq!(res["value"]["firstMin"], json!(60.0));

    let rejected = [
        json!({ "section": "grading", "patch": { "passMarkPercent": 140 } }),
        json!({ "section": "grading", "patch": { "firstMin": 90 } }),
        json!({ "section": "grading", "patch": { "passMark": 40 } }),
        json!({ "section": "layout", "patch": { "labeled": { "seat": "(unclosed" } } }),
        json!({ "section": "layout", "patch": { "labeled": { "seat": "seat (\\d+)" } } }),
        json!({ "section": "report", "patch": { "sheetName": "a/b" } }),
        json!({ "section": "report", "patch": "xlsx" }),
        json!({ "section": "nope", "patch": {} }),
    ];
    for (i, params) in rejected.iter().enumerate() {
        let e = request_err(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "setup.update",
            params.clone(),
        );
        assert_eq!(e["code"], json!("bad_params"), "{}", params);
    }

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.get",
        json!({ "section": "grading" }),
    );
    assert_eq!(after["grading"]["passMarkPercent"], json!(40.0));
    assert_eq!(after["grading"]["firstMin"], json!(60.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn dataset_keeps_grading_it_was_built_with() {
    let dir = temp_dir("resultd-grading");
    let pdf = write_pdf(&dir, "results.pdf", &[CLASS_SHEET]);
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "results.ingest",
        json!({ "path": pdf.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "grading", "patch": { "passMarkPercent": 65 } }),
    );
    let s = request_ok(&mut stdin, &mut reader, "3", "analytics.subjects", json!({}));
    assert_eq!(s["passMarkPercent"], json!(35.0));
    let d = request_ok(&mut stdin, &mut reader, "3b", "analytics.dashboard", json!({}));
    assert_eq!(d["bins"][0]["label"], json!("0-34"));

    // At 65% Amit's Eng 60 no longer passes.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.ingest",
        json!({ "path": pdf.to_string_lossy() }),
    );
    let s = request_ok(&mut stdin, &mut reader, "5", "analytics.subjects", json!({}));
    assert_eq!(s["passMarkPercent"], json!(65.0));
    assert_eq!(s["subjects"][1]["subject"], json!("Eng"));
    assert_eq!(s["subjects"][1]["passCount"], json!(2));

    let d = request_ok(&mut stdin, &mut reader, "6", "analytics.dashboard", json!({}));
    let labels: Vec<String> = d["bins"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|b| b["label"].as_str().map(str::to_string))
        .collect();
    assert_eq!(labels, vec!["0-49", "50-59", "60-64", "65-74", "75-100"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn config_file_is_loaded_at_startup() {
    let dir = temp_dir("resultd-config");
    let cfg = dir.join("resultd.json");
    std::fs::write(
        &cfg,
        r#"{ "report": { "defaultFormat": "csv", "topN": 2 }, "grading": { "passMarkPercent": 40 } }"#,
    )
    .expect("write config");
    let cfg_arg = cfg.to_string_lossy().to_string();
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with_args(&["--config", &cfg_arg]);

    let all = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(all["report"]["defaultFormat"], json!("csv"));
    assert_eq!(all["report"]["topN"], json!(2));
    assert_eq!(all["report"]["sheetName"], json!("Results"));
    assert_eq!(all["grading"]["passMarkPercent"], json!(40.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn invalid_config_file_stops_startup() {
    let dir = temp_dir("resultd-badconfig");
    let cfg = dir.join("resultd.json");
    std::fs::write(&cfg, r#"{ "grading": { "passMarkPercent": 150 } }"#).expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_resultd"))
        .arg("--config")
        .arg(&cfg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("run resultd");
    assert_eq!(status.code(), Some(2));

    let _ = std::fs::remove_dir_all(dir);
}
