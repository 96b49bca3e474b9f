mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{spawn_sidecar, spawn_sidecar_with_env, temp_dir};

#[test]
fn data_methods_need_a_workspace() {
    let mut sc = spawn_sidecar();

    let health = sc.ok("health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    for method in ["students.list", "subjects.list", "settings.get", "calc.classPositions"] {
        assert_eq!(sc.err_code(method, json!({})), "no_workspace", "{}", method);
    }
    assert_eq!(sc.err_code("workspace.select", json!({})), "bad_params");

    sc.shutdown();
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let mut sc = spawn_sidecar();

    writeln!(sc.stdin, "{{not json").expect("write");
    sc.stdin.flush().expect("flush");
    let mut line = String::new();
    sc.reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );

    let _ = sc.ok("health", json!({}));
    sc.shutdown();
}

#[test]
fn workspace_env_var_opens_at_startup_and_seeds_once() {
    let workspace = temp_dir("gradebook-env-open");
    let path = workspace.to_string_lossy().to_string();

    let mut sc = spawn_sidecar_with_env(&[("GRADEBOOKD_WORKSPACE", path.as_str())]);
    let health = sc.ok("health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(path.as_str())
    );
    let subjects = sc.ok("subjects.list", json!({}));
    let count = subjects
        .get("subjects")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    assert!(count > 0);
    sc.shutdown();

    // Reopening the same workspace keeps the catalogue as it was.
    let mut sc = spawn_sidecar();
    let res = sc.select_workspace(&workspace);
    assert_eq!(res.get("seededSubjects").and_then(|v| v.as_u64()), Some(0));
    sc.shutdown();

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn school_settings_persist_and_validate_term() {
    let workspace = temp_dir("gradebook-settings");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);

    let defaults = sc.ok("settings.get", json!({}));
    assert_eq!(defaults.get("currentTerm").and_then(|v| v.as_i64()), Some(1));

    let updated = sc.ok(
        "settings.update",
        json!({ "patch": { "schoolName": "  Unity Grammar School ", "currentTerm": 2 } }),
    );
    assert_eq!(
        updated.get("schoolName").and_then(|v| v.as_str()),
        Some("Unity Grammar School")
    );
    assert_eq!(updated.get("currentTerm").and_then(|v| v.as_i64()), Some(2));

    assert_eq!(
        sc.err_code("settings.update", json!({ "patch": { "currentTerm": 4 } })),
        "invalid_argument"
    );
    sc.shutdown();

    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let reread = sc.ok("settings.get", json!({}));
    assert_eq!(reread.get("currentTerm").and_then(|v| v.as_i64()), Some(2));
    sc.shutdown();

    let _ = std::fs::remove_dir_all(workspace);
}
