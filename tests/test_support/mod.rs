#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Sidecar {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Expects an error response and returns its code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    pub fn select_workspace(&mut self, workspace: &Path) -> serde_json::Value {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        )
    }

    pub fn create_student(&mut self, student_no: &str, name: &str, class_name: &str) -> String {
        let res = self.ok(
            "students.create",
            json!({ "studentNo": student_no, "name": name, "className": class_name }),
        );
        res.get("studentId")
            .and_then(|v| v.as_str())
            .expect("studentId")
            .to_string()
    }

    pub fn subject_ids(&mut self) -> Vec<String> {
        let res = self.ok("subjects.list", json!({}));
        res.get("subjects")
            .and_then(|v| v.as_array())
            .expect("subjects array")
            .iter()
            .map(|s| s.get("id").and_then(|v| v.as_str()).expect("id").to_string())
            .collect()
    }

    /// Saves one subject per total, with the whole total entered as exam.
    pub fn save_totals(&mut self, student_id: &str, term: i64, subject_ids: &[String], totals: &[f64]) {
        let entries: Vec<serde_json::Value> = totals
            .iter()
            .zip(subject_ids)
            .map(|(t, sid)| json!({ "subjectId": sid, "ca": 0, "exam": t }))
            .collect();
        let _ = self.ok(
            "marks.save",
            json!({ "studentId": student_id, "term": term, "entries": entries }),
        );
    }

    pub fn shutdown(self) {
        let Sidecar {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        let _ = child.wait();
    }
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(envs: &[(&str, &str)]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("GRADEBOOKD_WORKSPACE");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}
