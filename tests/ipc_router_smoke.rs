mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let mut sc = spawn_sidecar();

    let _ = sc.ok("health", json!({}));
    let _ = sc.select_workspace(&workspace);
    let sid = sc.create_student("R001", "Router Smoke", "JSS1");
    let subjects = sc.subject_ids();

    let calls = vec![
        ("settings.get", json!({})),
        ("settings.update", json!({ "patch": { "schoolName": "Smoke College" } })),
        ("students.list", json!({})),
        ("students.update", json!({ "studentId": sid, "patch": { "name": "Router Smoke II" } })),
        ("classes.list", json!({})),
        ("subjects.list", json!({})),
        ("subjects.create", json!({ "code": "rob", "name": "Robotics" })),
        ("marks.get", json!({ "studentId": sid, "term": 1 })),
        (
            "marks.save",
            json!({
                "studentId": sid,
                "term": 1,
                "entries": [{ "subjectId": subjects[0], "ca": 20, "exam": 45 }]
            }),
        ),
        ("calc.grade", json!({ "score": 65 })),
        ("calc.termAverage", json!({ "studentId": sid, "term": 1 })),
        ("calc.cumulativeAverage", json!({ "studentId": sid, "term": 2 })),
        ("calc.classPositions", json!({ "className": "JSS1", "term": 1 })),
        ("reports.broadsheet", json!({ "className": "JSS1", "term": 1 })),
        ("reports.studentResults", json!({ "studentId": sid })),
        ("attendance.classOpen", json!({ "className": "JSS1", "dates": ["2024-09-02"] })),
        (
            "attendance.save",
            json!({ "entries": [{ "studentId": sid, "date": "2024-09-02", "present": true }] }),
        ),
        ("fees.classOpen", json!({ "className": "JSS1", "term": 1 })),
        ("fees.update", json!({ "studentId": sid, "term": 1, "amountPaid": 0 })),
        ("students.delete", json!({ "studentId": sid })),
    ];
    for (method, params) in calls {
        let _ = sc.ok(method, params);
    }

    let res = sc.call("grades.explode", json!({}));
    assert_eq!(
        res.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    sc.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
}
