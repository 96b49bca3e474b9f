mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn registration_rejects_duplicate_student_numbers() {
    let workspace = temp_dir("gradebook-students-dup");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);

    let _ = sc.create_student("S001", "Ngozi Okafor", "JSS1");
    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "studentNo": "S001", "name": "Someone Else", "className": "JSS2" })
        ),
        "conflict"
    );
    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "studentNo": "S002", "name": "   ", "className": "JSS2" })
        ),
        "bad_params"
    );

    sc.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn list_update_and_class_counts() {
    let workspace = temp_dir("gradebook-students-list");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);

    let zara = sc.create_student("S010", "Zara", "SSS1");
    let _ = sc.create_student("S011", "Ali", "SSS1");
    let _ = sc.create_student("S012", "Musa", "JSS3");

    let res = sc.ok("students.list", json!({ "className": "SSS1" }));
    let names: Vec<&str> = res
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| s.get("name").and_then(|v| v.as_str()).expect("name"))
        .collect();
    assert_eq!(names, vec!["Ali", "Zara"]);

    let _ = sc.ok(
        "students.update",
        json!({ "studentId": zara, "patch": { "className": "SSS2" } }),
    );

    let classes = sc.ok("classes.list", json!({}));
    let counts: Vec<(String, i64)> = classes
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes")
        .iter()
        .map(|c| {
            (
                c.get("name").and_then(|v| v.as_str()).expect("name").to_string(),
                c.get("studentCount").and_then(|v| v.as_i64()).expect("count"),
            )
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            ("JSS3".to_string(), 1),
            ("SSS1".to_string(), 1),
            ("SSS2".to_string(), 1)
        ]
    );

    let all = sc.ok("students.list", json!({}));
    assert_eq!(
        all.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );

    sc.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleting_a_student_removes_their_records() {
    let workspace = temp_dir("gradebook-students-delete");
    let mut sc = spawn_sidecar();
    sc.select_workspace(&workspace);
    let subjects = sc.subject_ids();

    let gone = sc.create_student("D001", "Leaving", "JSS2");
    let stays = sc.create_student("D002", "Staying", "JSS2");
    sc.save_totals(&gone, 1, &subjects, &[95.0]);
    sc.save_totals(&stays, 1, &subjects, &[50.0]);
    let _ = sc.ok(
        "attendance.save",
        json!({ "entries": [{ "studentId": gone, "date": "2024-09-09", "present": true }] }),
    );
    let _ = sc.ok(
        "fees.update",
        json!({ "studentId": gone, "term": 1, "amountPaid": 100 }),
    );

    let _ = sc.ok("students.delete", json!({ "studentId": gone }));
    assert_eq!(
        sc.err_code("students.delete", json!({ "studentId": gone })),
        "not_found"
    );

    let res = sc.ok(
        "calc.classPositions",
        json!({ "className": "JSS2", "term": 1 }),
    );
    let positions = res.get("positions").and_then(|v| v.as_object()).expect("positions");
    assert_eq!(positions.len(), 1);
    assert_eq!(positions.get(&stays).and_then(|v| v.as_i64()), Some(1));

    let att = sc.ok("attendance.classOpen", json!({ "className": "JSS2" }));
    assert_eq!(
        att.get("dates").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    sc.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
}
