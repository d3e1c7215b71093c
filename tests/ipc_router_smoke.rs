mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{
    read_response, request, request_err_code, request_ok, spawn_sidecar, spawn_sidecar_with_env,
    str_field, temp_dir,
};

#[test]
fn storage_methods_require_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert_eq!(str_field(&health, "version"), env!("CARGO_PKG_VERSION"));

    for (i, (method, params)) in [
        ("classes.list", json!({})),
        ("classes.create", json!({ "name": "A", "code": "B", "term": "C" })),
        ("students.list", json!({ "classId": "x" })),
        ("students.importPreview", json!({ "classId": "x", "inPath": "/tmp/r.csv" })),
        ("sessions.create", json!({ "classId": "x" })),
        ("attendance.open", json!({ "sessionId": "x" })),
        ("grades.open", json!({ "classId": "x" })),
        ("reports.classSummary", json!({ "classId": "x" })),
        ("reports.exportClass", json!({ "classId": "x" })),
    ]
    .into_iter()
    .enumerate()
    {
        let code = request_err_code(&mut stdin, &mut reader, &format!("nw{}", i), method, params);
        assert_eq!(code, "no_workspace", "{}", method);
    }
}

#[test]
fn unknown_methods_and_bad_lines() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err_code(&mut stdin, &mut reader, "1", "marks.teleport", json!({}));
    assert_eq!(code, "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));
    assert!(resp.get("id").is_none());

    // The daemon keeps serving after a bad line.
    let code = request_err_code(&mut stdin, &mut reader, "2", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn classes_list_newest_first_with_counts() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = temp_dir("classbook-classes");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let older = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Biology", "code": "BIO-1", "term": "Fall" }),
    );
    let newer = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "Chemistry", "code": "CHEM-1", "term": "Fall" }),
    );
    let older_id = str_field(&older["class"], "id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "classId": older_id, "studentId": "S1", "firstName": "A", "lastName": "B" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sessions.create",
        json!({ "classId": older_id, "date": "2026-09-01" }),
    );

    let list = request_ok(&mut stdin, &mut reader, "6", "classes.list", json!({}));
    let classes = list["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0]["id"], newer["class"]["id"]);
    assert_eq!(classes[1]["name"], json!("Biology"));
    assert_eq!(classes[1]["studentCount"], json!(1));
    assert_eq!(classes[1]["sessionCount"], json!(1));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.open",
        json!({ "classId": older_id }),
    );
    assert_eq!(opened["class"]["code"], json!("BIO-1"));

    let code = request_err_code(&mut stdin, &mut reader, "8", "classes.open", json!({ "classId": "nope" }));
    assert_eq!(code, "not_found");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "classes.create",
        json!({ "name": "  ", "code": "X", "term": "Y" }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn workspace_from_environment_is_opened_at_startup() {
    let workspace = temp_dir("classbook-env-workspace");
    let ws = workspace.to_string_lossy().to_string();
    let (_child, mut stdin, mut reader) =
        spawn_sidecar_with_env(&[("CLASSBOOKD_WORKSPACE", ws.as_str())]);

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["result"]["workspacePath"], json!(ws));
    let list = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert!(list["classes"].as_array().expect("classes").is_empty());
    assert!(workspace.join("classbook.sqlite3").is_file());
}
