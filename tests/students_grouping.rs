use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar(cwd: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_labgraded");
    let mut child = Command::new(exe)
        .current_dir(cwd)
        .env_remove("LABGRADE_WORKSPACE")
        .env_remove("LABGRADE_DB_FILE_NAME")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn labgraded");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn id_of(value: &serde_json::Value) -> String {
    value
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string()
}

#[test]
fn auto_group_splits_roster_by_name_order() {
    let workspace = temp_dir("labgrade-auto-group");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "name": "Networks", "code": "RED-300" }),
    ));
    let section_id = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sections.create",
        json!({ "courseId": course_id, "label": "C", "instructor": "P. Quispe" }),
    ));

    // Registered out of order; one already carries a stale group.
    for (i, name) in ["Elena", "Beto", "Dario", "Ana", "Carla"].iter().enumerate() {
        let group = if *name == "Dario" { json!("Old") } else { json!(null) };
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("4-{}", i),
            "students.register",
            json!({
                "name": name,
                "nationalId": format!("N{}", i),
                "sectionId": section_id,
                "group": group
            }),
        );
    }

    let zero = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.autoGroup",
        json!({ "sectionId": section_id, "groupSize": 0 }),
    );
    assert_eq!(error_code(&zero), "bad_params");

    let outcome = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.autoGroup",
        json!({ "sectionId": section_id, "groupSize": 2 }),
    );
    assert_eq!(outcome["groups"].as_u64(), Some(3));
    assert_eq!(outcome["students"].as_u64(), Some(5));

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "sectionId": section_id, "sort": "name" }),
    );
    let pairs: Vec<(String, String)> = roster["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| {
            (
                s["name"].as_str().unwrap_or("").to_string(),
                s["group"].as_str().unwrap_or("").to_string(),
            )
        })
        .collect();
    let expected: Vec<(String, String)> = [
        ("Ana", "Group 1"),
        ("Beto", "Group 1"),
        ("Carla", "Group 2"),
        ("Dario", "Group 2"),
        ("Elena", "Group 3"),
    ]
    .iter()
    .map(|(n, g)| (n.to_string(), g.to_string()))
    .collect();
    assert_eq!(pairs, expected);

    let last = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.listByGroup",
        json!({ "sectionId": section_id, "group": "Group 3" }),
    );
    assert_eq!(last["students"].as_array().map(|s| s.len()), Some(1));

    let groups = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "sections.groups",
        json!({ "sectionId": section_id }),
    );
    assert_eq!(groups["groups"], json!(["Group 1", "Group 2", "Group 3"]));

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.stats",
        json!({ "sectionId": section_id }),
    );
    assert_eq!(stats["section"].as_str(), Some("RED-300 - Section C"));
    assert_eq!(stats["totalStudents"].as_u64(), Some(5));
    assert_eq!(stats["totalGroups"].as_u64(), Some(3));
    assert_eq!(stats["ungroupedStudents"].as_u64(), Some(0));

    let bad_sort = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.list",
        json!({ "sectionId": section_id, "sort": "age" }),
    );
    assert_eq!(error_code(&bad_sort), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn duplicate_keys_are_rejected() {
    let workspace = temp_dir("labgrade-duplicates");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "name": "Intro to Programming", "code": "SIS-1110" }),
    ));
    let dup_course = request(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "name": "Another Intro", "code": "sis-1110" }),
    );
    assert_eq!(error_code(&dup_course), "duplicate_key");
    let list = request_ok(&mut stdin, &mut reader, "4", "courses.list", json!({}));
    assert_eq!(list["courses"].as_array().map(|c| c.len()), Some(1));

    let by_code = request_ok(
        &mut stdin,
        &mut reader,
        "4b",
        "courses.getByCode",
        json!({ "code": "sis-1110" }),
    );
    assert_eq!(by_code["course"]["id"].as_str(), Some(course_id.as_str()));

    let section_a = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.create",
        json!({ "courseId": course_id, "label": "A", "instructor": "J. Smith" }),
    ));
    let section_b = id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "sections.create",
        json!({ "courseId": course_id, "label": "B", "instructor": "K. Lee" }),
    ));
    let dup_section = request(
        &mut stdin,
        &mut reader,
        "7",
        "sections.create",
        json!({ "courseId": course_id, "label": "a", "instructor": "Someone" }),
    );
    assert_eq!(error_code(&dup_section), "duplicate_key");

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.register",
        json!({ "name": "Ana Paz", "nationalId": "1234567", "sectionId": section_a }),
    );
    let dup_student = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.register",
        json!({ "name": "Ana Paz", "nationalId": "1234567", "sectionId": section_b }),
    );
    assert_eq!(error_code(&dup_student), "duplicate_key");

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.searchById",
        json!({ "nationalId": " 1234567 " }),
    );
    assert_eq!(found["student"]["sectionId"].as_str(), Some(section_a.as_str()));

    let unknown_field = request(
        &mut stdin,
        &mut reader,
        "11",
        "courses.update",
        json!({ "courseId": course_id, "changes": { "credits": 4 } }),
    );
    assert_eq!(error_code(&unknown_field), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
