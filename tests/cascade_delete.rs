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

struct Seeded {
    course_id: String,
    section_id: String,
    student_ids: Vec<String>,
    lab_id: String,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &Path) -> Seeded {
    request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = id_of(&request_ok(
        stdin,
        reader,
        "s2",
        "courses.create",
        json!({ "name": "Intro to Programming", "code": "SIS-1110" }),
    ));
    let section_id = id_of(&request_ok(
        stdin,
        reader,
        "s3",
        "sections.create",
        json!({ "courseId": course_id, "label": "A", "instructor": "J. Smith" }),
    ));
    let lab_id = id_of(&request_ok(
        stdin,
        reader,
        "s4",
        "labs.create",
        json!({ "courseId": course_id, "title": "Variables" }),
    ));
    let mut student_ids = Vec::new();
    for (i, name) in ["Ana Paz", "Bruno Diaz", "Carla Mendez"].iter().enumerate() {
        let student_id = id_of(&request_ok(
            stdin,
            reader,
            &format!("s5-{}", i),
            "students.register",
            json!({ "name": name, "nationalId": format!("ID-{}", i), "sectionId": section_id }),
        ));
        request_ok(
            stdin,
            reader,
            &format!("s6-{}", i),
            "grades.register",
            json!({ "labId": lab_id, "studentId": student_id, "score": 70 + i }),
        );
        student_ids.push(student_id);
    }
    Seeded {
        course_id,
        section_id,
        student_ids,
        lab_id,
    }
}

#[test]
fn lab_delete_reports_grades_then_cascades_on_request() {
    let workspace = temp_dir("labgrade-lab-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let deps = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "labs.dependencies",
        json!({ "labId": seeded.lab_id }),
    );
    assert_eq!(deps["grades"].as_i64(), Some(3));

    let refused = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "labs.delete",
        json!({ "labId": seeded.lab_id }),
    );
    assert_eq!(refused["success"].as_bool(), Some(false));
    assert_eq!(refused["dependencies"]["grades"].as_i64(), Some(3));

    let still_there = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.listByLab",
        json!({ "labId": seeded.lab_id }),
    );
    assert_eq!(still_there["grades"].as_array().map(|g| g.len()), Some(3));

    let done = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "labs.delete",
        json!({ "labId": seeded.lab_id, "policy": "cascade" }),
    );
    assert_eq!(done["success"].as_bool(), Some(true));
    assert_eq!(done["removed"]["grades"].as_u64(), Some(3));
    assert_eq!(done["removed"]["labs"].as_u64(), Some(1));

    for (i, student_id) in seeded.student_ids.iter().enumerate() {
        let grades = request_ok(
            &mut stdin,
            &mut reader,
            &format!("5-{}", i),
            "grades.listByStudent",
            json!({ "studentId": student_id }),
        );
        assert_eq!(grades["grades"], json!([]));
    }

    let gone = request(
        &mut stdin,
        &mut reader,
        "6",
        "labs.get",
        json!({ "labId": seeded.lab_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn course_cascade_leaves_no_orphans() {
    let workspace = temp_dir("labgrade-course-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let refused = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.delete",
        json!({ "courseId": seeded.course_id, "policy": "abort" }),
    );
    assert_eq!(refused["success"].as_bool(), Some(false));
    assert_eq!(refused["dependencies"]["sections"].as_i64(), Some(1));
    assert_eq!(refused["dependencies"]["labs"].as_i64(), Some(1));
    assert_eq!(refused["dependencies"]["students"].as_i64(), Some(3));

    let done = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.delete",
        json!({ "courseId": seeded.course_id, "policy": "cascade" }),
    );
    assert_eq!(done["success"].as_bool(), Some(true));
    assert_eq!(done["removed"]["grades"].as_u64(), Some(3));
    assert_eq!(done["removed"]["students"].as_u64(), Some(3));
    assert_eq!(done["removed"]["sections"].as_u64(), Some(1));
    assert_eq!(done["removed"]["courses"].as_u64(), Some(1));

    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sections.list",
        json!({ "courseId": seeded.course_id }),
    );
    assert_eq!(sections["sections"], json!([]));
    let labs = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "labs.list",
        json!({ "courseId": seeded.course_id }),
    );
    assert_eq!(labs["labs"], json!([]));
    let students = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "sectionId": seeded.section_id }),
    );
    assert_eq!(students["students"], json!([]));

    let stats = request_ok(&mut stdin, &mut reader, "6", "courses.stats", json!({}));
    assert_eq!(stats["totalCourses"].as_i64(), Some(0));
    assert_eq!(stats["totalStudents"].as_i64(), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bad_delete_policy_is_rejected() {
    let workspace = temp_dir("labgrade-bad-policy");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "sections.delete",
        json!({ "sectionId": seeded.section_id, "policy": "force" }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentId": "does-not-exist", "policy": "cascade" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
