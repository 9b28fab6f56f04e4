use assert_cmd::Command;
use std::io::Write;

fn write_script(path: &std::path::Path, lines: &[&str]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

#[test]
fn replay_clean_session_reports_graded() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("session.jsonl");
    write_script(
        &script,
        &[
            r#"# clean run: enrol, type, submit"#,
            r#"{"at_ms":0,"event":"identity","address":"ADDR1"}"#,
            r#"{"at_ms":10,"event":"start"}"#,
            r#"{"at_ms":20,"event":"pledge"}"#,
            r#"{"at_ms":100,"event":"key","key":"r"}"#,
            r#"{"at_ms":240,"event":"key","key":"e"}"#,
            r#"{"at_ms":350,"event":"key","key":"t"}"#,
            r#"{"at_ms":520,"event":"key","key":"u"}"#,
            r#"{"at_ms":660,"event":"key","key":"r"}"#,
            r#"{"at_ms":810,"event":"key","key":"n"}"#,
            r#"{"at_ms":30000,"event":"submit"}"#,
        ],
    );
    let json_report = dir.path().join("report.json");

    Command::cargo_bin("invigil")
        .unwrap()
        .arg("--script")
        .arg(&script)
        .arg("--json-report")
        .arg(&json_report)
        .arg("--report-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("GRADED"))
        .stdout(predicates::str::contains("PASS 92"));

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&json_report).unwrap()).unwrap();
    assert_eq!(report["trust_score"], 100);
    assert_eq!(report["strikes"], 0);

    let csv = std::fs::read_to_string(dir.path().join("log.csv")).unwrap();
    assert!(csv.lines().count() >= 2);
    assert!(csv.contains("GRADED"));
}

#[test]
fn replay_violation_heavy_session_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("session.jsonl");
    write_script(
        &script,
        &[
            r#"{"at_ms":0,"event":"identity","address":"ADDR1"}"#,
            r#"{"at_ms":10,"event":"start"}"#,
            r#"{"at_ms":20,"event":"pledge"}"#,
            r#"{"at_ms":2000,"event":"visibility","hidden":true}"#,
            r#"{"at_ms":2100,"event":"visibility","hidden":false}"#,
            r#"{"at_ms":5000,"event":"blur","document_hidden":false}"#,
            r#"{"at_ms":8000,"event":"paste","text":"import solutions","within_editor":true}"#,
            r#"{"at_ms":9000,"event":"submit"}"#,
        ],
    );

    Command::cargo_bin("invigil")
        .unwrap()
        .arg("--script")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicates::str::contains("TERMINATED"));
}

#[test]
fn replay_rejects_malformed_script() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("bad.jsonl");
    write_script(&script, &[r#"{"at_ms":0,"event":"start"}"#, "not json at all"]);

    Command::cargo_bin("invigil")
        .unwrap()
        .arg("--script")
        .arg(&script)
        .assert()
        .failure();
}

#[test]
fn replay_missing_script_fails() {
    Command::cargo_bin("invigil")
        .unwrap()
        .arg("--script")
        .arg("/nonexistent/session.jsonl")
        .assert()
        .failure();
}
