//! Tests for severity classification of script output.

use periphery_tester::classify::{classify, LogRecord, Severity};

#[test]
fn every_tag_maps_to_its_severity() {
    let table = [
        ("[ERROR]", Severity::Error),
        ("[OK]", Severity::Ok),
        ("[FAIL]", Severity::Fail),
        ("[SUCCESS]", Severity::Success),
        ("[START]", Severity::Start),
    ];

    for (tag, expected) in table {
        let line = format!("{tag} rest");
        let (severity, text) = classify(&line);
        assert_eq!(severity, expected, "tag {tag}");
        assert_eq!(text, line);
    }
}

#[test]
fn untagged_lines_are_plain_and_unchanged() {
    let lines = [
        "plain text",
        "Состояние процесса",
        "[DEBUG] not in the table",
        "[OK]USB glued to tag",
        "OK USB",
        "   ",
        "\t[OK] indented",
    ];

    for line in lines {
        assert_eq!(classify(line), (Severity::Plain, line), "line {line:?}");
    }
}

#[test]
fn empty_line_is_plain() {
    assert_eq!(classify(""), (Severity::Plain, ""));
}

#[test]
fn script_output_samples() {
    let samples = [
        ("[START] USB test started", Severity::Start),
        ("[OK] USB OK", Severity::Ok),
        (
            "[ERROR] total USB device count must be 8, but there are 6",
            Severity::Error,
        ),
        ("[SUCCESS] USB test passed", Severity::Success),
        ("[FAIL] COMPLEX test failed", Severity::Fail),
    ];

    for (line, expected) in samples {
        let record = LogRecord::from_line(line);
        assert_eq!(record.severity, expected);
        assert_eq!(record.text, line);
    }
}

#[test]
fn severity_display_names() {
    let names: Vec<String> = Severity::ALL.iter().map(ToString::to_string).collect();
    assert_eq!(names, ["error", "ok", "fail", "success", "start", "plain"]);
}
