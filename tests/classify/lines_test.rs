//! Tests for chunked line splitting.

use periphery_tester::classify::{classify, LineBuffer, Severity};

#[test]
fn two_terminated_lines_yield_two_records() {
    let mut buffer = LineBuffer::new();
    let records: Vec<(Severity, String)> = buffer
        .push(b"[OK] step1\n[FAIL] step2\n")
        .iter()
        .map(|line| {
            let (severity, text) = classify(line);
            (severity, text.to_string())
        })
        .collect();

    assert_eq!(
        records,
        vec![
            (Severity::Ok, "[OK] step1".to_string()),
            (Severity::Fail, "[FAIL] step2".to_string()),
        ]
    );
    assert_eq!(buffer.finish(), None);
}

#[test]
fn byte_at_a_time_matches_whole_chunk() {
    let input = b"[START] CAN test started\r\n[OK] CAN: OK\n[SUCCESS] CAN test passed\n";

    let mut whole = LineBuffer::new();
    let expected = whole.push(input);

    let mut bytewise = LineBuffer::new();
    let mut actual = Vec::new();
    for byte in input {
        actual.extend(bytewise.push(std::slice::from_ref(byte)));
    }

    assert_eq!(actual, expected);
    assert_eq!(
        actual,
        vec![
            "[START] CAN test started",
            "[OK] CAN: OK",
            "[SUCCESS] CAN test passed"
        ]
    );
}

#[test]
fn fragment_waits_for_terminator() {
    let mut buffer = LineBuffer::new();
    assert!(buffer.push(b"[FAIL] UART").is_empty());
    assert_eq!(buffer.pending_len(), 11);
    assert_eq!(buffer.push(b" test failed\n"), vec!["[FAIL] UART test failed"]);
    assert_eq!(buffer.pending_len(), 0);
}

#[test]
fn invalid_utf8_is_replaced() {
    let mut buffer = LineBuffer::new();
    let lines = buffer.push(b"[OK] \xff\n");
    assert_eq!(lines, vec!["[OK] \u{fffd}"]);
}
