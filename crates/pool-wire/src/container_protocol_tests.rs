use super::*;

#[test]
fn parses_multiple_ndjson_lines() {
    let body = "{\"event_type\":\"start\"}\n{\"event_type\":\"token\",\"text\":\"hi\"}\n";
    let events = parse_ndjson_events(body).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "start");
    assert_eq!(events[1].payload["text"], "hi");
}

#[test]
fn blank_lines_are_skipped() {
    let body = "{\"event_type\":\"start\"}\n\n\n{\"event_type\":\"end\"}\n";
    let events = parse_ndjson_events(body).unwrap();
    assert_eq!(events.len(), 2);
}

#[test]
fn malformed_line_is_an_error() {
    let body = "{\"event_type\":\"start\"}\nnot json\n";
    assert!(parse_ndjson_events(body).is_err());
}

#[test]
fn health_response_round_trips() {
    let resp = ContainerHealthResponse { status: "healthy".into(), lifecycle_state: "ready".into() };
    let json = serde_json::to_string(&resp).unwrap();
    let back: ContainerHealthResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back.status, "healthy");
    assert_eq!(back.lifecycle_state, "ready");
}
