//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use quintet::api::{
    AssertRequest, ExportResponse, HealthResponse, QueryRequest, QueryResponse, RetractRequest,
    StatementJson, StatusResponse, SubjectJson, SubscribeRequest, ValueJson, parse_operator,
};
use quintet_core::{
    ConditionKind, Mutation, Operator, QueryMode, Subject, SubjectId, Term, Value, Variable,
    primitives::MAX_BATCH_LENGTH,
};

// =============================================================================
// HEALTH / STATUS TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

#[test]
fn test_status_response_serialization() {
    let status = StatusResponse {
        facts: 12,
        targets: 3,
        properties: 4,
        symbols: 40,
        texts: 2,
        generated: 0,
        subscriptions: 1,
        now: 12,
    };

    let json = serde_json::to_string(&status).unwrap();
    assert!(json.contains("\"facts\":12"));
    assert!(json.contains("\"subscriptions\":1"));
    assert!(json.contains("\"now\":12"));
}

// =============================================================================
// SUBJECT NOTATION TESTS
// =============================================================================

#[test]
fn test_subject_json_notation() {
    let cases = [
        ("\"person1\"", Subject::symbol("person1")),
        ("{\"text\":\"hello\"}", Subject::text("hello")),
        ("3", Subject::int(3)),
        ("2.5", Subject::float(2.5)),
        ("true", Subject::bool(true)),
        ("{\"generated\":7}", Subject::Generated(SubjectId(7))),
    ];

    for (json, expected) in cases {
        let parsed: SubjectJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.to_subject().unwrap(), expected, "parsing {}", json);
    }
}

#[test]
fn test_subject_json_round_trips_through_subject() {
    let subject = Subject::text("hello");
    let json = serde_json::to_string(&SubjectJson::from(&subject)).unwrap();
    assert_eq!(json, r#"{"text":"hello"}"#);
}

#[test]
fn test_empty_symbol_rejected() {
    assert!(SubjectJson::from("").to_subject().is_err());
}

#[test]
fn test_oversized_text_rejected() {
    let text = SubjectJson::Text {
        text: "x".repeat(65_537),
    };
    assert!(text.to_subject().is_err());
}

#[test]
fn test_term_notation() {
    assert_eq!(SubjectJson::from("?self").to_term().unwrap(), Term::this());
    assert_eq!(
        SubjectJson::from("job").to_term().unwrap(),
        Term::Subject(Subject::symbol("job"))
    );
    // A lone question mark is an ordinary name.
    assert_eq!(
        SubjectJson::from("?").to_term().unwrap(),
        Term::Subject(Subject::symbol("?"))
    );
}

// =============================================================================
// VALUE NOTATION TESTS
// =============================================================================

#[test]
fn test_value_json_notation() {
    let parse = |json: &str| {
        serde_json::from_str::<ValueJson>(json)
            .unwrap()
            .to_value()
            .unwrap()
    };

    assert_eq!(parse("\"*\""), Value::Wildcard);
    assert_eq!(parse("\"?name\""), Value::Variable(Variable::new("name")));
    assert_eq!(
        parse(r#"{"path":["foo","a"]}"#),
        Value::path(Subject::symbol("foo"), Subject::symbol("a"))
    );
    assert_eq!(
        parse(r#"{"eval":"companies"}"#),
        Value::Evaluate(Subject::symbol("companies"))
    );
    assert_eq!(parse("42"), Value::Subject(Subject::int(42)));
}

// =============================================================================
// OPERATOR TESTS
// =============================================================================

#[test]
fn test_parse_operator() {
    assert_eq!(parse_operator("=").unwrap(), Operator::Assign);
    assert_eq!(parse_operator("==").unwrap(), Operator::Equal);
    assert_eq!(parse_operator("?=").unwrap(), Operator::ReverseEvaluate);
    assert_eq!(parse_operator("/=").unwrap(), Operator::Retract);
    assert_eq!(parse_operator("says").unwrap(), Operator::predicate("says"));
    assert!(parse_operator("").is_err());
}

// =============================================================================
// STATEMENT / ASSERT TESTS
// =============================================================================

#[test]
fn test_statement_json_defaults() {
    let json = r#"{"target":"a","property":"p","value":1}"#;
    let statement: StatementJson = serde_json::from_str(json).unwrap();

    assert_eq!(statement.operator, "=");
    assert!(statement.meta.is_empty());
    assert_eq!(statement.slot, 0);

    let converted = statement.to_statement().unwrap();
    assert_eq!(converted.operator, Operator::Assign);
    assert_eq!(converted.value, Value::Subject(Subject::int(1)));
}

#[test]
fn test_statement_json_meta_and_slot() {
    let json = r##"{"target":"doc","property":"body","value":{"text":"plans"},
                   "meta":["secret","#NOW"],"slot":2}"##;
    let statement: StatementJson = serde_json::from_str(json).unwrap();
    let converted = statement.to_statement().unwrap();

    assert_eq!(converted.slot, 2);
    assert!(converted.meta.contains(&Subject::symbol("secret")));
    assert!(converted.meta.contains(&Subject::symbol("#NOW")));
}

#[test]
fn test_assert_request_limits() {
    let empty = AssertRequest { statements: vec![] };
    assert!(empty.to_statements().is_err());

    let statement: StatementJson =
        serde_json::from_str(r#"{"target":"a","property":"p","value":1}"#).unwrap();
    let oversized = AssertRequest {
        statements: vec![statement; MAX_BATCH_LENGTH + 1],
    };
    assert!(oversized.to_statements().is_err());
}

#[test]
fn test_retract_request_defaults_to_wildcard() {
    let request: RetractRequest =
        serde_json::from_str(r#"{"target":"a","property":"p"}"#).unwrap();
    let (target, property, value) = request.to_parts().unwrap();

    assert_eq!(target, Subject::symbol("a"));
    assert_eq!(property, Subject::symbol("p"));
    assert_eq!(value, Value::Wildcard);
}

// =============================================================================
// QUERY TESTS
// =============================================================================

#[test]
fn test_query_request_defaults() {
    let request: QueryRequest = serde_json::from_str(r#"{"subject":"people"}"#).unwrap();

    assert_eq!(request.mode, QueryMode::Evaluate);
    assert!(request.property.is_none());
    assert!(!request.force);
    assert!(!request.all);
    assert!(request.as_of.is_none());
}

#[test]
fn test_query_request_literal_mode() {
    let request: QueryRequest =
        serde_json::from_str(r#"{"subject":"alice","mode":"literal","as_of":3}"#).unwrap();

    assert_eq!(request.mode, QueryMode::Literal);
    assert_eq!(request.as_of, Some(3));
}

#[test]
fn test_query_response_error() {
    let response = QueryResponse::error("boom");
    let json = serde_json::to_string(&response).unwrap();

    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"error\":\"boom\""));
    // Empty solutions are left out.
    assert!(!json.contains("solutions"));
}

// =============================================================================
// SUBSCRIPTION TESTS
// =============================================================================

#[test]
fn test_subscribe_request_to_spec() {
    let json = r#"{
        "query": "readyJobs",
        "limit": 3,
        "program": [
            {"op": "assert", "target": "?self", "property": "done", "value": true},
            {"op": "retract", "target": "?self", "property": "status"}
        ]
    }"#;
    let request: SubscribeRequest = serde_json::from_str(json).unwrap();
    let spec = request.to_spec(Some(Subject::symbol("ann"))).unwrap();

    assert_eq!(spec.query, Some(Subject::symbol("readyJobs")));
    assert_eq!(spec.kind, ConditionKind::Truthy);
    assert_eq!(spec.limit, Some(3));
    assert_eq!(spec.reader, Some(Subject::symbol("ann")));
    assert_eq!(
        spec.program,
        vec![
            Mutation::assign(Term::this(), "done", Subject::bool(true)),
            Mutation::retract(Term::this(), "status", Value::Wildcard),
        ]
    );
}

#[test]
fn test_subscribe_request_timer_kind() {
    let json = r#"{"program": [], "kind": {"kind": "timer", "every_ms": 500}}"#;
    let request: SubscribeRequest = serde_json::from_str(json).unwrap();
    let spec = request.to_spec(None).unwrap();

    assert!(spec.query.is_none());
    assert_eq!(spec.kind, ConditionKind::Timer { every_ms: 500 });
}

#[test]
fn test_subscribe_request_unknown_op_rejected() {
    let json = r#"{"program": [{"op": "delete", "target": "a", "property": "p"}]}"#;
    assert!(serde_json::from_str::<SubscribeRequest>(json).is_err());
}

// =============================================================================
// EXPORT RESPONSE TESTS
// =============================================================================

#[test]
fn test_export_response_success() {
    let response = ExportResponse::success(vec![1, 2, 3], 99, "ab".to_string());

    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some("AQID"));
    assert_eq!(response.checksum, Some(99));
    assert_eq!(response.hash.as_deref(), Some("ab"));
    assert!(response.error.is_none());
}

#[test]
fn test_export_response_error() {
    let response = ExportResponse::error("Export failed");

    assert!(!response.success);
    assert!(response.data.is_none());
    assert!(response.checksum.is_none());
    assert_eq!(response.error.as_deref(), Some("Export failed"));
}
