//! # API Endpoint Handlers
//!
//! Writes take the session write lock; reads share the read lock and run
//! against a snapshot fixed at the start of the call.

use super::{
    AppState,
    middleware::reader_from_headers,
    types::{
        AssertRequest, AssertResponse, ExplainRequest, ExplainResponse, ExportResponse,
        FiringJson, FiringsResponse, HealthResponse, QueryRequest, QueryResponse, RetractRequest,
        RetractResponse, StatusResponse, SubscribeRequest, SubscribeResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use quintet_core::{
    QueryMode, QuintetError, ReadOptions, Session, SubscriptionId, Timestamp,
    export::{canonical_checksum, compute_blake3_hash, export_canonical},
};

/// Status code for a failed write.
fn write_status(error: &QuintetError) -> StatusCode {
    match error {
        QuintetError::InvalidStatement(_)
        | QuintetError::ValidationRejected { .. }
        | QuintetError::InvalidSubscription(_) => StatusCode::BAD_REQUEST,
        QuintetError::UnknownSubscription(_) => StatusCode::NOT_FOUND,
        QuintetError::TriggerCascade(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store counters.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    (
        StatusCode::OK,
        Json(StatusResponse::from(session.engine().status())),
    )
}

// =============================================================================
// WRITES
// =============================================================================

/// Append a batch of statements.
pub async fn assert_handler(
    State(state): State<AppState>,
    Json(request): Json<AssertRequest>,
) -> impl IntoResponse {
    let statements = match request.to_statements() {
        Ok(statements) => statements,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AssertResponse::error(format!("Invalid statement: {}", e))),
            );
        }
    };

    let mut session = state.session.write().await;
    match session.assert_batch(statements) {
        Ok(ids) => (
            StatusCode::OK,
            Json(AssertResponse::success(ids.iter().map(|id| id.0).collect())),
        ),
        Err(e) => (
            write_status(&e),
            Json(AssertResponse::error(format!("Assert failed: {}", e))),
        ),
    }
}

/// Append a tombstone.
pub async fn retract_handler(
    State(state): State<AppState>,
    Json(request): Json<RetractRequest>,
) -> impl IntoResponse {
    let (target, property, value) = match request.to_parts() {
        Ok(parts) => parts,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RetractResponse::error(format!("Invalid retract: {}", e))),
            );
        }
    };

    let mut session = state.session.write().await;
    match session.retract(target, property, value) {
        Ok(id) => (StatusCode::OK, Json(RetractResponse::success(id.0))),
        Err(e) => (
            write_status(&e),
            Json(RetractResponse::error(format!("Retract failed: {}", e))),
        ),
    }
}

// =============================================================================
// READS
// =============================================================================

/// Literal read, single-property read or evaluation.
pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let session = state.session.read().await;
    match execute_query(&session, &request, read_options(&headers, &request)) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(QueryResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

fn read_options(headers: &HeaderMap, request: &QueryRequest) -> ReadOptions {
    ReadOptions {
        reader: reader_from_headers(headers),
        force: request.force,
        all: request.all,
        as_of: request.as_of.map(Timestamp),
        include_system_meta: request.include_system_meta,
    }
}

/// Run a query against the session's engine.
pub fn execute_query(
    session: &Session,
    request: &QueryRequest,
    options: ReadOptions,
) -> Result<QueryResponse, QuintetError> {
    let engine = session.engine();
    let subject = request.subject.to_subject()?;

    if let Some(property) = &request.property {
        let facts = engine.read(&subject, &property.to_subject()?, options)?;
        return Ok(QueryResponse::with_facts(&facts));
    }

    match request.mode {
        QueryMode::Literal => {
            let facts = engine.query(&subject, QueryMode::Literal, options)?;
            Ok(QueryResponse::with_facts(&facts))
        }
        QueryMode::Evaluate => {
            let evaluation = engine.evaluate(&subject, options)?;
            Ok(QueryResponse::with_evaluation(&evaluation))
        }
    }
}

/// Requirements plus the evaluation trace of a subject.
pub async fn explain_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExplainRequest>,
) -> impl IntoResponse {
    let subject = match request.subject.to_subject() {
        Ok(subject) => subject,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ExplainResponse::error(format!("Invalid subject: {}", e))),
            );
        }
    };
    let options = ReadOptions {
        reader: reader_from_headers(&headers),
        force: request.force,
        as_of: request.as_of.map(Timestamp),
        ..ReadOptions::default()
    };

    let session = state.session.read().await;
    match session.engine().explain(&subject, options) {
        Ok(explanation) => (StatusCode::OK, Json(ExplainResponse::success(&explanation))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ExplainResponse::error(format!("Explain failed: {}", e))),
        ),
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Register a trigger. The query is evaluated as the requesting identity.
pub async fn subscribe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> impl IntoResponse {
    let spec = match request.to_spec(reader_from_headers(&headers)) {
        Ok(spec) => spec,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SubscribeResponse::error(format!("Invalid subscription: {}", e))),
            );
        }
    };

    let mut session = state.session.write().await;
    match session.subscribe(spec) {
        Ok(id) => (StatusCode::OK, Json(SubscribeResponse::success(id.0))),
        Err(e) => (
            write_status(&e),
            Json(SubscribeResponse::error(format!("Subscribe failed: {}", e))),
        ),
    }
}

/// Remove a trigger.
pub async fn unsubscribe_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut session = state.session.write().await;
    match session.unsubscribe(SubscriptionId(id)) {
        Ok(()) => (StatusCode::OK, Json(SubscribeResponse::success(id))),
        Err(e) => (
            write_status(&e),
            Json(SubscribeResponse::error(e.to_string())),
        ),
    }
}

/// Drain the firing log.
pub async fn firings_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.write().await;
    let firings = session
        .take_firings()
        .iter()
        .map(FiringJson::from)
        .collect();
    (StatusCode::OK, Json(FiringsResponse { firings }))
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export the log in canonical format, with checksum and BLAKE3 hash.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let engine = session.engine();

    let exported = export_canonical(engine)
        .and_then(|data| canonical_checksum(engine).map(|checksum| (data, checksum)));
    match exported {
        Ok((data, checksum)) => {
            let hash = compute_blake3_hash(&data);
            (
                StatusCode::OK,
                Json(ExportResponse::success(data, checksum, hash)),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}
