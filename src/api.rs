// 🌐 HTTP API - axum router over the moderation workflow
//
// Routes (all under /api):
//   GET  /health
//   GET  /buildings/get/:buildingId
//   GET  /buildings/all/:sortBy/:sortDir
//   POST /buildings/add                                   (multipart)
//   POST /buildings/delete/add                            (JSON)
//   GET  /buildings/pending/get/:buildingId               (admin)
//   GET  /buildings/pending-additions/:sortBy/:sortDir
//   POST /buildings/pending-additions/approve/:sortBy/:sortDir
//   POST /buildings/pending-additions/remove/:sortBy/:sortDir
//   GET  /buildings/pending-deletions/:sortBy/:sortDir
//   POST /buildings/pending-deletions/approve/:sortBy/:sortDir
//   POST /buildings/pending-deletions/remove/:sortBy/:sortDir
//
// Caller identity comes from the fronting session layer as headers.

use crate::error::{FieldError, GateRejection, ModerationError, ModerationResult, Operation};
use crate::gate::{Action, CallerContext, VerificationGate};
use crate::moderation::{self, ADDITION_ACCEPTED, DELETION_ACCEPTED};
use crate::query::{self, Collection, ListQuery};
use crate::schema::{
    validate_addition, validate_id, validate_image, validate_proof, Proof, RawAddition, RawImage,
    MAX_IMAGE_BYTES,
};
use crate::temporal::CallerTimeZone;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const SESSION_USER_HEADER: &str = "x-session-user";
pub const SESSION_ADMIN_HEADER: &str = "x-session-admin";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub gate: VerificationGate,
}

impl AppState {
    pub fn new(conn: Connection, gate: VerificationGate) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            gate,
        }
    }

    /// Run `f` with the connection locked. Never held across an await.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> ModerationResult<T>) -> ModerationResult<T> {
        let conn = self
            .db
            .lock()
            .map_err(|_| ModerationError::StoreState("catalog lock poisoned".to_string()))?;
        f(&conn)
    }
}

/// Health response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    buildings: i64,
    pending_additions: i64,
    pending_deletions: i64,
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

pub fn caller_from_headers(headers: &HeaderMap) -> CallerContext {
    let user = headers
        .get(SESSION_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let is_admin = headers
        .get(SESSION_ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

    CallerContext { user, is_admin }
}

/// Hostname the request was addressed to, without the port
pub fn request_hostname(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim();

    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:3000
        return rest.split(']').next().unwrap_or_default().to_string();
    }
    host.split(':').next().unwrap_or_default().to_string()
}

/// Listing parameters carried in the query string
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub skip: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "searchText")]
    pub search_text: Option<String>,
    /// Minutes east of UTC
    #[serde(rename = "tzOffset")]
    pub tz_offset: Option<String>,
}

impl ListParams {
    fn time_zone(&self) -> CallerTimeZone {
        self.tz_offset
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .and_then(CallerTimeZone::from_offset_minutes)
            .unwrap_or_default()
    }

    fn list_query(
        &self,
        collection: Collection,
        sort_by: &str,
        sort_dir: &str,
    ) -> Result<ListQuery, Vec<FieldError>> {
        ListQuery::parse(
            collection,
            sort_by,
            sort_dir,
            self.skip.as_deref(),
            self.limit.as_deref(),
            self.search_text.as_deref(),
        )
    }
}

/// Body of every id-targeted mutation
#[derive(Debug, Default, Deserialize)]
pub struct ProofForm {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub time: serde_json::Value,
    #[serde(rename = "g-recaptcha-response", default)]
    pub token: serde_json::Value,
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

impl ProofForm {
    fn validate(&self) -> Result<(String, Proof), Vec<FieldError>> {
        let mut errors = Vec::new();
        let id = validate_id(&value_text(&self.id)).map_err(|e| errors.push(e)).ok();
        let proof = match validate_proof(&value_text(&self.time), &value_text(&self.token)) {
            Ok(proof) => Some(proof),
            Err(proof_errors) => {
                errors.extend(proof_errors);
                None
            }
        };

        match (id, proof) {
            (Some(id), Some(proof)) if errors.is_empty() => Ok((id, proof)),
            _ => Err(errors),
        }
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

fn status_for(err: &ModerationError) -> StatusCode {
    match err {
        ModerationError::Rejected(GateRejection::Unauthenticated) => StatusCode::UNAUTHORIZED,
        ModerationError::Rejected(GateRejection::Forbidden) => StatusCode::FORBIDDEN,
        ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_store_failure() => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Structured `{param, msg}` list keyed to the operation
fn operation_error(op: Operation, err: ModerationError) -> Response {
    if err.is_store_failure() {
        error!(operation = op.message_param(), error = %err, "Store failure");
    }
    (status_for(&err), Json(op.error_list(&err))).into_response()
}

/// Listings have no operation key, so field errors go out as-is
fn validation_error(errors: Vec<FieldError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(errors)).into_response()
}

/// Listings fail with a plain message, no structured errors
fn listing_error(collection: Collection, err: ModerationError) -> Response {
    error!(collection = collection.label(), error = %err, "Listing failed");
    (status_for(&err), Json(collection.failure_message())).into_response()
}

fn body_error(op: Operation) -> Response {
    let errors = vec![FieldError::new(op.message_param(), op.failure_message())];
    operation_error(op, errors.into())
}

// ============================================================================
// READ HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> Response {
    match state.with_conn(crate::db::catalog_counts) {
        Ok(counts) => Json(HealthResponse {
            status: "OK",
            buildings: counts.buildings,
            pending_additions: counts.pending_additions,
            pending_deletions: counts.pending_deletions,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json("Unavailable")).into_response()
        }
    }
}

/// GET /api/buildings/get/:buildingId
async fn get_building(
    State(state): State<AppState>,
    Path(building_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let id = match validate_id(&building_id) {
        Ok(id) => id,
        Err(e) => return operation_error(Operation::GetBuilding, vec![e].into()),
    };
    let tz = params.time_zone();

    match state.with_conn(|conn| query::get_building(conn, &id, &tz)) {
        Ok(view) => Json(view).into_response(),
        Err(e) => operation_error(Operation::GetBuilding, e),
    }
}

/// GET /api/buildings/pending/get/:buildingId
async fn get_pending_addition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(building_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let op = Operation::GetPendingAddition;
    if let Err(rejection) = state.gate.require_admin(&caller_from_headers(&headers)) {
        return operation_error(op, rejection.into());
    }
    let id = match validate_id(&building_id) {
        Ok(id) => id,
        Err(e) => return operation_error(op, vec![e].into()),
    };
    let tz = params.time_zone();

    match state.with_conn(|conn| query::get_pending_addition(conn, &id, &tz)) {
        Ok(view) => Json(view).into_response(),
        Err(e) => operation_error(op, e),
    }
}

fn list_collection(
    state: &AppState,
    collection: Collection,
    sort_by: &str,
    sort_dir: &str,
    params: &ListParams,
) -> Response {
    let list_query = match params.list_query(collection, sort_by, sort_dir) {
        Ok(q) => q,
        Err(errors) => return validation_error(errors),
    };
    let tz = params.time_zone();

    match state.with_conn(|conn| query::list(conn, collection, &list_query, &tz)) {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => listing_error(collection, e),
    }
}

/// GET /api/buildings/all/:sortBy/:sortDir
async fn list_buildings(
    State(state): State<AppState>,
    Path((sort_by, sort_dir)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Response {
    list_collection(&state, Collection::Buildings, &sort_by, &sort_dir, &params)
}

/// GET /api/buildings/pending-additions/:sortBy/:sortDir
async fn list_pending_additions(
    State(state): State<AppState>,
    Path((sort_by, sort_dir)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Response {
    list_collection(&state, Collection::PendingAdditions, &sort_by, &sort_dir, &params)
}

/// GET /api/buildings/pending-deletions/:sortBy/:sortDir
async fn list_pending_deletions(
    State(state): State<AppState>,
    Path((sort_by, sort_dir)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Response {
    list_collection(&state, Collection::PendingDeletions, &sort_by, &sort_dir, &params)
}

// ============================================================================
// SUBMISSIONS
// ============================================================================

/// Collect the multipart addition form
async fn read_addition_form(
    mut multipart: Multipart,
) -> Result<(RawAddition, Option<RawImage>), axum::extract::multipart::MultipartError> {
    let mut raw = RawAddition::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // browsers send an empty part when no file was chosen
                if !bytes.is_empty() {
                    image = Some(RawImage {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "id" => raw.id = Some(field.text().await?),
            "name" => raw.fields.name = field.text().await?,
            "occupancy" => raw.fields.occupancy = field.text().await?,
            "type" => raw.fields.building_type = field.text().await?,
            "tiles" | "tiles[]" => raw.fields.tiles.push(field.text().await?),
            "style" => raw.fields.style = field.text().await?,
            "time" => raw.time = field.text().await?,
            "g-recaptcha-response" => raw.token = field.text().await?,
            _ => {}
        }
    }

    Ok((raw, image))
}

/// POST /api/buildings/add
async fn add_building(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let op = Operation::AddBuilding;
    let caller = caller_from_headers(&headers);
    if !caller.is_authenticated() {
        return operation_error(op, GateRejection::Unauthenticated.into());
    }

    let (raw, image) = match read_addition_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            error!(error = %e, "Unreadable addition form");
            return body_error(op);
        }
    };

    let validated = validate_addition(&raw);
    let image_check = image.as_ref().map(validate_image).transpose();
    let submission = match (validated, image_check) {
        (Ok(submission), Ok(_)) => submission,
        (validated, image_check) => {
            let mut errors = validated.err().unwrap_or_default();
            errors.extend(image_check.err());
            return operation_error(op, errors.into());
        }
    };

    let now = match state
        .gate
        .authorize(Action::Add, &submission.proof, &caller, &request_hostname(&headers))
        .await
    {
        Ok(now) => now,
        Err(rejection) => return operation_error(op, rejection.into()),
    };

    let encoded = image.map(|img| base64::engine::general_purpose::STANDARD.encode(img.bytes));

    match state.with_conn(|conn| {
        moderation::submit_addition(conn, &submission, encoded, now, caller.actor())
    }) {
        Ok(_) => Json(ADDITION_ACCEPTED).into_response(),
        Err(e) => operation_error(op, e),
    }
}

/// POST /api/buildings/delete/add
async fn submit_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    let op = Operation::SubmitDeletion;
    let caller = caller_from_headers(&headers);
    if !caller.is_authenticated() {
        return operation_error(op, GateRejection::Unauthenticated.into());
    }

    let Ok(Json(form)) = body else {
        return body_error(op);
    };
    let (id, proof) = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => return operation_error(op, errors.into()),
    };

    let now = match state
        .gate
        .authorize(Action::Delete, &proof, &caller, &request_hostname(&headers))
        .await
    {
        Ok(now) => now,
        Err(rejection) => return operation_error(op, rejection.into()),
    };

    match state.with_conn(|conn| moderation::submit_deletion(conn, &id, now, caller.actor())) {
        Ok(_) => Json(DELETION_ACCEPTED).into_response(),
        Err(e) => operation_error(op, e),
    }
}

// ============================================================================
// MODERATION (admin)
// ============================================================================

/// Engine step run by one admin transition
type TransitionStep = fn(&Connection, &str, DateTime<Utc>, &str) -> ModerationResult<()>;

/// One admin endpoint: its error key, the gate action, the collection it
/// re-lists, and the engine step
struct Transition {
    op: Operation,
    action: Action,
    collection: Collection,
    step: TransitionStep,
}

impl Transition {
    fn approve_addition() -> Self {
        Transition {
            op: Operation::ApproveAddition,
            action: Action::Approve,
            collection: Collection::PendingAdditions,
            step: |conn, id, now, actor| moderation::approve_addition(conn, id, now, actor).map(|_| ()),
        }
    }

    fn remove_addition() -> Self {
        Transition {
            op: Operation::RemoveAddition,
            action: Action::Remove,
            collection: Collection::PendingAdditions,
            step: |conn, id, now, actor| moderation::remove_addition(conn, id, now, actor).map(|_| ()),
        }
    }

    fn approve_deletion() -> Self {
        Transition {
            op: Operation::ApproveDeletion,
            action: Action::Approve,
            collection: Collection::PendingDeletions,
            step: |conn, id, now, actor| moderation::approve_deletion(conn, id, now, actor).map(|_| ()),
        }
    }

    fn remove_deletion() -> Self {
        Transition {
            op: Operation::RemoveDeletion,
            action: Action::Remove,
            collection: Collection::PendingDeletions,
            step: |conn, id, now, actor| moderation::remove_deletion(conn, id, now, actor).map(|_| ()),
        }
    }
}

/// Shared flow for approve/remove: role check, validate, gate, transition,
/// then return the refreshed listing of the same collection.
async fn moderate(
    state: AppState,
    headers: HeaderMap,
    transition: Transition,
    (sort_by, sort_dir): (String, String),
    params: ListParams,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    let Transition { op, action, collection, step } = transition;
    let caller = caller_from_headers(&headers);
    if let Err(rejection) = state.gate.require_admin(&caller) {
        return operation_error(op, rejection.into());
    }

    let Ok(Json(form)) = body else {
        return body_error(op);
    };
    let validated = form.validate();
    let list_query = params.list_query(collection, &sort_by, &sort_dir);
    let ((id, proof), list_query) = match (validated, list_query) {
        (Ok(valid), Ok(q)) => (valid, q),
        (validated, list_query) => {
            let mut errors = validated.err().unwrap_or_default();
            errors.extend(list_query.err().unwrap_or_default());
            return operation_error(op, errors.into());
        }
    };

    let now = match state
        .gate
        .authorize(action, &proof, &caller, &request_hostname(&headers))
        .await
    {
        Ok(now) => now,
        Err(rejection) => return operation_error(op, rejection.into()),
    };

    let tz = params.time_zone();
    let actor = caller.actor();
    let result = state.with_conn(|conn| {
        step(conn, &id, now, actor)?;
        query::list(conn, collection, &list_query, &tz)
    });

    match result {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => operation_error(op, e),
    }
}

/// POST /api/buildings/pending-additions/approve/:sortBy/:sortDir
async fn approve_pending_addition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sort): Path<(String, String)>,
    Query(params): Query<ListParams>,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    moderate(state, headers, Transition::approve_addition(), sort, params, body).await
}

/// POST /api/buildings/pending-additions/remove/:sortBy/:sortDir
async fn remove_pending_addition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sort): Path<(String, String)>,
    Query(params): Query<ListParams>,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    moderate(state, headers, Transition::remove_addition(), sort, params, body).await
}

/// POST /api/buildings/pending-deletions/approve/:sortBy/:sortDir
async fn approve_pending_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sort): Path<(String, String)>,
    Query(params): Query<ListParams>,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    moderate(state, headers, Transition::approve_deletion(), sort, params, body).await
}

/// POST /api/buildings/pending-deletions/remove/:sortBy/:sortDir
async fn remove_pending_deletion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sort): Path<(String, String)>,
    Query(params): Query<ListParams>,
    body: Result<Json<ProofForm>, JsonRejection>,
) -> Response {
    moderate(state, headers, Transition::remove_deletion(), sort, params, body).await
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let building_routes = Router::new()
        .route("/get/:buildingId", get(get_building))
        .route("/all/:sortBy/:sortDir", get(list_buildings))
        .route(
            "/add",
            post(add_building).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES * 4)),
        )
        .route("/delete/add", post(submit_deletion))
        .route("/pending/get/:buildingId", get(get_pending_addition))
        .route("/pending-additions/:sortBy/:sortDir", get(list_pending_additions))
        .route(
            "/pending-additions/approve/:sortBy/:sortDir",
            post(approve_pending_addition),
        )
        .route(
            "/pending-additions/remove/:sortBy/:sortDir",
            post(remove_pending_addition),
        )
        .route("/pending-deletions/:sortBy/:sortDir", get(list_pending_deletions))
        .route(
            "/pending-deletions/approve/:sortBy/:sortDir",
            post(approve_pending_deletion),
        )
        .route(
            "/pending-deletions/remove/:sortBy/:sortDir",
            post(remove_pending_deletion),
        );

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/buildings", building_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, tests::fields};
    use crate::entities::{Building, BuildingType};
    use crate::gate::testing::{ScriptedVerifier, HOST};
    use crate::gate::{FixedClock, GateConfig};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "catalog-test-boundary";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn state_with(score: f64) -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let gate = VerificationGate::new(
            GateConfig::default(),
            Arc::new(FixedClock(now())),
            Arc::new(ScriptedVerifier::passing(score)),
        );
        AppState::new(conn, gate)
    }

    fn multipart_body(parts: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in parts {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn add_request(name: &str, occupancy: &str, user: Option<&str>) -> Request<Body> {
        let time = now().timestamp_millis().to_string();
        let body = multipart_body(&[
            ("name", name),
            ("occupancy", occupancy),
            ("type", "CO-$$"),
            ("tiles", "2x2"),
            ("tiles", "1x1"),
            ("style", "None"),
            ("time", &time),
            ("g-recaptcha-response", "add-token"),
        ]);

        let mut builder = Request::post("/api/buildings/add")
            .header(header::HOST, format!("{}:3000", HOST))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(user) = user {
            builder = builder.header(SESSION_USER_HEADER, user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn json_request(uri: &str, body: Value, user: Option<&str>, admin: bool) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header(header::HOST, HOST)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            builder = builder.header(SESSION_USER_HEADER, user);
        }
        if admin {
            builder = builder.header(SESSION_ADMIN_HEADER, "true");
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).header(header::HOST, HOST).body(Body::empty()).unwrap()
    }

    fn proof_body(id: &str, action: &str) -> Value {
        json!({
            "id": id,
            "time": now().timestamp_millis(),
            "g-recaptcha-response": format!("{}-token", action),
        })
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let state = state_with(0.9);
        let (status, body) = send(&state, get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["buildings"], 0);
    }

    #[tokio::test]
    async fn test_city_hall_scenario() {
        let state = state_with(0.9);

        let (status, body) = send(&state, add_request("City Hall", "500", Some("ann"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(ADDITION_ACCEPTED));

        let (_, pending) = send(&state, get_request("/api/buildings/pending-additions/name/asc")).await;
        assert_eq!(pending[0]["name"], "City Hall");
        assert_eq!(pending[0]["tiles"], json!(["1x1", "2x2"]));
        assert!(pending[0].get("image").is_none());
        let id = pending[0]["id"].as_str().unwrap().to_string();

        let (status, after) = send(
            &state,
            json_request(
                "/api/buildings/pending-additions/approve/name/asc",
                proof_body(&id, "approve"),
                Some("root"),
                true,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, json!([]));

        let (_, catalog) = send(&state, get_request("/api/buildings/all/name/asc")).await;
        assert_eq!(catalog[0]["name"], "City Hall");
        assert_eq!(catalog[0]["occupancy"], 500);
        assert_eq!(catalog[0]["lastUpdated"], "05/01/2024 12:00:00 PM");

        let (_, single) = send(&state, get_request(&format!("/api/buildings/get/{}?tzOffset=-300", id))).await;
        assert_eq!(single["lastUpdated"], "05/01/2024 7:00:00 AM");
    }

    #[tokio::test]
    async fn test_add_requires_login() {
        let state = state_with(0.9);
        let (status, body) = send(&state, add_request("City Hall", "500", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!([{ "param": "addBuildingMessage", "msg": "Not logged in." }]));
    }

    #[tokio::test]
    async fn test_add_reports_field_errors() {
        let state = state_with(0.9);
        let (status, body) = send(&state, add_request("City Hall", "0", Some("ann"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body[0]["param"], "occupancy");
    }

    #[tokio::test]
    async fn test_low_score_changes_nothing() {
        let state = state_with(0.3);
        let (status, body) = send(&state, add_request("City Hall", "500", Some("ann"))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body[0]["msg"], "Failed reCAPTCHA test.");
        let counts = state.with_conn(db::catalog_counts).unwrap();
        assert_eq!(counts.pending_additions, 0);
    }

    #[tokio::test]
    async fn test_login_checked_before_form_fields() {
        let state = state_with(0.9);

        let (status, body) = send(&state, add_request("<bad>", "0", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!([{ "param": "addBuildingMessage", "msg": "Not logged in." }]));

        let (status, body) = send(
            &state,
            json_request("/api/buildings/delete/add", json!({ "id": "nope", "time": "+5" }), None, false),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body[0]["msg"], "You must be logged in to delete buildings.");

        let (status, body) = send(
            &state,
            json_request("/api/buildings/pending-deletions/remove/name/asc", json!({}), Some("ann"), false),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body[0]["param"], "removePendingDeletionMessage");
    }

    #[tokio::test]
    async fn test_deletion_form_errors_are_per_field() {
        let state = state_with(0.9);
        let (status, body) = send(
            &state,
            json_request(
                "/api/buildings/delete/add",
                json!({ "id": "nope", "time": "-5", "g-recaptcha-response": "delete-token" }),
                Some("ann"),
                false,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let params: Vec<&str> = body.as_array().unwrap().iter().map(|e| e["param"].as_str().unwrap()).collect();
        assert_eq!(params, vec!["id", "time"]);
    }

    #[tokio::test]
    async fn test_low_score_approval_keeps_proposal() {
        let state = state_with(0.3);
        let proposal = Building::new(fields("City Hall", 500, BuildingType::CommercialOfficeMedium), now());
        state.with_conn(|conn| db::upsert_pending_addition(conn, &proposal, false)).unwrap();

        let (status, body) = send(
            &state,
            json_request(
                "/api/buildings/pending-additions/approve/name/asc",
                proof_body(&proposal.id, "approve"),
                Some("root"),
                true,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!([{ "param": "approvePendingAdditionMessage", "msg": "Failed reCAPTCHA test." }])
        );
        let counts = state.with_conn(db::catalog_counts).unwrap();
        assert_eq!(counts.pending_additions, 1);
        assert_eq!(counts.buildings, 0);
    }

    #[tokio::test]
    async fn test_remove_routes_run_their_own_transition() {
        let state = state_with(0.9);
        let proposal = Building::new(fields("City Hall", 500, BuildingType::CommercialOfficeMedium), now());
        let live = Building::new(fields("Old Mill", 40, BuildingType::Manufacturing), now());
        state
            .with_conn(|conn| {
                db::upsert_pending_addition(conn, &proposal, false)?;
                db::upsert_building(conn, &live)
            })
            .unwrap();
        let (status, _) = send(
            &state,
            json_request("/api/buildings/delete/add", proof_body(&live.id, "delete"), Some("ann"), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, after) = send(
            &state,
            json_request(
                "/api/buildings/pending-additions/remove/name/asc",
                proof_body(&proposal.id, "remove"),
                Some("root"),
                true,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, json!([]));

        let (status, after) = send(
            &state,
            json_request(
                "/api/buildings/pending-deletions/remove/name/asc",
                proof_body(&live.id, "remove"),
                Some("root"),
                true,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, json!([]));

        let counts = state.with_conn(db::catalog_counts).unwrap();
        assert_eq!(counts.pending_additions, 0);
        assert_eq!(counts.pending_deletions, 0);
        assert_eq!(counts.buildings, 1);
    }

    #[tokio::test]
    async fn test_approve_needs_admin() {
        let state = state_with(0.9);
        let (status, body) = send(
            &state,
            json_request(
                "/api/buildings/pending-additions/approve/name/asc",
                proof_body("2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10", "approve"),
                Some("ann"),
                false,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body[0]["param"], "approvePendingAdditionMessage");
    }

    #[tokio::test]
    async fn test_deletion_flow() {
        let state = state_with(0.9);
        let live = Building::new(fields("Old Mill", 40, BuildingType::Manufacturing), now());
        state.with_conn(|conn| db::upsert_building(conn, &live)).unwrap();

        let (status, body) = send(
            &state,
            json_request("/api/buildings/delete/add", proof_body(&live.id, "delete"), None, false),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body[0]["msg"], "You must be logged in to delete buildings.");

        let (status, body) = send(
            &state,
            json_request("/api/buildings/delete/add", proof_body(&live.id, "delete"), Some("ann"), false),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(DELETION_ACCEPTED));

        let (_, listing) = send(&state, get_request("/api/buildings/pending-deletions/occupancy/desc")).await;
        assert_eq!(listing[0]["name"], "Old Mill");
        assert_eq!(listing[0]["building"]["occupancy"], 40);

        let (status, after) = send(
            &state,
            json_request(
                "/api/buildings/pending-deletions/approve/name/asc",
                proof_body(&live.id, "approve"),
                Some("root"),
                true,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, json!([]));

        let (status, _) = send(&state, get_request(&format!("/api/buildings/get/{}", live.id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deletion_of_missing_record_is_not_found() {
        let state = state_with(0.9);
        let (status, body) = send(
            &state,
            json_request(
                "/api/buildings/delete/add",
                proof_body("2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10", "delete"),
                Some("ann"),
                false,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body[0]["param"], "removeDeletionMessage");
    }

    #[tokio::test]
    async fn test_listing_rejects_bad_sort() {
        let state = state_with(0.9);
        let (status, body) = send(&state, get_request("/api/buildings/all/color/sideways")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body[0], json!({ "param": "sortBy", "msg": "Invalid sort." }));
        assert_eq!(body[1], json!({ "param": "sortDir", "msg": "Must be asc or desc." }));
    }

    #[tokio::test]
    async fn test_pending_get_is_admin_only() {
        let state = state_with(0.9);
        let uri = "/api/buildings/pending/get/2f1c7a0e-8d3b-4b7e-9a51-0c4d7e2b9f10";

        let (status, _) = send(&state, get_request(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get(uri)
            .header(header::HOST, HOST)
            .header(SESSION_USER_HEADER, "root")
            .header(SESSION_ADMIN_HEADER, "true")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body[0]["param"], "displayPendingAdditionMessage");
    }

    #[test]
    fn test_hostname_strips_port() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "catalog.test:3000".parse().unwrap());
        assert_eq!(request_hostname(&headers), "catalog.test");

        headers.insert(header::HOST, "[::1]:3000".parse().unwrap());
        assert_eq!(request_hostname(&headers), "::1");
    }
}
