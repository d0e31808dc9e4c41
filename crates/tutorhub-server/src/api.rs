use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, Request, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use tutorhub_shared::constants::MAX_ATTACHMENT_SIZE;
use tutorhub_shared::{Actor, DomainError, EarningStatus, OfferingStatus, SortOrder};
use tutorhub_store::{
    EarningsSummary, NewOffering, NewUser, NotificationPreference, OfferingFilters,
    OfferingPatch, TutorProfile, User,
};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::marketplace::{Marketplace, Upload};

/// Header carrying the caller's user id.  Authentication happens upstream.
pub const USER_HEADER: &str = "x-user-id";

/// Room for several maximum-size files in one message.
const MAX_BODY_SIZE: usize = 5 * MAX_ATTACHMENT_SIZE as usize;

#[derive(Clone)]
pub struct AppState {
    pub market: Marketplace,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(register_user))
        .route("/users/:id", get(get_user))
        .route("/offerings", get(list_offerings).post(create_offering))
        .route(
            "/offerings/:id",
            get(get_offering).patch(update_offering).delete(delete_offering),
        )
        .route("/offerings/:id/publish", post(publish_offering))
        .route("/offerings/:id/accept", post(accept_offering))
        .route("/offerings/:id/complete", post(complete_offering))
        .route("/offerings/:id/cancel", post(cancel_offering))
        .route(
            "/offerings/:id/attachments",
            post(upload_attachment).delete(remove_attachment),
        )
        .route("/offerings/:id/attachments/file", get(download_attachment))
        .route("/offerings/:id/messages", get(list_messages).post(send_message))
        .route("/offerings/:id/messages/unread", get(unread_messages))
        .route("/messages/:id", axum::routing::delete(delete_message))
        .route("/messages/:id/read", post(mark_message_read))
        .route("/tutors/:profile_id/verification", post(verify_tutor))
        .route("/earnings", get(list_earnings))
        .route("/earnings/summary", get(earnings_summary))
        .route("/internal/earnings/:id/settle", post(settle_earning))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread", get(unread_notifications))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route(
            "/notifications/preferences",
            get(get_preferences).put(set_preferences),
        )
        .route("/notifications/:id/read", post(mark_notification_read))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The resolved caller of a request.
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized(format!("missing {USER_HEADER} header")))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| ServerError::Unauthorized(format!("invalid {USER_HEADER} header")))?;

        match state.market.resolve_actor(id) {
            Ok(actor) => Ok(Self(actor)),
            Err(ServerError::Domain(DomainError::NotFound(_))) => {
                Err(ServerError::Unauthorized("unknown user".into()))
            }
            Err(e) => Err(e),
        }
    }
}

fn verify_settlement_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.settlement_token else {
        return Err(DomainError::forbidden(
            "settlement API is disabled (no SETTLEMENT_TOKEN configured)",
        )
        .into());
    };

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(DomainError::forbidden("invalid settlement token").into());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct RegisteredUser {
    user: User,
    tutor_profile: Option<TutorProfile>,
}

/// Listing query string.  Unknown `status` / `sort` values are rejected.
#[derive(Debug, Deserialize)]
struct ListQuery {
    search: Option<String>,
    status: Option<OfferingStatus>,
    min_budget: Option<Decimal>,
    max_budget: Option<Decimal>,
    sort: Option<SortOrder>,
    page: Option<u32>,
}

impl ListQuery {
    fn filters(&self) -> OfferingFilters {
        OfferingFilters {
            search: self.search.clone(),
            status: self.status,
            min_budget: self.min_budget,
            max_budget: self.max_budget,
            sort: self.sort,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

#[derive(Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct VerificationRequest {
    approve: bool,
    note: Option<String>,
}

#[derive(Deserialize)]
struct SettleRequest {
    status: EarningStatus,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register_user(
    State(state): State<AppState>,
    Json(input): Json<NewUser>,
) -> Result<impl IntoResponse, ServerError> {
    let (user, tutor_profile) = state.market.register_user(input)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            user,
            tutor_profile,
        }),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.market.get_user(id)?))
}

async fn list_offerings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let page = state
        .market
        .list_offerings(&query.filters(), query.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

async fn create_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<NewOffering>,
) -> Result<impl IntoResponse, ServerError> {
    let offering = state.market.create_offering(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(offering)))
}

async fn get_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.get_offering(id)?))
}

async fn update_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(patch): Json<OfferingPatch>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.update_offering(&actor, id, patch).await?))
}

async fn delete_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    state.market.delete_offering(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.publish_offering(&actor, id).await?))
}

async fn accept_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let earning = state.market.accept_offering(&actor, id).await?;
    info!(offering = %id, tutor = %actor.id, "Offering accepted via API");
    Ok(Json(earning))
}

async fn complete_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.complete_offering(&actor, id).await?))
}

async fn cancel_offering(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.cancel_offering(&actor, id).await?))
}

/// Read every `file` field of a multipart form.
async fn read_uploads(
    multipart: &mut Multipart,
    mut on_text: impl FnMut(&str, String),
) -> Result<Vec<Upload>, ServerError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" || name == "files" {
            let file_name = field.file_name().unwrap_or("file").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
            uploads.push(Upload {
                file_name,
                mime_type,
                data,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
            on_text(&name, text);
        }
    }
    Ok(uploads)
}

async fn upload_attachment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let uploads = read_uploads(&mut multipart, |_, _| {}).await?;
    if uploads.is_empty() {
        return Err(ServerError::BadRequest(
            "Missing 'file' field in multipart form".to_string(),
        ));
    }

    let mut offering = None;
    for upload in uploads {
        let size = upload.data.len();
        let updated = state.market.add_attachment(&actor, id, upload).await?;
        info!(offering = %id, size, "Attachment uploaded via API");
        offering = Some(updated);
    }
    Ok((StatusCode::CREATED, Json(offering)))
}

async fn remove_attachment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(
        state.market.remove_attachment(&actor, id, &query.path).await?,
    ))
}

async fn download_attachment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let (mime, data): (String, Bytes) = state
        .market
        .download_attachment(&actor, id, &query.path)
        .await?;
    Ok(([(header::CONTENT_TYPE, mime)], data))
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(
        state.market.list_messages(&actor, id, query.page.unwrap_or(1))?,
    ))
}

/// Accepts JSON `{"content": ...}` or a multipart form with a `content`
/// field and any number of `files`.
async fn send_message(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    request: Request,
) -> Result<impl IntoResponse, ServerError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (content, uploads) = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        let mut content = String::new();
        let uploads = read_uploads(&mut multipart, |name, text| {
            if name == "content" {
                content = text;
            }
        })
        .await?;
        (content, uploads)
    } else {
        let Json(body) = Json::<SendMessageRequest>::from_request(request, &state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        (body.content, Vec::new())
    };

    let message = state
        .market
        .send_message(&actor, id, &content, uploads)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn unread_messages(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state.market.unread_count(&actor, id)?;
    Ok(Json(CountResponse { count }))
}

async fn mark_message_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.mark_message_read(&actor, id)?))
}

async fn delete_message(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    state.market.delete_message(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verify_tutor(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(profile_id): Path<Uuid>,
    Json(req): Json<VerificationRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let profile = state
        .market
        .verify_tutor(&actor, profile_id, req.approve, req.note)?;
    info!(profile = %profile_id, approved = req.approve, "Tutor verification decided via API");
    Ok(Json(profile))
}

async fn list_earnings(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.list_earnings(&actor)?))
}

async fn earnings_summary(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<EarningsSummary>, ServerError> {
    Ok(Json(state.market.earnings_summary(&actor)?))
}

async fn settle_earning(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SettleRequest>,
) -> Result<impl IntoResponse, ServerError> {
    verify_settlement_token(&headers, &state.config)?;
    Ok(Json(state.market.settle_earning(id, req.status)?))
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(
        state
            .market
            .list_notifications(&actor, query.page.unwrap_or(1))?,
    ))
}

async fn unread_notifications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state.market.unread_notification_count(&actor)?;
    Ok(Json(CountResponse { count }))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.market.mark_notification_read(&actor, id)?))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state.market.mark_all_notifications_read(&actor)? as u64;
    Ok(Json(CountResponse { count }))
}

async fn get_preferences(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<NotificationPreference>, ServerError> {
    Ok(Json(state.market.preferences(&actor)?))
}

async fn set_preferences(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(prefs): Json<NotificationPreference>,
) -> Result<Json<NotificationPreference>, ServerError> {
    Ok(Json(state.market.set_preferences(&actor, prefs)?))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
