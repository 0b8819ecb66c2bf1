use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use woms_core::approvals::GateDenial;
use woms_core::documents::{DocumentRenderer, DocumentSource, Organization, RenderedDocument};
use woms_core::domain::notification::{Notification, NotificationId};
use woms_core::domain::request::{DraftInput, Request, RequestId, RequestItemInput, Stage};
use woms_core::domain::signature::Signature;
use woms_core::errors::{ApplicationError, DomainError};
use woms_core::flows::{ActionKind, FlowEngine, WorkflowAction};
use woms_core::listing::{Ordering, Page, Queue, RequestFilter};
use woms_core::session::{Session, TokenCodec};
use woms_db::repositories::SignatureRepository;
use woms_db::{InboxView, NotificationInbox, WorkflowStore};

use crate::auth::{ApiError, Authenticated};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WorkflowStore>,
    pub inbox: Arc<NotificationInbox>,
    pub signatures: Arc<dyn SignatureRepository>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub tokens: Arc<TokenCodec>,
    pub organization: Organization,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/items", put(revise_items))
        .route("/api/v1/requests/{id}/approve", post(approve_request))
        .route("/api/v1/requests/{id}/reject", post(reject_request))
        .route("/api/v1/requests/{id}/finalize", post(finalize_request))
        .route("/api/v1/requests/{id}/draft", post(draft_request))
        .route("/api/v1/requests/{id}/draft/preview", post(preview_draft))
        .route("/api/v1/requests/{id}/evaluation", post(evaluate_request))
        .route("/api/v1/requests/{id}/document", get(request_document))
        .route("/api/v1/queues/{queue}", get(queue_requests))
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/{id}/read", patch(mark_notification_read))
        .route("/api/v1/notifications/{id}", delete(delete_notification))
        .route("/api/v1/signature", put(save_signature).get(get_signature))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ItemsBody {
    pub items: Vec<RequestItemInput>,
}

/// Request as returned to clients, with the actions the caller may take next.
#[derive(Debug, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub available_actions: Vec<ActionKind>,
}

impl RequestView {
    fn for_session(request: Request, state: &AppState, session: &Session) -> Self {
        let available_actions = FlowEngine::default()
            .available_actions(request.stage)
            .into_iter()
            .filter(|action| state.store.gate().authorize(&session.actor, *action, &request))
            .collect();
        Self { request, available_actions }
    }
}

/// Query string shared by `/requests` and `/queues/{queue}`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma separated stage names.
    pub stage: Option<String>,
    pub requester: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListQuery {
    fn filter(&self, correlation_id: &str) -> Result<RequestFilter, ApiError> {
        let stages = match self.stage.as_deref() {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    Stage::parse(value).ok_or_else(|| {
                        ApiError::bad_request(format!("unknown stage `{value}`"), correlation_id)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let ordering = match self.ordering.as_deref() {
            Some(raw) => Ordering::parse(raw).ok_or_else(|| {
                ApiError::bad_request(format!("unknown ordering `{raw}`"), correlation_id)
            })?,
            None => Ordering::default(),
        };

        Ok(RequestFilter {
            stages,
            requester: self.requester.clone(),
            requester_id: None,
            created_from: self.created_from,
            created_to: self.created_to,
            ordering,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Json(body): Json<ItemsBody>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let request = state
        .store
        .create(&session, body.items)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok((StatusCode::CREATED, Json(RequestView::for_session(request, &state, &session))))
}

async fn list_requests(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<RequestView>>, ApiError> {
    let filter = query.filter(&session.correlation_id)?;
    let page = state
        .store
        .list(&session, filter, query.page, query.page_size)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(page.map(|request| RequestView::for_session(request, &state, &session))))
}

async fn queue_requests(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(queue): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<RequestView>>, ApiError> {
    let queue = Queue::parse(&queue).ok_or_else(|| {
        ApiError::from_app(
            ApplicationError::NotFound(format!("queue `{queue}`")),
            &session.correlation_id,
        )
    })?;
    let filter = query.filter(&session.correlation_id)?;
    let page = state
        .store
        .queue(&session, queue, filter, query.page, query.page_size)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(page.map(|request| RequestView::for_session(request, &state, &session))))
}

async fn get_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    let request = state
        .store
        .get(&RequestId(id), &session)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(RequestView::for_session(request, &state, &session)))
}

async fn revise_items(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<ItemsBody>,
) -> Result<Json<RequestView>, ApiError> {
    let request = state
        .store
        .revise_items(&RequestId(id), body.items, &session)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(RequestView::for_session(request, &state, &session)))
}

async fn approve_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    transition(&state, &session, id, WorkflowAction::Approve).await
}

async fn reject_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    transition(&state, &session, id, WorkflowAction::Reject).await
}

async fn finalize_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    transition(&state, &session, id, WorkflowAction::Finalize).await
}

async fn draft_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
    Json(input): Json<DraftInput>,
) -> Result<Json<RequestView>, ApiError> {
    transition(&state, &session, id, WorkflowAction::Draft(input)).await
}

/// Engineering co-signs the requisition voucher with the signature on file.
async fn evaluate_request(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    let fail = |error: ApplicationError| ApiError::from_app(error, &session.correlation_id);
    if !state.store.gate().can_evaluate(&session.actor) {
        return Err(fail(ApplicationError::Forbidden(format!(
            "role `{}` may not evaluate requisition vouchers",
            session.actor.role
        ))));
    }
    if state.signatures.find(&session.actor.id).await.map_err(|error| fail(error.into()))?.is_none() {
        return Err(fail(ApplicationError::NotFound(
            "no signature on file; upload one before evaluating".to_string(),
        )));
    }

    let request = state.store.evaluate(&RequestId(id), &session).await.map_err(fail)?;
    Ok(Json(RequestView::for_session(request, &state, &session)))
}

async fn transition(
    state: &AppState,
    session: &Session,
    id: String,
    action: WorkflowAction,
) -> Result<Json<RequestView>, ApiError> {
    let request = state
        .store
        .transition(&RequestId(id), action, session)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(RequestView::for_session(request, state, session)))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

async fn request_document(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fail = |error: ApplicationError| ApiError::from_app(error, &session.correlation_id);
    let request = state.store.get(&RequestId(id), &session).await.map_err(fail)?;

    let signature = match DocumentSource::signer_of(&request) {
        Some(signer) => state.signatures.find(&signer).await.map_err(|error| fail(error.into()))?,
        None => None,
    };
    let evaluator_signature = match DocumentSource::evaluator_of(&request) {
        Some(evaluator) => {
            state.signatures.find(&evaluator).await.map_err(|error| fail(error.into()))?
        }
        None => None,
    };
    let source = DocumentSource::for_request(
        &request,
        &state.organization,
        signature.as_ref(),
        evaluator_signature.as_ref(),
    );
    let document = state.renderer.render(&source).await.map_err(|error| fail(error.into()))?;

    info!(
        event_name = "document.rendered",
        correlation_id = %session.correlation_id,
        request_id = %request.id,
        kind = ?source.kind,
        renderer = state.renderer.name(),
        "document rendered"
    );
    Ok(document_response(document))
}

/// Renders an unsaved draft. Only someone allowed to draft this request may preview it.
async fn preview_draft(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
    Json(input): Json<DraftInput>,
) -> Result<Response, ApiError> {
    let fail = |error: ApplicationError| ApiError::from_app(error, &session.correlation_id);
    let request = state.store.get(&RequestId(id), &session).await.map_err(fail)?;

    let decision = state.store.gate().evaluate(&session.actor, ActionKind::Draft, &request);
    if !decision.allowed {
        let error = match decision.denial {
            Some(GateDenial::StageMismatch { stage, .. }) => {
                DomainError::InvalidTransition { from: stage, to: Stage::Drafted }.into()
            }
            _ => ApplicationError::Forbidden(decision.reason),
        };
        return Err(fail(error));
    }

    let source = DocumentSource::purchase_order_preview(
        &request,
        input,
        &session.actor,
        &state.organization,
        Utc::now(),
    )
    .map_err(fail)?;
    let document = state.renderer.render(&source).await.map_err(|error| fail(error.into()))?;
    Ok(document_response(document))
}

fn document_response(document: RenderedDocument) -> Response {
    (
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", document.file_name)),
        ],
        document.bytes,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

async fn list_notifications(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxView>, ApiError> {
    let view = state
        .inbox
        .list(&session, query.unread_only, query.limit)
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(view))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state
        .inbox
        .mark_read(&session, &NotificationId(id))
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .inbox
        .delete(&session, &NotificationId(id))
        .await
        .map_err(|error| ApiError::from_app(error, &session.correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

async fn save_signature(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    body: Bytes,
) -> Result<Json<Signature>, ApiError> {
    let fail = |error: ApplicationError| ApiError::from_app(error, &session.correlation_id);
    let signature = Signature::png(session.actor.id.clone(), body.to_vec(), Utc::now().trunc_subsecs(6))
        .map_err(|error| fail(error.into()))?;
    state.signatures.save(&signature).await.map_err(|error| fail(error.into()))?;

    info!(
        event_name = "signature.saved",
        correlation_id = %session.correlation_id,
        actor_id = %session.actor.id.0,
        size = signature.image.len(),
        "signature saved"
    );
    Ok(Json(signature))
}

async fn get_signature(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
) -> Result<Response, ApiError> {
    let fail = |error: ApplicationError| ApiError::from_app(error, &session.correlation_id);
    let signature = state
        .signatures
        .find(&session.actor.id)
        .await
        .map_err(|error| fail(error.into()))?
        .ok_or_else(|| fail(ApplicationError::NotFound("no signature on file".to_string())))?;

    Ok(([(header::CONTENT_TYPE, signature.content_type)], signature.image).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request as HttpRequest, StatusCode},
        Router,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use async_trait::async_trait;
    use woms_core::audit::InMemoryAuditSink;
    use woms_core::documents::{
        DocumentRenderer, DocumentSource, Organization, RenderError, RenderedDocument,
    };
    use woms_core::domain::actor::{Actor, Role};
    use woms_core::domain::signature::PNG_MAGIC;
    use woms_core::session::TokenCodec;
    use woms_db::repositories::{InMemorySignatureRepository, InMemoryWorkflowRepository};
    use woms_db::{NotificationInbox, WorkflowStore};

    use super::{router, AppState};
    use crate::pdf::HtmlRenderer;

    struct BrokenRenderer;

    #[async_trait]
    impl DocumentRenderer for BrokenRenderer {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn render(&self, _source: &DocumentSource) -> Result<RenderedDocument, RenderError> {
            Err(RenderError::Timeout(20))
        }
    }

    struct Harness {
        app: Router,
        tokens: Arc<TokenCodec>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_renderer(Arc::new(HtmlRenderer::embedded()))
        }

        fn with_renderer(renderer: Arc<dyn DocumentRenderer>) -> Self {
            let repo = InMemoryWorkflowRepository::new();
            let tokens = Arc::new(TokenCodec::new(
                SecretString::from("router-test-secret".to_string()),
                3600,
            ));
            let state = AppState {
                store: Arc::new(WorkflowStore::new(
                    Arc::new(repo.clone()),
                    Arc::new(InMemoryAuditSink::default()),
                )),
                inbox: Arc::new(NotificationInbox::new(Arc::new(repo), 15)),
                signatures: Arc::new(InMemorySignatureRepository::new()),
                renderer,
                tokens: Arc::clone(&tokens),
                organization: Organization {
                    name: "Central Warehouse".to_string(),
                    address: "Dock Road 1".to_string(),
                },
            };
            Self { app: router(state), tokens }
        }

        fn token(&self, actor: &Actor) -> String {
            self.tokens.issue(actor, Utc::now()).expect("token")
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            actor: Option<&Actor>,
            body: Option<Value>,
        ) -> (StatusCode, Vec<u8>) {
            let mut builder = HttpRequest::builder().method(method).uri(uri);
            if let Some(actor) = actor {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(actor)));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
                None => builder.body(Body::empty()).expect("request"),
            };

            let response = self.app.clone().oneshot(request).await.expect("response");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            (status, bytes.to_vec())
        }

        async fn json(
            &self,
            method: Method,
            uri: &str,
            actor: Option<&Actor>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let (status, bytes) = self.send(method, uri, actor, body).await;
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json body")
            };
            (status, value)
        }

        async fn upload_signature(&self, actor: &Actor) -> StatusCode {
            let mut png = PNG_MAGIC.to_vec();
            png.extend([0u8; 16]);
            let request = HttpRequest::builder()
                .method(Method::PUT)
                .uri("/api/v1/signature")
                .header(header::AUTHORIZATION, format!("Bearer {}", self.token(actor)))
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(png))
                .expect("request");
            self.app.clone().oneshot(request).await.expect("response").status()
        }
    }

    fn staff() -> Actor {
        Actor::new("staff-1", "Rosa Delgado", Role::WarehouseStaff)
    }

    fn analyst() -> Actor {
        Actor::new("analyst-1", "Ben Analyst", Role::BudgetAnalyst)
    }

    fn engineer() -> Actor {
        Actor::new("eng-1", "Ed Engineer", Role::Engineering)
    }

    fn bolts() -> Value {
        json!({ "items": [{ "name": "Bolts", "quantity": 10 }] })
    }

    fn bolt_order() -> Value {
        json!({
            "supplier": "Acme Fasteners",
            "address": "12 Harbor Road",
            "lines": [{ "description": "Bolts", "quantity": 10, "unit_price": "5", "line_total": "999" }],
            "grand_total": "999"
        })
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let harness = Harness::new();
        let (status, body) = harness.json(Method::GET, "/api/v1/requests", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn full_lifecycle_over_http_ignores_client_totals() {
        let harness = Harness::new();
        let (status, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["stage"], "submitted");
        let id = created["id"].as_str().expect("id").to_string();

        let (status, approved) = harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["available_actions"], json!(["draft"]));

        let (status, drafted) = harness
            .json(
                Method::POST,
                &format!("/api/v1/requests/{id}/draft"),
                Some(&analyst()),
                Some(bolt_order()),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let grand_total = drafted["draft"]["grand_total"].as_str().and_then(|v| v.parse::<Decimal>().ok());
        assert_eq!(grand_total, Some(Decimal::new(50, 0)));

        let (status, finalized) = harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/finalize"), Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(finalized["stage"], "finalized");

        let (status, body) = harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn staff_cannot_approve() {
        let harness = Harness::new();
        let (_, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        let id = created["id"].as_str().expect("id");

        let (status, body) = harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&staff()), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn empty_items_are_a_bad_request() {
        let harness = Harness::new();
        let (status, body) = harness
            .json(Method::POST, "/api/v1/requests", Some(&staff()), Some(json!({ "items": [] })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn listing_reports_pages_and_rejects_out_of_range() {
        let harness = Harness::new();
        for _ in 0..8 {
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        }

        let (status, page) =
            harness.json(Method::GET, "/api/v1/queues/pending", Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 8);
        assert_eq!(page["total_pages"], 2);
        assert_eq!(page["results"].as_array().map(Vec::len), Some(7));

        let (status, _) = harness
            .json(Method::GET, "/api/v1/requests?page=3", Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = harness
            .json(Method::GET, "/api/v1/requests?stage=archived", Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            harness.json(Method::GET, "/api/v1/queues/pending", Some(&staff()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn notifications_can_be_read_and_deleted_once() {
        let harness = Harness::new();
        harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;

        let (status, inbox) =
            harness.json(Method::GET, "/api/v1/notifications", Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inbox["unread_count"], 1);
        assert_eq!(inbox["poll_interval_secs"], 15);
        let note_id = inbox["notifications"][0]["id"].as_str().expect("id").to_string();

        let (status, read) = harness
            .json(Method::PATCH, &format!("/api/v1/notifications/{note_id}/read"), Some(&analyst()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["is_read"], true);

        let uri = format!("/api/v1/notifications/{note_id}");
        let (status, _) = harness.send(Method::DELETE, &uri, Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = harness.send(Method::DELETE, &uri, Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn document_and_preview_render_html() {
        let harness = Harness::new();
        let (_, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, voucher) = harness
            .send(Method::GET, &format!("/api/v1/requests/{id}/document"), Some(&staff()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&voucher).contains("REQUISITION VOUCHER"));

        let preview_uri = format!("/api/v1/requests/{id}/draft/preview");
        let (status, _) =
            harness.send(Method::POST, &preview_uri, Some(&analyst()), Some(bolt_order())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&analyst()), None)
            .await;
        let (status, preview) =
            harness.send(Method::POST, &preview_uri, Some(&analyst()), Some(bolt_order())).await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8_lossy(&preview);
        assert!(html.contains("-- PREVIEW --"));
        assert!(html.contains("50.00"));

        let (_, still_approved) = harness
            .json(Method::GET, &format!("/api/v1/requests/{id}"), Some(&analyst()), None)
            .await;
        assert_eq!(still_approved["stage"], "approved");
        assert!(still_approved["draft"].is_null());
    }

    #[tokio::test]
    async fn renderer_failure_is_unavailable_and_leaves_request_alone() {
        let harness = Harness::with_renderer(Arc::new(BrokenRenderer));
        let (_, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        let id = created["id"].as_str().expect("id").to_string();
        harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&analyst()), None)
            .await;

        let (status, body) = harness
            .json(
                Method::POST,
                &format!("/api/v1/requests/{id}/draft/preview"),
                Some(&analyst()),
                Some(bolt_order()),
            )
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service_unavailable");

        let (_, after) = harness
            .json(Method::GET, &format!("/api/v1/requests/{id}"), Some(&analyst()), None)
            .await;
        assert_eq!(after["stage"], "approved");
        assert_eq!(after["version"], 2);
    }

    #[tokio::test]
    async fn signature_upload_accepts_png_only() {
        let harness = Harness::new();
        let (status, _) = harness.send(Method::GET, "/api/v1/signature", Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut png = PNG_MAGIC.to_vec();
        png.extend([0u8; 16]);
        let upload = |body: Vec<u8>| {
            HttpRequest::builder()
                .method(Method::PUT)
                .uri("/api/v1/signature")
                .header(header::AUTHORIZATION, format!("Bearer {}", harness.token(&analyst())))
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(body))
                .expect("request")
        };

        let response =
            harness.app.clone().oneshot(upload(b"GIF89a".to_vec())).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = harness.app.clone().oneshot(upload(png.clone())).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let (status, stored) =
            harness.send(Method::GET, "/api/v1/signature", Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored, png);
    }

    #[tokio::test]
    async fn engineering_co_signs_the_voucher_with_a_stored_signature() {
        let harness = Harness::new();
        let (_, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        let id = created["id"].as_str().expect("id").to_string();
        let evaluation = format!("/api/v1/requests/{id}/evaluation");

        let (status, _) = harness.json(Method::POST, &evaluation, Some(&analyst()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = harness.json(Method::POST, &evaluation, Some(&engineer()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

        assert_eq!(harness.upload_signature(&engineer()).await, StatusCode::OK);
        let (status, evaluated) =
            harness.json(Method::POST, &evaluation, Some(&engineer()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(evaluated["stage"], "submitted");
        assert_eq!(evaluated["evaluation"]["actor_name"], "Ed Engineer");

        let (status, _) = harness.json(Method::POST, &evaluation, Some(&engineer()), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, html) = harness
            .send(Method::GET, &format!("/api/v1/requests/{id}/document"), Some(&staff()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(html).expect("utf8");
        assert!(html.contains("Evaluated by"));
        assert!(html.contains("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn overflowing_draft_price_is_a_bad_request() {
        let harness = Harness::new();
        let (_, created) =
            harness.json(Method::POST, "/api/v1/requests", Some(&staff()), Some(bolts())).await;
        let id = created["id"].as_str().expect("id").to_string();
        harness
            .json(Method::POST, &format!("/api/v1/requests/{id}/approve"), Some(&analyst()), None)
            .await;

        let order = json!({
            "supplier": "Acme Fasteners",
            "address": "12 Harbor Road",
            "lines": [{ "description": "Girders", "quantity": 2000, "unit_price": "79228162514264337593543950" }]
        });
        for uri in [format!("/api/v1/requests/{id}/draft/preview"), format!("/api/v1/requests/{id}/draft")]
        {
            let (status, body) =
                harness.json(Method::POST, &uri, Some(&analyst()), Some(order.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}: {body}");
        }

        let (_, stored) =
            harness.json(Method::GET, &format!("/api/v1/requests/{id}"), Some(&analyst()), None).await;
        assert_eq!(stored["stage"], "approved");
        assert_eq!(stored["version"], 2);
    }
}
