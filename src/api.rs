//! HTTP surface for the PDF question-answering service.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /upload` – Multipart upload (field `file`) of a single PDF. Returns the generated
//!   `document_id`.
//! - `POST /ask` – JSON `{ "document_id", "question" }`; answers from the document's content.
//! - `GET /documents` – Identifiers of stored documents in upload order.
//! - `GET /` – Liveness message plus the active embedding mode.
//! - `GET /metrics` – Upload and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Every failure is returned as `{ "error": "<message>" }` with a status derived from the
//! error kind.

use crate::processing::{
    AskError, DocumentApi, HealthSnapshot, IndexBuildError, QueryError, UploadError,
    UploadRequest, ValidationError,
};
use crate::metrics::MetricsSnapshot;
use crate::store::DocumentId;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";

/// Build the HTTP router exposing the upload/ask surface.
///
/// `max_upload_bytes` bounds every request body, multipart uploads included.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/", get(health::<S>))
        .route("/upload", post(upload_document::<S>))
        .route("/ask", post(ask_question::<S>))
        .route("/documents", get(list_documents::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    document_id: DocumentId,
    message: &'static str,
}

/// Accept one PDF from the `file` multipart field, extract its text and store it.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut multipart =
        multipart.map_err(|rejection| ValidationError::Malformed(rejection.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ValidationError::Malformed(error.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ValidationError::Malformed(error.body_text()))?;
        upload = Some(UploadRequest {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or(ValidationError::MissingField(UPLOAD_FIELD))?;

    let outcome = service.upload(upload).await?;
    Ok(Json(UploadResponse {
        document_id: outcome.document_id,
        message: "PDF uploaded and processed",
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    /// Identifier returned by `POST /upload`.
    #[serde(default)]
    document_id: Option<String>,
    /// Natural-language question about the document.
    #[serde(default)]
    question: Option<String>,
}

/// Success response for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

/// Answer a question about a previously uploaded document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: DocumentApi,
{
    let Json(request) =
        request.map_err(|rejection| ValidationError::Malformed(rejection.body_text()))?;
    let document_id = request
        .document_id
        .ok_or(ValidationError::MissingField("document_id"))?;
    let question = request
        .question
        .ok_or(ValidationError::MissingField("question"))?;

    let answer = service.ask(&document_id, &question).await?;
    Ok(Json(AskResponse { answer }))
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    document_ids: Vec<DocumentId>,
}

/// List stored documents in upload order.
async fn list_documents<S>(State(service): State<Arc<S>>) -> Json<DocumentsResponse>
where
    S: DocumentApi,
{
    Json(DocumentsResponse {
        document_ids: service.list_documents().await,
    })
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthSnapshot>
where
    S: DocumentApi,
{
    Json(service.health().await)
}

/// Return the upload and question counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload one PDF as multipart field `file`. \
                    Response returns { \"document_id\": string, \"message\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question using only the content of an uploaded document. \
                    Response returns { \"answer\": string }.",
                request_example: Some(json!({
                    "document_id": "0b5e8c1e-3f4a-4c55-9d47-8f1f2a6b7c90",
                    "question": "What is this document about?"
                })),
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/documents",
                description: "Return identifiers of stored documents in upload order.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/",
                description: "Liveness message and the active embedding mode.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload and question counters.",
                request_example: None,
            },
        ],
    })
}

/// Boundary error carrying its HTTP status.
#[derive(Debug)]
enum AppError {
    Validation(ValidationError),
    Upload(UploadError),
    Ask(AskError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Upload(UploadError::Extraction(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ask(error) => match error {
                AskError::Validation(_) | AskError::Query(QueryError::EmptyQuestion) => {
                    StatusCode::BAD_REQUEST
                }
                AskError::NotFound(_) => StatusCode::NOT_FOUND,
                AskError::IndexBuild(IndexBuildError::EmptyDocument(_)) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AskError::IndexBuild(IndexBuildError::EmbeddingUnavailable(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                AskError::IndexBuild(_) | AskError::Query(_) => StatusCode::BAD_GATEWAY,
                AskError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(error) => error.to_string(),
            Self::Upload(error) => error.to_string(),
            Self::Ask(error) => error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(inner: ValidationError) -> Self {
        Self::Validation(inner)
    }
}

impl From<UploadError> for AppError {
    fn from(inner: UploadError) -> Self {
        Self::Upload(inner)
    }
}

impl From<AskError> for AppError {
    fn from(inner: AskError) -> Self {
        Self::Ask(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, create_router, get_commands};
    use crate::extract::ExtractionError;
    use crate::generation::GenerationClientError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AskError, AskStage, DocumentApi, HealthSnapshot, IndexBuildError, QueryError,
        UploadError, UploadOutcome, UploadRequest, ValidationError,
    };
    use crate::store::DocumentId;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use regex::Regex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfqa-test-boundary";
    const UUID_V4: &str =
        r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$";

    #[tokio::test]
    async fn commands_catalog_exposes_upload_and_ask() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let ask = commands
            .iter()
            .find(|cmd| cmd.name == "ask")
            .expect("ask command present");

        assert_eq!(ask.method, "POST");
        assert_eq!(ask.path, "/ask");
        assert!(commands.iter().any(|cmd| cmd.path == "/upload"));
    }

    #[tokio::test]
    async fn upload_route_forwards_file_field() {
        let service = Arc::new(StubDocumentService::new());
        let app = create_router(service.clone(), 1024 * 1024);

        let response = app
            .oneshot(multipart_request("report.pdf", "application/pdf", b"%PDF-1.5 stub"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let uuid = Regex::new(UUID_V4).expect("regex");
        assert!(uuid.is_match(json["document_id"].as_str().expect("document_id")));
        assert_eq!(json["message"], "PDF uploaded and processed");

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename.as_deref(), Some("report.pdf"));
        assert_eq!(uploads[0].content_type.as_deref(), Some("application/pdf"));
        assert_eq!(uploads[0].bytes, b"%PDF-1.5 stub");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_bad_request() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024);
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("request");

        let response = app.oneshot(request).await.expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Missing required field: file"
        );
    }

    #[tokio::test]
    async fn rejected_upload_maps_to_bad_request() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024 * 1024);

        let response = app
            .oneshot(multipart_request("notes.txt", "text/plain", b"hello"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Only PDF files are allowed.");
    }

    #[tokio::test]
    async fn ask_route_returns_answer() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024);

        let response = app
            .oneshot(ask_request(json!({
                "document_id": StubDocumentService::KNOWN_ID,
                "question": "What color is the sky?"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["answer"], "The sky is blue.");
    }

    #[tokio::test]
    async fn unknown_document_returns_not_found_envelope() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024);

        let response = app
            .oneshot(ask_request(json!({
                "document_id": "not-a-real-id",
                "question": "Anything?"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json, json!({ "error": "Invalid document ID: not-a-real-id" }));
    }

    #[tokio::test]
    async fn ask_with_missing_question_is_bad_request() {
        let service = Arc::new(StubDocumentService::new());
        let app = create_router(service.clone(), 1024);

        let response = app
            .oneshot(ask_request(json!({ "document_id": StubDocumentService::KNOWN_ID })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Missing required field: question"
        );
        assert_eq!(*service.asks.lock().await, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request_with_envelope() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .expect("request");

        let response = app.oneshot(request).await.expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn health_and_documents_routes_respond() {
        let app = create_router(Arc::new(StubDocumentService::new()), 1024);

        let health = app
            .clone()
            .oneshot(get_request("/"))
            .await
            .expect("router response");
        assert_eq!(health.status(), StatusCode::OK);
        let health = json_body(health).await;
        assert!(health["message"].as_str().expect("message").contains("running"));
        assert_eq!(health["embedding"], "primary: stub-model");

        let documents = app
            .oneshot(get_request("/documents"))
            .await
            .expect("router response");
        assert_eq!(documents.status(), StatusCode::OK);
        assert_eq!(
            json_body(documents).await["document_ids"],
            json!([StubDocumentService::KNOWN_ID])
        );
    }

    #[test]
    fn ask_errors_map_to_distinct_statuses() {
        let cases = [
            (
                AskError::Validation(ValidationError::MissingField("question")),
                StatusCode::BAD_REQUEST,
            ),
            (AskError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AskError::IndexBuild(IndexBuildError::EmptyDocument(DocumentId::new())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AskError::IndexBuild(IndexBuildError::EmbeddingUnavailable("degraded".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AskError::Query(QueryError::Generation(GenerationClientError::Transport(
                    "refused".into(),
                ))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AskError::Timeout {
                    seconds: 120,
                    stage: AskStage::Generate,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
        assert_eq!(
            AppError::from(UploadError::Extraction(ExtractionError::Parse("bad xref".into())))
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    fn multipart_request(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("request")
    }

    fn ask_request(payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    struct StubDocumentService {
        uploads: Mutex<Vec<UploadRequest>>,
        asks: Mutex<usize>,
    }

    impl StubDocumentService {
        const KNOWN_ID: &'static str = "7d0f3a52-9a1e-4c1b-8f57-2f9e6c1d4b3a";

        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                asks: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentApi for StubDocumentService {
        async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
            crate::extract::validate_upload(
                request.filename.as_deref(),
                request.content_type.as_deref(),
            )?;
            self.uploads.lock().await.push(request);
            Ok(UploadOutcome {
                document_id: DocumentId::new(),
                characters: 16,
                archived_path: None,
            })
        }

        async fn ask(&self, document_id: &str, _question: &str) -> Result<String, AskError> {
            *self.asks.lock().await += 1;
            if document_id == Self::KNOWN_ID {
                Ok("The sky is blue.".into())
            } else {
                Err(AskError::NotFound(document_id.to_string()))
            }
        }

        async fn list_documents(&self) -> Vec<DocumentId> {
            DocumentId::parse(Self::KNOWN_ID).into_iter().collect()
        }

        async fn health(&self) -> HealthSnapshot {
            HealthSnapshot {
                message: "PDF question answering service is running",
                embedding: "primary: stub-model".into(),
                degraded: false,
                documents: 1,
            }
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }
}
