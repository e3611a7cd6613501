//! Axum request handlers for all service endpoints.

use std::fs;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use common::{
    protocol::{ErrorResponse, HealthResponse},
    ServiceError,
};
use serde::Deserialize;
use tracing::{info, warn, Span};

use super::{error::ApiError, state::AppState};
use crate::crypto::armor::{armor, unarmor};
use crate::crypto::cipher::TOKEN_VERSION;
use crate::storage::{decrypted_name, encrypted_name, sanitize_filename, Folder, StorageError};

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

const INDEX_HTML: &str = include_str!("../../assets/index.html");

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Query parameters accepted by `POST /encrypt`.
#[derive(Debug, Default, Deserialize)]
pub struct EncryptOptions {
    /// Return the token as base64 text instead of raw bytes.
    #[serde(default)]
    pub armor: bool,
}

/// `GET /` — HTML upload form.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /encrypt` — encrypt the uploaded file and return the token as an attachment.
///
/// The token is also written to `encrypt/<name>.enc` for later download.
pub async fn encrypt(
    State(state): State<AppState>,
    Query(opts): Query<EncryptOptions>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Upload { name, data } = read_upload(multipart).await?;
    let size = data.len();
    let armored = opts.armor;

    let (out_name, body) = blocking(move || {
        let token = state.cipher.encrypt(&data)?;
        let body = if armored {
            Bytes::from(armor(&token))
        } else {
            Bytes::from(token)
        };
        let out_name = encrypted_name(&name);
        state.storage.save_upload(&name, &data)?;
        state.storage.write_output(Folder::Encrypt, &out_name, &body)?;
        Ok((out_name, body))
    })
    .await?;

    info!(bytes = size, output = %out_name, armored, "file encrypted");
    let content_type = token_content_type(&body);
    attachment(&out_name, content_type, body)
}

/// `POST /decrypt` — decrypt an uploaded token (raw or armored).
///
/// Every rejection produces the same 400 body, whatever the cause.
pub async fn decrypt(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Upload { name, data } = read_upload(multipart).await?;

    let (out_name, body) = blocking(move || {
        let token = unarmor(&data)?;
        let opened = match state.token_ttl {
            Some(ttl) => state.cipher.decrypt_with_ttl(&token, ttl),
            None => state.cipher.decrypt(&token),
        };
        let plaintext = opened.map_err(|e| {
            warn!(upload = %name, reason = %e, "token rejected");
            e
        })?;
        let out_name = decrypted_name(&name);
        state.storage.save_upload(&name, &data)?;
        state
            .storage
            .write_output(Folder::Decrypt, &out_name, &plaintext)?;
        Ok((out_name, Bytes::from(plaintext)))
    })
    .await?;

    info!(bytes = body.len(), output = %out_name, "file decrypted");
    attachment(&out_name, OCTET_STREAM, body)
}

/// `GET /download/{folder}/{filename}` — fetch a previously produced output.
pub async fn download(
    State(state): State<AppState>,
    Path((folder, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let folder: Folder = folder.parse()?;
    let name = filename.clone();

    let data = blocking(move || {
        let path = state.storage.resolve_download(folder, &name)?;
        let data = fs::read(path).map_err(StorageError::from)?;
        Ok(data)
    })
    .await?;

    let content_type = match folder {
        Folder::Encrypt => token_content_type(&data),
        Folder::Decrypt => OCTET_STREAM,
    };
    attachment(&filename, content_type, Bytes::from(data))
}

/// `GET /health` — liveness and readiness check.
///
/// Returns `200 OK` when the output directories are present.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let storage = state.storage.clone();
    let storage_ready = blocking(move || Ok(storage.is_ready()))
        .await
        .unwrap_or(false);

    let (status_code, status_str) = if storage_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        storage_ready,
        version: env!("CARGO_PKG_VERSION").into(),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A buffered upload with its sanitised filename.
struct Upload {
    name: String,
    data: Bytes,
}

/// Pull the `file` field out of a multipart body, skipping any other fields.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = sanitize_filename(field.file_name().unwrap_or_default())
            .ok_or(StorageError::UnsafeFilename)?;
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Upload { name, data });
    }
    Err(ApiError::bad_request("missing file field"))
}

/// Armored tokens are text; raw tokens start with the version byte.
fn token_content_type(token: &[u8]) -> &'static str {
    if token.first() == Some(&TOKEN_VERSION) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError(ServiceError::PayloadTooLarge)
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Run CPU- or disk-bound work on the blocking pool inside the current span.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(ApiError::internal)?
}

fn attachment(name: &str, content_type: &'static str, body: Bytes) -> Result<Response, ApiError> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{name}\""))
        .map_err(ApiError::internal)?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum_test::{
        multipart::{MultipartForm, Part},
        TestResponse, TestServer,
    };
    use common::error::INVALID_TOKEN_MESSAGE;
    use tempfile::TempDir;

    use super::*;
    use crate::crypto::{CipherService, KEY_LEN};
    use crate::server::router;

    const LIMIT: usize = 64 * 1024;

    fn server_with(state: AppState) -> TestServer {
        TestServer::new(router::build(state, LIMIT)).unwrap()
    }

    fn test_server() -> (TempDir, TestServer) {
        let dir = tempfile::tempdir().unwrap();
        let server = server_with(AppState::for_tests(dir.path()));
        (dir, server)
    }

    fn upload(name: &str, data: &[u8]) -> MultipartForm {
        MultipartForm::new().add_part(FILE_FIELD, Part::bytes(data.to_vec()).file_name(name))
    }

    async fn post_file(server: &TestServer, path: &str, name: &str, data: &[u8]) -> TestResponse {
        server.post(path).multipart(upload(name, data)).await
    }

    fn disposition(resp: &TestResponse) -> String {
        resp.header(header::CONTENT_DISPOSITION)
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trip() {
        let (dir, server) = test_server();

        let enc = post_file(&server, "/encrypt", "notes.txt", b"hello world").await;
        assert_eq!(enc.status_code(), StatusCode::OK);
        assert_eq!(disposition(&enc), "attachment; filename=\"notes.txt.enc\"");
        let token = enc.as_bytes().to_vec();
        assert!(!token.windows(11).any(|w| w == b"hello world"));
        assert_eq!(
            fs::read(dir.path().join("encrypt/notes.txt.enc")).unwrap(),
            token
        );

        let dec = post_file(&server, "/decrypt", "notes.txt.enc", &token).await;
        assert_eq!(dec.status_code(), StatusCode::OK);
        assert_eq!(disposition(&dec), "attachment; filename=\"notes.txt\"");
        assert_eq!(dec.as_bytes().as_ref(), b"hello world");
        assert_eq!(
            fs::read(dir.path().join("decrypt/notes.txt")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn empty_file_round_trip() {
        let (_dir, server) = test_server();
        let enc = post_file(&server, "/encrypt", "empty.bin", b"").await;
        assert_eq!(enc.status_code(), StatusCode::OK);
        let dec = post_file(&server, "/decrypt", "empty.bin.enc", enc.as_bytes()).await;
        assert_eq!(dec.status_code(), StatusCode::OK);
        assert!(dec.as_bytes().is_empty());
    }

    #[tokio::test]
    async fn armored_token_round_trip() {
        let (_dir, server) = test_server();

        let enc = server
            .post("/encrypt")
            .add_query_param("armor", "true")
            .multipart(upload("a.txt", b"armored payload"))
            .await;
        assert_eq!(enc.status_code(), StatusCode::OK);
        let text = enc.text();
        assert!(text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));

        let dec = post_file(&server, "/decrypt", "a.txt.enc", text.as_bytes()).await;
        assert_eq!(dec.status_code(), StatusCode::OK);
        assert_eq!(dec.as_bytes().as_ref(), b"armored payload");
    }

    #[tokio::test]
    async fn decrypt_without_enc_suffix_appends_dec() {
        let (_dir, server) = test_server();
        let enc = post_file(&server, "/encrypt", "a.txt", b"x").await;
        let dec = post_file(&server, "/decrypt", "blob", enc.as_bytes()).await;
        assert_eq!(disposition(&dec), "attachment; filename=\"blob.dec\"");
    }

    #[tokio::test]
    async fn rejections_are_indistinguishable() {
        let (_dir, server) = test_server();
        let enc = post_file(&server, "/encrypt", "a.txt", b"secret data").await;
        let token = enc.as_bytes().to_vec();

        let mut tampered = token.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let truncated = token[..20].to_vec();

        let other = CipherService::new(&[0x99u8; KEY_LEN]).unwrap();
        let foreign = other.encrypt(b"secret data").unwrap();

        let garbage = b"definitely not a token".to_vec();

        let mut bodies = Vec::new();
        for bad in [tampered, truncated, foreign, garbage] {
            let resp = post_file(&server, "/decrypt", "a.txt.enc", &bad).await;
            assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
            bodies.push(resp.as_bytes().to_vec());
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));

        let err: ErrorResponse = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(err.code, "invalid_token");
        assert_eq!(err.message, INVALID_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn expired_token_rejected_when_ttl_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::for_tests(dir.path());
        let old_token = state.cipher.encrypt_at(b"old", 0).unwrap();

        let server = server_with(state.clone());
        let resp = post_file(&server, "/decrypt", "old.enc", &old_token).await;
        assert_eq!(resp.status_code(), StatusCode::OK);

        state.token_ttl = Some(Duration::from_secs(60));
        let server = server_with(state);
        let resp = post_file(&server, "/decrypt", "old.enc", &old_token).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = resp.json();
        assert_eq!(err.message, INVALID_TOKEN_MESSAGE);

        let fresh = post_file(&server, "/encrypt", "new.txt", b"new").await;
        let resp = post_file(&server, "/decrypt", "new.txt.enc", fresh.as_bytes()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let (_dir, server) = test_server();
        let form = MultipartForm::new().add_text("note", "no file here");
        let resp = server.post("/encrypt").multipart(form).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = resp.json();
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn non_multipart_body_is_bad_request() {
        let (_dir, server) = test_server();
        let resp = server.post("/encrypt").text("plain body").await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsafe_filename_is_rejected() {
        let (dir, server) = test_server();
        let resp = post_file(&server, "/encrypt", "../..", b"data").await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(fs::read_dir(dir.path().join("encrypt")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn traversal_filename_stays_inside_output_dir() {
        let (dir, server) = test_server();
        let resp = post_file(&server, "/encrypt", "../../etc/passwd", b"data").await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(dir.path().join("encrypt/etc_passwd.enc").is_file());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (_dir, server) = test_server();
        let big = vec![0u8; LIMIT * 2];
        let resp = post_file(&server, "/encrypt", "big.bin", &big).await;
        assert_eq!(resp.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn download_returns_produced_file() {
        let (_dir, server) = test_server();
        let enc = post_file(&server, "/encrypt", "report.pdf", b"%PDF-1.7").await;

        let resp = server.get("/download/encrypt/report.pdf.enc").await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.as_bytes(), enc.as_bytes());
        assert_eq!(disposition(&resp), "attachment; filename=\"report.pdf.enc\"");
    }

    #[tokio::test]
    async fn download_keeps_armored_content_type() {
        let (_dir, server) = test_server();
        let enc = server
            .post("/encrypt")
            .add_query_param("armor", "true")
            .multipart(upload("memo.txt", b"text token"))
            .await;
        assert_eq!(enc.header(header::CONTENT_TYPE), TEXT_PLAIN);

        let resp = server.get("/download/encrypt/memo.txt.enc").await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.header(header::CONTENT_TYPE), TEXT_PLAIN);
        assert_eq!(resp.as_bytes(), enc.as_bytes());

        post_file(&server, "/encrypt", "memo.txt", b"raw token").await;
        let resp = server.get("/download/encrypt/memo.txt.enc").await;
        assert_eq!(resp.header(header::CONTENT_TYPE), OCTET_STREAM);
    }

    #[test]
    fn token_content_type_follows_encoding() {
        assert_eq!(token_content_type(&[TOKEN_VERSION, 0, 0]), OCTET_STREAM);
        assert_eq!(token_content_type(b"AQID"), TEXT_PLAIN);
    }

    #[tokio::test]
    async fn download_rejects_unknown_folder() {
        let (_dir, server) = test_server();
        let resp = server.get("/download/uploads/a.txt").await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_missing_file_is_404() {
        let (_dir, server) = test_server();
        let resp = server.get("/download/decrypt/nothing.txt").await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        let err: ErrorResponse = resp.json();
        assert_eq!(err.code, "not_found");
    }

    #[tokio::test]
    async fn download_rejects_encoded_traversal() {
        let (dir, server) = test_server();
        fs::write(dir.path().join("secret.key"), [0u8; KEY_LEN]).unwrap();
        let resp = server.get("/download/encrypt/..%2Fsecret.key").await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_storage() {
        let (_dir, server) = test_server();
        let resp = server.get("/health").await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        let body: HealthResponse = resp.json();
        assert_eq!(body.status, "ok");
        assert!(body.storage_ready);
    }

    #[tokio::test]
    async fn health_degraded_when_storage_removed() {
        let (dir, server) = test_server();
        fs::remove_dir_all(dir.path().join("decrypt")).unwrap();
        let resp = server.get("/health").await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
