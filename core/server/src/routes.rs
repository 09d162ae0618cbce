//! HTTP routes exposing the remote profile layout.
//!
//! - `GET`/`PUT /SyncClipboard.json`: profile document
//! - `GET`/`PUT /file/{name}`: payload files
//!
//! Every route requires basic authentication.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path as UrlPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use syncboard_common::Error;
use syncboard_storage::{payload_path, write_atomic, RemoteProfile, PAYLOAD_DIRNAME, PROFILE_FILENAME};

use crate::config::ServerConfig;

/// Basic authentication credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    user_name: String,
    password: String,
}

impl Credentials {
    /// Whether an `Authorization` header value grants access.
    fn accepts(&self, header: &str) -> bool {
        let Some(encoded) = header.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, password)) => user == self.user_name && password == self.password,
            None => false,
        }
    }
}

/// State shared across handlers.
#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
    credentials: Arc<Credentials>,
}

/// Handler error mapped to an HTTP status.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Request failed: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Build the router serving the layout under `root`.
pub fn router(root: PathBuf, config: &ServerConfig) -> Router {
    let state = AppState {
        root: Arc::new(root),
        credentials: Arc::new(Credentials {
            user_name: config.user_name.clone(),
            password: config.password.clone(),
        }),
    };

    Router::new()
        .route(
            &format!("/{}", PROFILE_FILENAME),
            get(get_profile).put(put_profile),
        )
        .route(
            &format!("/{}/{{name}}", PAYLOAD_DIRNAME),
            get(get_payload).put(put_payload),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .with_state(state)
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| state.credentials.accepts(value));

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"syncboard\"")],
            "Authorization required",
        )
            .into_response();
    }
    next.run(request).await
}

async fn read_file(path: &Path, label: &str) -> Result<Vec<u8>, Error> {
    match fs::read(path).await {
        Ok(data) => Ok(data),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(label.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

async fn get_profile(State(state): State<AppState>) -> Result<Response, ApiError> {
    let data = read_file(&state.root.join(PROFILE_FILENAME), PROFILE_FILENAME).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], data).into_response())
}

async fn put_profile(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let json = std::str::from_utf8(&body)
        .map_err(|e| Error::InvalidInput(format!("Profile is not UTF-8: {}", e)))?;
    let profile = RemoteProfile::from_json(json)?;

    write_atomic(&state.root, &state.root.join(PROFILE_FILENAME), &body).await?;
    debug!(kind = %profile.kind, "Profile updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_payload(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, ApiError> {
    let path = payload_path(&state.root, &name)?;
    let data = read_file(&path, &name).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

async fn put_payload(
    State(state): State<AppState>,
    UrlPath(name): UrlPath<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path = payload_path(&state.root, &name)?;
    write_atomic(&state.root, &path, &body).await?;
    debug!(name, size = body.len(), "Payload stored");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            user_name: "admin".to_string(),
            password: "s3cret:with:colons".to_string(),
        }
    }

    #[test]
    fn test_accepts_matching_basic_auth() {
        let header = format!("Basic {}", STANDARD.encode("admin:s3cret:with:colons"));
        assert!(credentials().accepts(&header));
    }

    #[test]
    fn test_rejects_wrong_or_malformed_auth() {
        let wrong = format!("Basic {}", STANDARD.encode("admin:guess"));
        assert!(!credentials().accepts(&wrong));
        assert!(!credentials().accepts("Basic not-base64!"));
        assert!(!credentials().accepts("Bearer token"));
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |err| ApiError(err).into_response().status();
        assert_eq!(status(Error::NotFound("x".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::InvalidInput("x".to_string())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::Timeout), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
