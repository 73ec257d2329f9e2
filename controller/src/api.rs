//! HTTP control and observability surface.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use fanpilot_common::{Breakpoint, ListEntry, Storage, StorageStatus};

use crate::device::{Device, UpdateError};

const TEXT_PLAIN: &str = "text/plain";
const MAX_PWM_PERCENT: u8 = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    MalformedBody(String),
    #[error("{0}")]
    Persistence(String),
    #[error("{0}")]
    NotFound(String),
    #[error("WrongMethod")]
    WrongMethod,
    #[error("FS INIT ERROR")]
    StorageUnavailable,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MalformedBody(_)
            | Self::Persistence(_)
            | Self::WrongMethod
            | Self::StorageUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::NotFound(message) => {
                info!("{message}");
                error_response(status, message)
            }
            other => {
                let message = other.to_string();
                warn!("{} {message}", status.as_u16());
                error_response(status, format!("{message}\r\n"))
            }
        }
    }
}

impl From<UpdateError> for ApiError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Invalid(err) => Self::Validation(err.to_string()),
            UpdateError::Persist(err) => Self::Persistence(err.to_string()),
        }
    }
}

pub fn router(device: Device) -> Router {
    Router::new()
        .route("/status", get(handle_status).fallback(handle_file_read))
        .route("/list", get(handle_list).fallback(handle_file_read))
        .route(
            "/pwm",
            get(handle_get_pwm)
                .put(handle_put_pwm_root)
                .fallback(handle_wrong_method),
        )
        .route(
            "/pwm/",
            put(handle_put_pwm_root).fallback(handle_wrong_method),
        )
        .route(
            "/pwm/{*value}",
            put(handle_put_pwm).fallback(handle_wrong_method),
        )
        .route(
            "/metrics",
            get(handle_metrics).fallback(handle_wrong_method),
        )
        .route(
            "/autopilot",
            get(handle_get_autopilot)
                .post(handle_post_autopilot)
                .fallback(handle_wrong_method),
        )
        .fallback(handle_file_read)
        .layer(TraceLayer::new_for_http())
        .with_state(device)
}

/// Runs `work` against the storage on tokio's blocking pool.
async fn on_storage<T, F>(device: &Device, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Storage) -> Result<T, ApiError> + Send + 'static,
{
    let storage = Arc::clone(device.settings().storage());
    tokio::task::spawn_blocking(move || work(storage.as_ref()))
        .await
        .map_err(|err| ApiError::Persistence(format!("storage task failed: {err}")))?
}

async fn handle_status(State(device): State<Device>) -> Result<Json<StorageStatus>, ApiError> {
    info!("handleStatus");
    let status = on_storage(&device, |storage| Ok(StorageStatus::from_storage(storage))).await?;
    Ok(Json(status))
}

/// Streams the directory listing one entry per chunk.
async fn handle_list(
    State(device): State<Device>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let entries = on_storage(&device, move |storage| {
        if !storage.is_available() {
            return Err(ApiError::StorageUnavailable);
        }
        let Some(dir) = params.get("dir") else {
            return Err(ApiError::Validation("DIR ARG MISSING".to_string()));
        };
        if dir != "/" && !storage.exists(dir) {
            return Err(ApiError::Validation("BAD PATH".to_string()));
        }

        info!("handleFileList: {dir}");
        storage
            .list_dir(dir)
            .map_err(|_| ApiError::Validation("BAD PATH".to_string()))
    })
    .await?;

    let items = entries.into_iter().enumerate().map(|(index, entry)| {
        let separator = if index == 0 { "" } else { "," };
        serde_json::to_string(&ListEntry::from(&entry)).map(|json| format!("{separator}{json}"))
    });
    let chunks = stream::once(async { Ok("[".to_string()) })
        .chain(stream::iter(items))
        .chain(stream::once(async { Ok("]".to_string()) }));

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(chunks),
    )
        .into_response())
}

async fn handle_get_pwm(State(device): State<Device>) -> impl IntoResponse {
    text_response(device.pwm().await.current.to_string())
}

async fn handle_put_pwm_root() -> ApiError {
    ApiError::Validation("BAD PATH".to_string())
}

async fn handle_put_pwm(
    State(device): State<Device>,
    Path(value): Path<String>,
) -> Result<Response, ApiError> {
    let duty = parse_pwm_segment(&value)?;
    info!("new target pwm of {duty}");

    let current = device
        .set_pwm(duty)
        .await
        .map_err(|err| ApiError::Persistence(format!("failed to persist pwm value: {err}")))?;

    Ok(text_response(current.to_string()))
}

fn parse_pwm_segment(value: &str) -> Result<u8, ApiError> {
    let value = value.trim_matches('/');
    if value.is_empty() || value.contains('/') {
        return Err(ApiError::Validation("BAD PATH".to_string()));
    }
    if !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ApiError::Validation(format!(
            "invalid pwm value `{value}`, expected 0-100"
        )));
    }
    match value.parse::<u8>() {
        Ok(duty) if duty <= MAX_PWM_PERCENT => Ok(duty),
        _ => Err(ApiError::Validation(format!(
            "invalid pwm value `{value}`, expected 0-100"
        ))),
    }
}

async fn handle_metrics(State(device): State<Device>) -> impl IntoResponse {
    text_response(device.metrics().await.render())
}

async fn handle_get_autopilot(State(device): State<Device>) -> impl IntoResponse {
    Json(device.table().await.to_vec())
}

async fn handle_post_autopilot(
    State(device): State<Device>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let entries: Vec<Breakpoint> = serde_json::from_slice(&body)
        .map_err(|err| ApiError::MalformedBody(format!("invalid autopilot json: {err}")))?;

    let table = device.replace_table(&entries).await?;
    Ok(Json(table.to_vec()).into_response())
}

async fn handle_wrong_method() -> ApiError {
    ApiError::WrongMethod
}

/// Serves a stored file for any path without an explicit route.
async fn handle_file_read(
    State(device): State<Device>,
    method: Method,
    uri: Uri,
    Query(args): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let uri_path = percent_decode_str(uri.path()).decode_utf8_lossy().into_owned();
    let mut path = uri_path.clone();
    if path.ends_with('/') {
        path.push_str("index.htm");
    }
    info!("handleFileRead: {path}");

    let content_type = if args.iter().any(|(name, _)| name == "download") {
        mime_guess::mime::APPLICATION_OCTET_STREAM
    } else {
        mime_guess::from_path(&path).first_or_octet_stream()
    };

    let file = on_storage(&device, move |storage| {
        if !storage.is_available() {
            return Err(ApiError::StorageUnavailable);
        }
        let (stored_path, gzipped) = if storage.exists(&path) {
            (path, false)
        } else {
            (format!("{path}.gz"), true)
        };
        match storage.read(&stored_path) {
            Ok(bytes) => Ok(bytes.map(|bytes| (bytes, gzipped))),
            Err(err) => {
                warn!("failed to read {stored_path}: {err}");
                Ok(None)
            }
        }
    })
    .await?;
    let Some((bytes, gzipped)) = file else {
        return Err(ApiError::NotFound(not_found_message(&uri_path, &method, &args)));
    };

    let mut response = ([(header::CONTENT_TYPE, content_type.to_string())], bytes).into_response();
    if gzipped {
        response
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    Ok(response)
}

fn not_found_message(uri: &str, method: &Method, args: &[(String, String)]) -> String {
    let mut message = format!(
        "Error: File not found\n\nURI: {uri}\nMethod: {method}\nArguments: {}\n",
        args.len()
    );
    for (name, value) in args {
        message.push_str(&format!(" NAME:{name}\n VALUE:{value}\n"));
    }
    message
}

fn text_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], message).into_response()
}
