//! HTTP stats service.
//!
//! Three routes cover the whole surface:
//! - `GET /` serves the visualization document
//! - `GET /profile` serves the held report as gzipped JSON;
//!   `POST /profile` merges a gzipped JSON submission into it
//! - everything else resolves as a static asset
//!
//! The held report is the only shared mutable state. It sits behind a
//! read/write lock; handlers never hold the lock across an await, so
//! concurrent readers proceed freely and a writer excludes them only
//! for the merge itself.

use crate::report::Report;
use crate::server::assets::{content_type_for, AssetDir};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, error, info};
use serde_json::Value;
use std::io;
use std::io::{Read, Write};
use std::sync::{Arc, RwLock};

/// Shared state: the report being served plus the asset root
pub struct ServerState {
    report: RwLock<Report>,
    assets: AssetDir,
}

impl ServerState {
    pub fn new(report: Report, assets: AssetDir) -> Self {
        Self {
            report: RwLock::new(report),
            assets,
        }
    }
}

/// Gzip-compress a byte buffer
pub fn compress_data(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip byte buffer
pub fn decompress_data(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// **Public** - Builds the service router over shared state.
///
/// Split out from [`serve`] so tests can drive the same router on an
/// ephemeral port.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/profile", get(get_profile).post(post_profile))
        .fallback(serve_asset)
        .with_state(state)
}

/// **Public** - Binds and runs the stats server until the process is
/// stopped.
///
/// # Arguments
/// * `host` - Host name or address to bind
/// * `port` - TCP port to listen on
/// * `state` - Held report and asset root
///
/// # Errors
/// Returns the underlying I/O error when the address cannot be bound
/// or the server loop fails.
pub async fn serve(host: &str, port: u16, state: Arc<ServerState>) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Stats server available at http://{}:{}", host, port);
    axum::serve(listener, app).await
}

async fn serve_index(State(state): State<Arc<ServerState>>) -> Response {
    asset_response(&state, "index.html")
}

async fn serve_asset(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    asset_response(&state, uri.path())
}

fn asset_response(state: &ServerState, asset_path: &str) -> Response {
    match state.assets.read(asset_path) {
        Ok(data) => {
            ([(header::CONTENT_TYPE, content_type_for(asset_path))], data).into_response()
        }
        Err(err) => {
            debug!("Asset '{}' not served: {}", asset_path, err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn get_profile(State(state): State<Arc<ServerState>>) -> Response {
    let serialized = {
        let held = match state.report.read() {
            Ok(guard) => guard,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
        serde_json::to_vec(&*held)
    };

    let body = match serialized {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to serialize held report: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match compress_data(&body) {
        Ok(compressed) => (
            [
                (header::CONTENT_TYPE, "text/json"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            compressed,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to compress report: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_profile(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let decompressed = match decompress_data(&body) {
        Ok(data) => data,
        Err(err) => {
            debug!("Rejecting submission, not gzip: {}", err);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let value: Value = match serde_json::from_slice(&decompressed) {
        Ok(value) => value,
        Err(err) => {
            debug!("Rejecting submission, not JSON: {}", err);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let incoming = match Report::from_value(value) {
        Ok(report) => report,
        Err(err) => {
            debug!("Rejecting submission: {}", err);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let mut held = match state.report.write() {
        Ok(guard) => guard,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    held.merge(incoming);
    info!("Merged submitted report; now holding {} mode(s)", held.len());
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_round_trip() {
        let payload = br#"{"c": {"runTime": 1.5}}"#;
        let compressed = compress_data(payload).unwrap();
        assert_ne!(compressed, payload.to_vec());

        let decompressed = decompress_data(&compressed).unwrap();
        assert_eq!(decompressed, payload.to_vec());
    }

    #[test]
    fn test_decompress_rejects_plain_bytes() {
        assert!(decompress_data(b"not gzip at all").is_err());
    }

    #[test]
    fn test_compress_empty_payload() {
        let compressed = compress_data(b"").unwrap();
        assert_eq!(decompress_data(&compressed).unwrap(), Vec::<u8>::new());
    }
}
