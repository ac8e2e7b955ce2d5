use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::unix_socket;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

fn full_body<T: Into<Bytes>>(chunk: T) -> BoxBody {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

/// Shared state reachable from every connection handler.
struct ControlState {
    reconciler: Arc<Reconciler>,
    logfile: PathBuf,
    shutdown: CancellationToken,
}

/// Listen on the configured control socket and serve the endpoints in §4.5
/// until `root_cancel` fires. Each inbound connection is served on its own
/// task; per-request errors are logged and turned into a `500`, the server
/// itself keeps running.
pub async fn run(
    socket_spec: &str, reconciler: Arc<Reconciler>, logfile: PathBuf, root_cancel: CancellationToken,
) -> Result<()> {
    let listener = unix_socket::bind(socket_spec)?;
    info!(socket = %socket_spec, "control server listening");

    let state = Arc::new(ControlState { reconciler, logfile, shutdown: root_cancel.clone() });

    loop {
        tokio::select! {
            _ = root_cancel.cancelled() => {
                info!("control server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept control connection");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| handle(Arc::clone(&state), req));
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(error = %e, "control connection error");
                    }
                });
            }
        }
    }
}

async fn handle(
    state: Arc<ControlState>, req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => Response::new(full_body("hello")),
        (&Method::GET, "/ready") => Response::new(full_body("ok")),
        (&Method::GET, "/status") => status_response(&state).await,
        (&Method::GET, "/logfile") => Response::builder()
            .header("content-type", "text/plain")
            .body(full_body(state.logfile.to_string_lossy().into_owned()))
            .unwrap_or_else(|e| internal_error(e)),
        (&Method::DELETE, "/stop") => {
            state.shutdown.cancel();
            Response::new(full_body("stopping"))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(full_body("not found"))
            .unwrap_or_else(|e| internal_error(e)),
    };
    Ok(response)
}

async fn status_response(state: &ControlState) -> Response<BoxBody> {
    let snapshot = state.reconciler.status().await;
    match serde_json::to_vec(&snapshot) {
        Ok(json) => Response::builder()
            .header("content-type", "application/json")
            .body(full_body(json))
            .unwrap_or_else(internal_error),
        Err(e) => {
            error!(error = %e, "failed to encode status");
            internal_error(e)
        }
    }
}

fn internal_error(e: impl std::fmt::Display) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(full_body(e.to_string()))
        .expect("building a 500 response never fails")
}
