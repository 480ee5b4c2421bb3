use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Configuration for [`MockContentsApi`].
#[derive(Clone, Debug, Default)]
pub struct MockContentsApiConfig {
    initial: Option<Vec<u8>>,
}

impl MockContentsApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with an existing document.
    #[must_use]
    pub fn with_document(mut self, bytes: Vec<u8>) -> Self {
        self.initial = Some(bytes);
        self
    }
}

struct ApiState {
    file: Option<(Vec<u8>, String)>,
    next_sha: u64,
    failing_gets: u32,
    failing_puts: u32,
    gets: u64,
    puts: u64,
}

impl ApiState {
    fn mint_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("mock-sha-{:04}", self.next_sha)
    }
}

/// Minimal stand-in for the GitHub contents API, serving a single file.
///
/// Speaks just enough of `GET`/`PUT /repos/{owner}/{repo}/contents/{path}`
/// for the connector: base64 bodies wrapped in newlines, `sha` preconditions
/// answered with 404/409/422 the way GitHub answers them, and scriptable
/// 500s for outage testing.
pub struct MockContentsApi {
    addr: SocketAddr,
    state: Arc<Mutex<ApiState>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockContentsApi {
    pub async fn start(config: MockContentsApiConfig) -> Result<Self> {
        let mut state = ApiState {
            file: None,
            next_sha: 0,
            failing_gets: 0,
            failing_puts: 0,
            gets: 0,
            puts: 0,
        };
        if let Some(bytes) = config.initial {
            let sha = state.mint_sha();
            state.file = Some((bytes, sha));
        }
        let state = Arc::new(Mutex::new(state));

        let service_state = state.clone();
        let make = make_service_fn(move |_conn| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req)))
            }
        });

        let server = Server::try_bind(&SocketAddr::from(([127, 0, 0, 1], 0)))?.serve(make);
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async move {
            let _ = rx.await;
        });
        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                warn!(error = %err, "mock contents api exited with error");
            }
        });

        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// Base URL to point a connector at, e.g. `http://127.0.0.1:PORT`.
    pub fn rest_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Current raw document bytes, if the file exists.
    pub fn document(&self) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .file
            .as_ref()
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn get_count(&self) -> u64 {
        self.state.lock().unwrap().gets
    }

    pub fn put_count(&self) -> u64 {
        self.state.lock().unwrap().puts
    }

    /// Answer the next `count` GET requests with a 500.
    pub fn fail_next_gets(&self, count: u32) {
        self.state.lock().unwrap().failing_gets += count;
    }

    /// Answer the next `count` PUT requests with a 500.
    pub fn fail_next_puts(&self, count: u32) {
        self.state.lock().unwrap().failing_puts += count;
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[derive(Deserialize)]
struct PutBody {
    message: String,
    content: String,
    #[allow(dead_code)]
    branch: Option<String>,
    sha: Option<String>,
}

async fn handle(
    state: Arc<Mutex<ApiState>>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if !(path.starts_with("/repos/") && path.contains("/contents/")) {
        return Ok(respond(
            StatusCode::NOT_FOUND,
            json!({ "message": "Not Found" }),
        ));
    }

    match method {
        Method::GET => Ok(handle_get(&state)),
        Method::PUT => {
            let body = match hyper::body::to_bytes(req.into_body()).await {
                Ok(body) => body,
                Err(_) => {
                    return Ok(respond(
                        StatusCode::BAD_REQUEST,
                        json!({ "message": "unreadable body" }),
                    ))
                }
            };
            Ok(handle_put(&state, &body))
        }
        _ => Ok(respond(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "message": "Method Not Allowed" }),
        )),
    }
}

fn handle_get(state: &Arc<Mutex<ApiState>>) -> Response<Body> {
    let mut state = state.lock().unwrap();
    state.gets += 1;
    if state.failing_gets > 0 {
        state.failing_gets -= 1;
        return respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "Server Error" }),
        );
    }
    match &state.file {
        None => respond(StatusCode::NOT_FOUND, json!({ "message": "Not Found" })),
        Some((bytes, sha)) => respond(
            StatusCode::OK,
            json!({
                "sha": sha,
                "encoding": "base64",
                "content": wrap_base64(&STANDARD.encode(bytes)),
            }),
        ),
    }
}

fn handle_put(state: &Arc<Mutex<ApiState>>, body: &[u8]) -> Response<Body> {
    let mut state = state.lock().unwrap();
    state.puts += 1;
    if state.failing_puts > 0 {
        state.failing_puts -= 1;
        return respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "Server Error" }),
        );
    }

    let put: PutBody = match serde_json::from_slice(body) {
        Ok(put) => put,
        Err(err) => {
            return respond(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": format!("Invalid request: {err}") }),
            )
        }
    };
    let decoded = match STANDARD.decode(put.content.replace(['\n', '\r'], "")) {
        Ok(decoded) => decoded,
        Err(_) => {
            return respond(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": "content is not valid base64" }),
            )
        }
    };
    if put.message.is_empty() {
        return respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "message": "message is required" }),
        );
    }

    let current = state.file.as_ref().map(|(_, sha)| sha.clone());
    match (current.as_deref(), put.sha.as_deref()) {
        // fresh create
        (None, None) => {
            let sha = state.mint_sha();
            state.file = Some((decoded, sha.clone()));
            respond(
                StatusCode::CREATED,
                json!({ "content": { "sha": sha }, "commit": {} }),
            )
        }
        // update against a file that no longer exists
        (None, Some(_)) => respond(
            StatusCode::CONFLICT,
            json!({ "message": "file does not exist" }),
        ),
        // create raced with an existing file
        (Some(_), None) => respond(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "message": "\"sha\" wasn't supplied" }),
        ),
        (Some(current), Some(supplied)) => {
            if supplied == current {
                let sha = state.mint_sha();
                state.file = Some((decoded, sha.clone()));
                respond(
                    StatusCode::OK,
                    json!({ "content": { "sha": sha }, "commit": {} }),
                )
            } else {
                respond(
                    StatusCode::CONFLICT,
                    json!({ "message": format!("is at {current} but expected {supplied}") }),
                )
            }
        }
    }
}

fn respond(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("static response parts")
}

// GitHub wraps base64 bodies at 60 columns; the connector must tolerate it.
fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| std::str::from_utf8(chunk).expect("base64 is ascii"))
        .collect::<Vec<_>>()
        .join("\n")
}
