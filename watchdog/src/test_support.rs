//! In-process stand-in for the registry and both nodes, served by axum on an
//! ephemeral port.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

impl Reply {
    fn ok(body: String) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }
}

struct MockState {
    registry: Mutex<Reply>,
    local: Mutex<Reply>,
    reference: Mutex<Reply>,
    registry_hits: AtomicUsize,
    local_hits: AtomicUsize,
    reference_hits: AtomicUsize,
}

pub struct MockCluster {
    base_url: String,
    state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

pub const NODE_HOST: &str = "node1.example.net";

fn index_body(index: u64) -> String {
    format!(r#"{{"lastIndex":{}}}"#, index)
}

async fn serve(reply: Reply, hits: &AtomicUsize) -> (StatusCode, String) {
    hits.fetch_add(1, Ordering::SeqCst);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, reply.body)
}

async fn registry_nodes(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    let reply = state.registry.lock().unwrap().clone();
    serve(reply, &state.registry_hits).await
}

async fn local_index(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    let reply = state.local.lock().unwrap().clone();
    serve(reply, &state.local_hits).await
}

async fn reference_index(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    let reply = state.reference.lock().unwrap().clone();
    serve(reply, &state.reference_hits).await
}

impl MockCluster {
    /// Registered node, both indices at 900.
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            registry: Mutex::new(Reply::ok(format!(
                r#"[{{"address":"{}:6863"}},{{"address":"other.example.net:6863"}}]"#,
                NODE_HOST
            ))),
            local: Mutex::new(Reply::ok(index_body(900))),
            reference: Mutex::new(Reply::ok(index_body(900))),
            registry_hits: AtomicUsize::new(0),
            local_hits: AtomicUsize::new(0),
            reference_hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/registry/nodes", get(registry_nodes))
            .route("/local/transaction/lastIndex", get(local_index))
            .route("/reference/transaction/lastIndex", get(reference_index))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("No local addr");

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server,
        }
    }

    pub fn registry_url(&self) -> String {
        format!("{}/registry", self.base_url)
    }

    pub fn registry_nodes_url(&self) -> String {
        format!("{}/registry/nodes", self.base_url)
    }

    pub fn local_url(&self) -> String {
        format!("{}/local", self.base_url)
    }

    pub fn local_index_url(&self) -> String {
        format!("{}/local/transaction/lastIndex", self.base_url)
    }

    pub fn reference_url(&self) -> String {
        format!("{}/reference", self.base_url)
    }

    pub fn set_registry(&self, status: u16, body: &str) {
        *self.state.registry.lock().unwrap() = Reply {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        };
    }

    pub fn set_indices(&self, local: u64, reference: u64) {
        *self.state.local.lock().unwrap() = Reply::ok(index_body(local));
        *self.state.reference.lock().unwrap() = Reply::ok(index_body(reference));
    }

    pub fn set_local_body(&self, body: &str) {
        self.state.local.lock().unwrap().body = body.to_string();
    }

    pub fn set_reference_body(&self, body: &str) {
        self.state.reference.lock().unwrap().body = body.to_string();
    }

    pub fn set_reference_status(&self, status: u16) {
        self.state.reference.lock().unwrap().status = status;
    }

    pub fn set_local_delay(&self, delay: Duration) {
        self.state.local.lock().unwrap().delay = delay;
    }

    pub fn set_registry_delay(&self, delay: Duration) {
        self.state.registry.lock().unwrap().delay = delay;
    }

    pub fn registry_hits(&self) -> usize {
        self.state.registry_hits.load(Ordering::SeqCst)
    }

    /// Requests made to either node's index endpoint.
    pub fn index_hits(&self) -> usize {
        self.state.local_hits.load(Ordering::SeqCst)
            + self.state.reference_hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        self.server.abort();
    }
}
