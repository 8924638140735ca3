use axum::Json;
use axum::body::Bytes;
use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use cordial_consensus::pipeline::ProcessingCounters;
use cordial_consensus_core::MinerId;
use cordial_consensus_core::block::Block;
use cordial_core::runtime::{Service, ShutdownToken};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const INGRESS: &str = "ingress";
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

#[derive(Clone)]
struct IngressState {
    me: MinerId,
    payload_sender: Sender<Option<Value>>,
    block_sender: Sender<Block>,
    counters: Arc<ProcessingCounters>,
}

#[derive(Serialize)]
struct MessageResponse {
    miner: MinerId,
    round: i64,
    blocks: u64,
    output: u64,
    equivocators: std::collections::BTreeMap<MinerId, Vec<cordial_consensus_core::Hash>>,
}

// Any JSON body is one client payload; a non-JSON body requests a filler
// block. The reply is a diagnostic snapshot.
async fn message_handler(AxumState(state): AxumState<IngressState>, body: Bytes) -> Response {
    let message = serde_json::from_slice::<Value>(&body).ok();
    if state.payload_sender.send(message).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let snapshot = state.counters.snapshot();
    Json(MessageResponse {
        miner: state.me,
        round: snapshot.round,
        blocks: snapshot.blocklace_size,
        output: snapshot.output_count,
        equivocators: snapshot.equivocators,
    })
    .into_response()
}

// A JSON array of blocks; malformed entries are dropped.
async fn blocks_handler(AxumState(state): AxumState<IngressState>, body: Bytes) -> Response {
    let Ok(blocks) = serde_json::from_slice::<Vec<Value>>(&body) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    for value in blocks {
        match serde_json::from_value::<Block>(value) {
            Ok(block) => {
                if state.block_sender.send(block).is_err() {
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            Err(err) => debug!("dropping unparsable block: {}", err),
        }
    }
    (StatusCode::OK, "Success").into_response()
}

/// HTTP ingress façade: translates client messages and peer block broadcasts
/// into the two core channels. Runs its own tokio runtime on the service
/// thread; the graceful-shutdown future polls the runtime's shutdown token.
pub struct IngressService {
    listen: SocketAddr,
    state: IngressState,
}

impl IngressService {
    pub fn new(
        listen: SocketAddr,
        me: MinerId,
        payload_sender: Sender<Option<Value>>,
        block_sender: Sender<Block>,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        Self { listen, state: IngressState { me, payload_sender, block_sender, counters } }
    }
}

impl Service for IngressService {
    fn name(&self) -> &'static str {
        INGRESS
    }

    fn run(self: Arc<Self>, shutdown: ShutdownToken) {
        let app = axum::Router::new()
            .route("/message", post(message_handler))
            .route("/blocks", post(blocks_handler))
            .with_state(self.state.clone());
        let listen = self.listen;

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed building the ingress runtime")
            .block_on(async move {
                let listener = tokio::net::TcpListener::bind(listen).await.expect("Failed binding the ingress port");
                info!("[{}] listening on {}", INGRESS, listen);
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    while !shutdown.is_triggered() {
                        tokio::time::sleep(SHUTDOWN_POLL).await;
                    }
                });
                if let Err(err) = serve.await {
                    warn!("[{}] server error: {}", INGRESS, err);
                }
            });
    }
}
