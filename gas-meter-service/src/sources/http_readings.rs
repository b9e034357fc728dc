use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use gas_meter_core::{
    domain::{ConsumptionEstimate, Reading, ReadingLog},
    MeterError,
};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use super::IncomingReading;
use crate::{
    command::{ReadingCommand, Reply},
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
    state_board::{PublishedStates, StateBoard},
};

#[derive(Clone)]
struct AppState {
    tx: mpsc::Sender<Envelope<ReadingCommand>>,
    board: StateBoard,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn status_for(e: &MeterError) -> StatusCode {
    match e {
        MeterError::Parse(_) | MeterError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MeterError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        MeterError::HistorySource(_) => StatusCode::BAD_GATEWAY,
    }
}

fn api_error(e: MeterError) -> ApiError {
    (
        status_for(&e),
        Json(ErrorBody {
            kind: e.kind(),
            error: e.to_string(),
        }),
    )
}

fn unavailable() -> ApiError {
    metrics::counter!("http_commands_failed_total").increment(1);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody {
            kind: "unavailable",
            error: "gas meter is not accepting commands".to_string(),
        }),
    )
}

/// HTTP endpoint through which the host submits readings and queries
/// results.
///
/// Routes:
/// - `POST /services/trigger_gas_update`
/// - `GET /services/read_gas_actualdata_file`
/// - `GET /estimate`
/// - `GET /states`
#[derive(Clone)]
pub struct HttpReadingSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<ReadingCommand>>>>>,
}

impl HttpReadingSource {
    pub async fn new(bind_addr: &str, channel_capacity: usize, board: StateBoard) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let app = router(AppState { tx, board });

        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind {addr}: {e}")))?;

        tokio::spawn(async move {
            tracing::info!(%addr, "reading source listening");
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "HTTP reading source server error");
            }
        });

        Ok(Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        })
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/services/trigger_gas_update", post(trigger_gas_update))
        .route("/services/read_gas_actualdata_file", get(read_gas_actualdata_file))
        .route("/estimate", get(estimate))
        .route("/states", get(states))
        .with_state(state)
}

#[async_trait::async_trait]
impl Source<ReadingCommand> for HttpReadingSource {
    async fn stream(&self) -> EnvelopeStream<ReadingCommand> {
        let mut guard = self.receiver.lock().await;
        let Some(rx) = guard.take() else {
            tracing::error!("HttpReadingSource stream already taken; only one consumer supported");
            return Box::pin(futures::stream::once(async {
                Err(PipelineError::Source("reading stream already taken".to_string()))
            }));
        };

        Box::pin(ReceiverStream::new(rx).map(Ok))
    }
}

/// Queue a command and wait for the sink's answer.
async fn submit<T>(
    state: &AppState,
    build: impl FnOnce(Reply<T>) -> ReadingCommand,
) -> Result<T, ApiError> {
    metrics::counter!("http_commands_total").increment(1);

    let (tx, rx) = oneshot::channel();
    let env = Envelope::new(build(tx), "http");
    state.tx.send(env).await.map_err(|_| unavailable())?;

    match rx.await {
        Ok(res) => res.map_err(api_error),
        // The command was dropped without an answer.
        Err(_) => Err(unavailable()),
    }
}

async fn trigger_gas_update(
    State(state): State<AppState>,
    Json(payload): Json<IncomingReading>,
) -> Result<Json<Reading>, ApiError> {
    let consumed_gas = payload.consumed_gas.into_text();
    let reading = submit(&state, move |reply| ReadingCommand::Apply {
        datetime: payload.datetime,
        consumed_gas,
        reply: Some(reply),
    })
    .await?;
    Ok(Json(reading))
}

async fn read_gas_actualdata_file(State(state): State<AppState>) -> Result<Json<ReadingLog>, ApiError> {
    let log = submit(&state, |reply| ReadingCommand::ReadLog { reply: Some(reply) }).await?;
    Ok(Json(log))
}

async fn estimate(State(state): State<AppState>) -> Result<Json<Option<ConsumptionEstimate>>, ApiError> {
    let at = OffsetDateTime::now_utc();
    let est = submit(&state, move |reply| ReadingCommand::Estimate {
        at,
        reply: Some(reply),
    })
    .await?;
    Ok(Json(est))
}

async fn states(State(state): State<AppState>) -> Json<PublishedStates> {
    Json(state.board.snapshot().await)
}
