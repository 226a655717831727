//! Actix Web server exposing the annotated MJPEG stream at `GET /stream`.
//!
//! Every request gets a dedicated session thread that runs the blocking
//! pipeline and hands parts to the response body through a one-slot channel.
//! When the client goes away actix drops the body, the channel closes, and
//! the session's next write fails.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::stream::{
    StreamConfig,
    pipeline::FramePipeline,
    session::{MULTIPART_CONTENT_TYPE, PartSink, SessionEnd, StreamSession, TransportWriteError},
    telemetry,
};

/// Shared state backing the HTTP handler.
pub(crate) struct ServerState {
    pipeline: Arc<FramePipeline>,
    next_session: AtomicU64,
}

impl ServerState {
    pub(crate) fn new(pipeline: Arc<FramePipeline>) -> Self {
        Self {
            pipeline,
            next_session: AtomicU64::new(1),
        }
    }
}

/// Session side of the response body channel.
struct ChannelSink(mpsc::Sender<Bytes>);

impl PartSink for ChannelSink {
    fn write_part(&mut self, part: Bytes) -> Result<(), TransportWriteError> {
        self.0.blocking_send(part).map_err(|_| TransportWriteError)
    }
}

pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/stream", web::get().to(stream_handler));
}

/// Run the HTTP server on the current thread until it shuts down.
pub(crate) fn serve(pipeline: Arc<FramePipeline>, config: &StreamConfig) -> Result<()> {
    let state = web::Data::new(ServerState::new(pipeline));
    let bind = (config.bind_host.clone(), config.port);
    let workers = config.workers;

    actix_web::rt::System::new().block_on(async move {
        let mut server =
            HttpServer::new(move || App::new().app_data(state.clone()).configure(configure));
        if let Some(workers) = workers {
            server = server.workers(workers);
        }
        server
            .bind(bind.clone())
            .with_context(|| format!("Failed to bind {}:{}", bind.0, bind.1))?
            .run()
            .await
            .context("HTTP server error")
    })
}

/// Stream annotated frames as `multipart/x-mixed-replace`.
async fn stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let id = state.next_session.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel::<Bytes>(1);
    let pipeline = state.pipeline.clone();

    let spawned = telemetry::spawn_thread(format!("stream-session-{id}"), move || {
        let mut session = StreamSession::new(id);
        let mut sink = ChannelSink(tx);
        let end = session.run(&pipeline, &mut sink);
        let (sent, skipped, state) = (
            session.frames_sent(),
            session.frames_skipped(),
            session.state(),
        );
        match end {
            SessionEnd::ClientGone => {
                info!(session = id, sent, skipped, ?state, "client disconnected")
            }
            SessionEnd::AcquisitionFailed(err) => {
                error!(
                    session = id,
                    sent,
                    skipped,
                    ?state,
                    "session ended by capture failure: {err}"
                )
            }
        }
    });
    if let Err(err) = spawned {
        error!("Failed to spawn stream session thread: {err}");
        return HttpResponse::ServiceUnavailable().finish();
    }

    let body = stream! {
        while let Some(part) = rx.recv().await {
            yield Ok::<Bytes, actix_web::Error>(part);
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE))
        .streaming(body)
}
