use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;

use axum::extract::Extension;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use tokio::sync::mpsc;

use crate::core::types::Height;
use crate::tasks::TaskKind;

#[derive(Debug)]
pub enum MonitorMessage {
    /// Dispatcher reached this height.
    Dispatched(Height),
    /// A task of this kind was effectively applied.
    TaskProcessed(TaskKind),
    /// An acknowledged no-op (duplicate, superseded or rescheduled).
    TaskSkipped(TaskKind),
}

#[derive(Default)]
struct MonitorData {
    /// Height of the last dispatched block task.
    last_dispatched: Height,
    processed: HashMap<TaskKind, u64>,
    skipped: HashMap<TaskKind, u64>,
}

type SharedState = Arc<RwLock<MonitorData>>;
type PauseFlag = Arc<AtomicBool>;

pub struct Monitor {
    tx: mpsc::Sender<MonitorMessage>,
    rx: mpsc::Receiver<MonitorMessage>,
}

impl Monitor {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::Sender<MonitorMessage> {
        self.tx.clone()
    }

    /// Serve the control surface and fold in worker reports.
    ///
    /// `pause` is the dispatcher's cooperative pause flag, flipped by
    /// the /pause and /resume endpoints.
    pub async fn start(&mut self, pause: PauseFlag) {
        let state = SharedState::default();

        self.start_server(state.clone(), pause);

        while let Some(msg) = self.rx.recv().await {
            let mut data = state.write().unwrap();
            match msg {
                MonitorMessage::Dispatched(h) => {
                    data.last_dispatched = h;
                }
                MonitorMessage::TaskProcessed(kind) => {
                    *data.processed.entry(kind).or_insert(0) += 1;
                }
                MonitorMessage::TaskSkipped(kind) => {
                    *data.skipped.entry(kind).or_insert(0) += 1;
                }
            };
        }
        tracing::debug!("all monitor senders dropped");
    }

    fn start_server(&self, state: SharedState, pause: PauseFlag) {
        let app = Router::new()
            .route(
                "/",
                get(|| async { "Hey there, you're probably after /status" }),
            )
            .route("/status", get(status))
            .route("/health", get(|| async { "ok" }))
            .route("/pause", post(self::pause))
            .route("/resume", post(self::resume))
            .layer(Extension(state))
            .layer(Extension(pause));

        let address = SocketAddr::from(([0, 0, 0, 0], 3005));
        tokio::spawn(async move {
            tracing::info!("listening on {}", &address);

            axum::Server::bind(&address)
                .serve(app.into_make_service())
                .await
                .unwrap()
        });
    }
}

async fn status(
    Extension(state): Extension<SharedState>,
    Extension(pause): Extension<PauseFlag>,
) -> String {
    let data = &state.read().unwrap();
    let kinds = [
        TaskKind::Block,
        TaskKind::Era,
        TaskKind::Round,
        TaskKind::BlockBalance,
        TaskKind::BlockMetadata,
    ];
    let counts: Vec<String> = kinds
        .iter()
        .map(|kind| {
            format!(
                "{kind:?}: {} processed, {} skipped",
                data.processed.get(kind).unwrap_or(&0),
                data.skipped.get(kind).unwrap_or(&0)
            )
        })
        .collect();
    format!(
        "dispatched up to: {}\npaused: {}\n{}",
        data.last_dispatched,
        pause.load(Ordering::Relaxed),
        counts.join("\n")
    )
}

async fn pause(Extension(pause): Extension<PauseFlag>) -> &'static str {
    pause.store(true, Ordering::Relaxed);
    tracing::info!("ingestion paused");
    "paused"
}

async fn resume(Extension(pause): Extension<PauseFlag>) -> &'static str {
    pause.store(false, Ordering::Relaxed);
    tracing::info!("ingestion resumed");
    "resumed"
}
