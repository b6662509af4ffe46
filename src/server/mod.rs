//! UI server
//!
//! Serves the push channel the control UI listens on and the command intake
//! it posts to. The server never blocks on the test thread: commands are
//! applied through a registered handler and snapshots arrive through the
//! broadcast queue.

pub mod broadcast;
mod handler;
pub mod protocol;
mod socket;

pub use broadcast::{BroadcastQueue, Broadcaster, PushMessage};
pub use protocol::{Command, CommandRequest};

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::common::{config::Config, Error, Result};
use crate::session::{FrameEvent, RecordedEvent, Session, Snapshot};

/// Handler invoked for every command posted to the intake
pub type CommandHandler = Arc<dyn Fn(CommandRequest) -> Result<()> + Send + Sync>;

/// Read access to the session plus the browser event sink
pub trait SessionView: Send + Sync {
    fn snapshot(&self) -> Snapshot;
    fn record_event(&self, event: FrameEvent);
    fn events(&self) -> Vec<RecordedEvent>;
}

impl SessionView for Session {
    fn snapshot(&self) -> Snapshot {
        Session::snapshot(self)
    }

    fn record_event(&self, event: FrameEvent) {
        Session::record_event(self, event)
    }

    fn events(&self) -> Vec<RecordedEvent> {
        Session::events(self)
    }
}

#[derive(Clone)]
pub(crate) struct ServerState {
    config: Arc<Config>,
    queue: BroadcastQueue,
    connections: Arc<AtomicUsize>,
    handler: Arc<RwLock<Option<CommandHandler>>>,
    view: Arc<RwLock<Option<Arc<dyn SessionView>>>>,
}

pub struct UiServer {
    state: ServerState,
    broadcaster: Broadcaster,
}

impl UiServer {
    pub fn new(config: Config) -> Self {
        let (broadcaster, queue) = broadcast::channel();
        Self {
            state: ServerState {
                config: Arc::new(config),
                queue,
                connections: Arc::new(AtomicUsize::new(0)),
                handler: Arc::new(RwLock::new(None)),
                view: Arc::new(RwLock::new(None)),
            },
            broadcaster,
        }
    }

    /// Producer for the push queue, handed to the session
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Register the command handler, replacing any previous one
    pub fn on_command<F>(&self, handler: F)
    where
        F: Fn(CommandRequest) -> Result<()> + Send + Sync + 'static,
    {
        *self.state.handler.write() = Some(Arc::new(handler));
    }

    /// Expose the session's state and event log
    pub fn attach_session(&self, view: Arc<dyn SessionView>) {
        *self.state.view.write() = Some(view);
    }

    /// Wire a session's commands, state and events in one go
    pub fn serve_session(&self, session: &Session) {
        let commands = session.clone();
        self.on_command(move |request| commands.handle_request(&request));
        self.attach_session(Arc::new(session.clone()));
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/websocket", get(handler::websocket))
            .route("/api/steps/command", post(handler::command))
            .route("/api/steps", get(handler::steps))
            .route("/api/config", get(handler::config))
            .route("/api/events", post(handler::post_events).get(handler::get_events))
            .route("/health", get(handler::health))
            .with_state(self.state.clone())
    }

    /// Bind to the configured port on localhost and serve in the background
    pub async fn start(&self) -> Result<ServerHandle> {
        let port = self.state.config.server.port;
        self.start_on(SocketAddr::from(([127, 0, 0, 1], port))).await
    }

    pub async fn start_on(&self, addr: SocketAddr) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await.map_err(|e| Error::ServerBind {
            port: addr.port(),
            error: e.to_string(),
        })?;
        let addr = listener.local_addr()?;
        let router = self.router();

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("UI server stopped: {}", e);
            }
        });
        tracing::info!("server started: http://{}", addr);

        Ok(ServerHandle { addr, task })
    }
}

/// A running server; dropping it leaves the server running
pub struct ServerHandle {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        self.task.abort();
        tracing::debug!("UI server shut down");
    }
}
