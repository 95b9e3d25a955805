use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use resolver_core::events::ResolverEvent;
use resolver_core::{ConstraintResolver, ResolverConfig};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod protocol;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const EVENT_BUFFER: usize = 256;

// Application State
struct AppState {
    resolver: Mutex<ConstraintResolver>,
    config: ResolverConfig,
    events: broadcast::Sender<ResolverEvent>,
}

impl AppState {
    /// Lock the resolver, recovering from a poisoned lock.
    fn resolver(&self) -> MutexGuard<'_, ConstraintResolver> {
        self.resolver.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_config() -> ResolverConfig {
    let Ok(path) = std::env::var("RESOLVER_CONFIG") else {
        return ResolverConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(json) => match ResolverConfig::from_json(&json) {
            Ok(config) => {
                info!("Loaded resolver config from {}", path);
                config
            }
            Err(e) => {
                warn!("Ignoring invalid config {}: {}", path, e);
                ResolverConfig::default()
            }
        },
        Err(e) => {
            warn!("Cannot read config {}: {}", path, e);
            ResolverConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config();
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let mut resolver = ConstraintResolver::new(config.clone());
    protocol::attach_events(&mut resolver, events.clone());

    let shared_state = Arc::new(AppState {
        resolver: Mutex::new(resolver),
        config,
        events,
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state);

    let addr: SocketAddr = std::env::var("RESOLVER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> &'static str {
    "Hello from the constraint resolver backend!"
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let resolver = state.resolver();
    Json(protocol::summary(&resolver))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = Uuid::new_v4();
    info!("Client {} connected", session);

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    let greeting = {
        let resolver = state.resolver();
        format!("RESOLVER_UPDATE:{}", protocol::summary(&resolver))
    };
    if sender.send(Message::Text(greeting)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                info!("Received message: {}", text);

                let reply = {
                    let mut resolver = state.resolver();
                    protocol::handle_command(&mut resolver, &state.config, &state.events, &text)
                };
                if sender.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(format!("EVENT:{}", json))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} missed {} events", session, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Client {} disconnected", session);
}
