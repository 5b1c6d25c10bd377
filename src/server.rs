//! Shared bootstrap for the HTTP/WS surface: wires stores, broker,
//! presence, scheduler and consumer, then serves. Used by both the
//! `autopaird` binary and the `artisan serve` CLI command so the two
//! entry points can't drift.
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::broker::{AmqpBroker, Broker};
use crate::app::consumer::ConsumerWorker;
use crate::app::dispatcher::Dispatcher;
use crate::app::models::DieselUlid;
use crate::app::planner::Planner;
use crate::app::presence::{PresenceIndex, RedisPresenceBackend};
use crate::app::realtime::WebSocketBus;
use crate::app::scheduler::Scheduler;
use crate::app::stores::postgres::{PgConversationStore, PgMessageStore, PgPlannedMessageStore, PgUserStore};
use crate::{config::Config, database};

type Presence = PresenceIndex<RedisPresenceBackend>;

struct AppState {
    scheduler: Arc<Scheduler<PgUserStore, PgPlannedMessageStore>>,
    consumer: Arc<ConsumerWorker<PgUserStore, PgPlannedMessageStore, PgConversationStore, PgMessageStore, RedisPresenceBackend>>,
    realtime: Arc<WebSocketBus<RedisPresenceBackend>>,
}

pub async fn run(host_override: Option<String>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = host_override {
        config.app.host = host;
    }
    if let Some(port) = port_override {
        config.app.port = port;
    }

    let pool = database::create_pool(&config)?;
    database::run_migrations(&pool)?;

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let planned_messages = Arc::new(PgPlannedMessageStore::new(pool.clone()));
    let conversations = Arc::new(PgConversationStore::new(pool.clone()));
    let messages = Arc::new(PgMessageStore::new(pool.clone()));

    let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(config.broker.clone()));
    broker.connect().await?;

    let presence_backend = RedisPresenceBackend::new(&config.presence.redis_url).await?;
    let presence: Arc<Presence> = Arc::new(PresenceIndex::new(presence_backend, Duration::from_secs(config.presence.ttl_seconds)));

    let realtime = Arc::new(WebSocketBus::new(Arc::clone(&presence)));

    let planner = Arc::new(Planner::new(Arc::clone(&users), Arc::clone(&planned_messages)));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&planned_messages), Arc::clone(&broker)).with_batch_size(config.dispatcher.batch_size));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&planner), Arc::clone(&dispatcher), &config.scheduler, &config.dispatcher)?);
    scheduler.start();

    let realtime_bus: Arc<dyn crate::app::realtime::RealtimeBus> = realtime.clone() as Arc<dyn crate::app::realtime::RealtimeBus>;
    let consumer = Arc::new(ConsumerWorker::new(
        Arc::clone(&users),
        Arc::clone(&planned_messages),
        Arc::clone(&conversations),
        Arc::clone(&messages),
        Arc::clone(&broker),
        Arc::clone(&presence),
        realtime_bus,
        config.consumer.clone(),
        config.broker.consumer_prefetch,
    ));
    consumer.start().await?;

    let state = Arc::new(AppState { scheduler, consumer, realtime });

    let app = Router::new()
        .route("/health", get(health))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/plan", post(trigger_planner))
        .route("/scheduler/dispatch", post(trigger_dispatcher))
        .route("/consumer/stats", get(consumer_stats))
        .route("/ws/{user_id}", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    tracing::info!(addr = %config.server_addr(), "autopaird listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn scheduler_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

async fn trigger_planner(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler.trigger_planner_now().await;
    Json(state.scheduler.status().await)
}

async fn trigger_dispatcher(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler.trigger_dispatcher_now().await;
    Json(state.scheduler.status().await)
}

async fn consumer_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.consumer.get_stats().await)
}

/// Demo realtime surface: the transport layer spec §1 treats as
/// external. Connecting registers presence; disconnecting (last
/// connection) clears it, closing the loop described in spec §9.
async fn websocket_handler(ws: WebSocketUpgrade, Path(user_id): Path<String>, Query(params): Query<HashMap<String, String>>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, params))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, user_id: String, params: HashMap<String, String>) {
    let Ok(user_id) = DieselUlid::from_string(&user_id) else {
        let _ = socket.send(Message::Text("invalid user id".into())).await;
        return;
    };
    let username = params.get("username").cloned().unwrap_or_else(|| user_id.to_string());

    let mut receiver = state.realtime.register_connection(user_id, &username).await;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = receiver.recv() => {
                match event {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    state.realtime.unregister_connection(user_id).await;
}
