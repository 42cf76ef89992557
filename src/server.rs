use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use log::{debug, error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::model::{Action, Category, FocusUpdate, NewTask, PositionUpdate, Task, TaskReplace};
use crate::registry::Registry;
use crate::{db, ops, sweep};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub registry: Arc<Registry>,
    pub sweep_on_read: bool,
}

impl AppState {
    pub fn new(conn: Connection, sweep_on_read: bool) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            registry: Registry::new(),
            sweep_on_read,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: &'static str,
}

/// Only two outcomes reach the caller: not found, or a generic internal error.
/// Details are logged server side.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Task not found",
        }
    }

    fn internal(context: &str, err: impl Display) -> Self {
        error!("{context}: {err:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Malformed bodies, ids and query strings fall into the internal-error bucket.
fn extract<T>(
    context: &str,
    extracted: Result<T, impl Display>,
) -> Result<T, ApiError> {
    extracted.map_err(|e| ApiError::internal(context, e))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedMessage {
    pub message: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(replace_task).delete(delete_task))
        .route("/api/tasks/{id}/position", put(update_position))
        .route("/api/tasks/{id}/focus", put(update_focus))
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> Result<()> {
    let conn = db::open(&config.db_path)?;
    db::init(&conn).context("Database initialization error")?;
    info!("Database initialized: {}", config.db_path);

    let state = AppState::new(conn, config.sweep_on_read);
    let sweeper = config
        .sweep_interval
        .map(|period| sweep::spawn(state.db.clone(), state.registry.clone(), period));

    let app = build_router(state);
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on port {}", config.port);
    info!("WebSocket server ready on ws://localhost:{}", config.port);
    if config.debug {
        info!("Debug mode enabled - detailed logging active");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn log_request(req: Request, next: Next) -> Response {
    debug!("{} {}", req.method(), req.uri());
    next.run(req).await
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = extract("Error fetching tasks", query)?;
    let conn = state.db.lock().await;
    if state.sweep_on_read {
        // A failed sweep does not fail the read.
        if let Err(e) = sweep::run_once(&conn, &state.registry, sweep::today()) {
            error!("Error checking overdue tasks: {e:#}");
        }
    }
    let category = match query.category.as_deref() {
        None | Some("") => None,
        Some(raw) => match Category::parse(raw) {
            Ok(c) => Some(c),
            // No row can hold an unknown category.
            Err(_) => return Ok(Json(Vec::new())),
        },
    };
    let tasks = ops::list_tasks(&conn, category)
        .map_err(|e| ApiError::internal("Error fetching tasks", e))?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(body) = extract("Error creating task", payload)?;
    let conn = state.db.lock().await;
    let task = ops::create_task(&conn, &body, sweep::today())
        .map_err(|e| ApiError::internal("Error creating task", e))?;
    state.registry.broadcast(Action::Create, &task);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn replace_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<TaskReplace>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = extract("Error updating task", id)?;
    let Json(body) = extract("Error updating task", payload)?;
    let conn = state.db.lock().await;
    let task = ops::replace_task(&conn, id, &body, sweep::today())
        .map_err(|e| ApiError::internal("Error updating task", e))?
        .ok_or_else(ApiError::not_found)?;
    state.registry.broadcast(Action::Update, &task);
    Ok(Json(task))
}

async fn update_position(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PositionUpdate>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = extract("Error updating task position", id)?;
    let Json(body) = extract("Error updating task position", payload)?;
    let conn = state.db.lock().await;
    let task = ops::set_position(&conn, id, body)
        .map_err(|e| ApiError::internal("Error updating task position", e))?
        .ok_or_else(ApiError::not_found)?;
    state.registry.broadcast(Action::Update, &task);
    Ok(Json(task))
}

async fn update_focus(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<FocusUpdate>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = extract("Error updating task focus", id)?;
    let Json(body) = extract("Error updating task focus", payload)?;
    let conn = state.db.lock().await;
    let task = ops::set_focus(&conn, id, body.focused)
        .map_err(|e| ApiError::internal("Error updating task focus", e))?
        .ok_or_else(ApiError::not_found)?;
    state.registry.broadcast(Action::Update, &task);
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeletedMessage>, ApiError> {
    let Path(id) = extract("Error deleting task", id)?;
    let conn = state.db.lock().await;
    let task = ops::delete_task(&conn, id)
        .map_err(|e| ApiError::internal("Error deleting task", e))?
        .ok_or_else(ApiError::not_found)?;
    state.registry.broadcast(Action::Delete, &task);
    Ok(Json(DeletedMessage {
        message: "Task deleted successfully".into(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

/// Push-only: inbound frames other than ping and close are ignored.
async fn handle_socket(mut socket: WebSocket, registry: Arc<Registry>) {
    let mut sub = registry.subscribe();
    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("WebSocket error on client {}: {e}", sub.id());
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            outbound = sub.recv() => {
                match outbound {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}
