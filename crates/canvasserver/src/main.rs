use actix_cors::Cors;
use actix_web::{
    delete, get, post, put, web, App, HttpResponse, HttpServer, Responder,
    Result as ActixResult,
};
use actix_ws::Message;
use canvascore::{CanvasDocument, CanvasError, ExecutionEvent, FlowError, NodeState};
use canvasnodes::{default_catalog, BackendConfig, HttpBackend};
use canvasruntime::{CanvasSession, NodeCatalog, RunOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Application state shared across handlers
struct AppState {
    catalog: Arc<NodeCatalog>,
    canvases: Arc<RwLock<HashMap<Uuid, Arc<CanvasSession>>>>,
    events: broadcast::Sender<CanvasEvent>,
}

/// Session event tagged with the canvas it came from
#[derive(Debug, Clone, Serialize)]
struct CanvasEvent {
    canvas_id: Uuid,
    #[serde(flatten)]
    event: ExecutionEvent,
}

#[derive(Debug, Serialize)]
struct CanvasResponse {
    id: Uuid,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    canvas: Option<Uuid>,
}

fn error_response(err: &FlowError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        FlowError::Canvas(CanvasError::NodeNotFound(_))
        | FlowError::Canvas(CanvasError::EdgeNotFound(_)) => HttpResponse::NotFound().json(body),
        FlowError::Canvas(_) | FlowError::Serialization(_) => {
            HttpResponse::BadRequest().json(body)
        }
        _ => HttpResponse::InternalServerError().json(body),
    }
}

fn canvas_not_found(id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("Canvas {} not found", id),
    })
}

impl AppState {
    async fn session(&self, id: Uuid) -> Option<Arc<CanvasSession>> {
        self.canvases.read().await.get(&id).cloned()
    }

    /// Relay a session's events onto the server-wide channel until the
    /// session is dropped.
    fn forward_events(&self, canvas_id: Uuid, session: &CanvasSession) {
        let mut events = session.subscribe();
        let sender = self.events.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        // No subscribers is fine.
                        let _ = sender.send(CanvasEvent { canvas_id, event });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Canvas {} event relay lagged by {} events", canvas_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "canvasengine"
    }))
}

/// List loaded canvases
#[get("/api/canvases")]
async fn list_canvases(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let sessions: Vec<_> = data
        .canvases
        .read()
        .await
        .iter()
        .map(|(id, session)| (*id, session.clone()))
        .collect();

    let mut list = Vec::with_capacity(sessions.len());
    for (id, session) in sessions {
        let snapshot = session.snapshot().await;
        list.push(serde_json::json!({
            "id": id,
            "nodes": snapshot.nodes.len(),
            "edges": snapshot.edges.len(),
            "running": session.is_running(),
        }));
    }

    Ok(HttpResponse::Ok().json(list))
}

/// Load a canvas document into a new session
#[post("/api/canvases")]
async fn create_canvas(
    data: web::Data<AppState>,
    document: web::Json<CanvasDocument>,
) -> ActixResult<impl Responder> {
    let document = document.into_inner();
    let session = Arc::new(CanvasSession::new(data.catalog.clone()));

    if let Err(e) = session.load(document).await {
        error!("Failed to load canvas: {}", e);
        return Ok(error_response(&e));
    }

    let id = Uuid::new_v4();
    data.forward_events(id, &session);
    data.canvases.write().await.insert(id, session);

    info!("Created canvas {}", id);

    Ok(HttpResponse::Created().json(CanvasResponse {
        id,
        message: "Canvas created successfully".to_string(),
    }))
}

/// Current document of a canvas, node data included
#[get("/api/canvases/{id}")]
async fn get_canvas(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    match data.session(id).await {
        Some(session) => Ok(HttpResponse::Ok().json(session.snapshot().await)),
        None => Ok(canvas_not_found(id)),
    }
}

/// Replace the document of a canvas
#[put("/api/canvases/{id}")]
async fn replace_canvas(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    document: web::Json<CanvasDocument>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    let Some(session) = data.session(id).await else {
        return Ok(canvas_not_found(id));
    };

    match session.load(document.into_inner()).await {
        Ok(()) => {
            info!("Reloaded canvas {}", id);
            Ok(HttpResponse::Ok().json(CanvasResponse {
                id,
                message: "Canvas replaced successfully".to_string(),
            }))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

#[delete("/api/canvases/{id}")]
async fn delete_canvas(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();

    match data.canvases.write().await.remove(&id) {
        Some(_) => {
            info!("Deleted canvas: {}", id);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Canvas deleted successfully"
            })))
        }
        None => Ok(canvas_not_found(id)),
    }
}

/// Press the run button of a start node
#[post("/api/canvases/{id}/run/{start}")]
async fn run_canvas(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
) -> ActixResult<impl Responder> {
    let (id, start) = path.into_inner();
    let Some(session) = data.session(id).await else {
        return Ok(canvas_not_found(id));
    };

    info!("Running canvas {} from {}", id, start);

    match session.trigger_start(&start).await {
        Ok(outcome @ RunOutcome::AlreadyRunning) => Ok(HttpResponse::Conflict().json(outcome)),
        Ok(outcome) => {
            if let Some(report) = outcome.report() {
                info!(
                    "Canvas {} run finished: {}/{} nodes completed",
                    id,
                    report.completed.len(),
                    report.path.len()
                );
            }
            Ok(HttpResponse::Ok().json(outcome))
        }
        Err(e) => {
            error!("Canvas {} run from {} failed: {}", id, start, e);
            Ok(error_response(&e))
        }
    }
}

/// Per-node execution status
#[get("/api/canvases/{id}/status")]
async fn canvas_status(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    let Some(session) = data.session(id).await else {
        return Ok(canvas_not_found(id));
    };

    let states: HashMap<_, _> = session.statuses().await.into_iter().collect();
    let flags: HashMap<_, _> = session.status_flags().await.into_iter().collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "running": session.is_running(),
        "nodes": flags,
        "states": states,
    })))
}

/// Replace a node's data
#[put("/api/canvases/{id}/nodes/{node}/data")]
async fn update_node_data(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
    body: web::Json<NodeState>,
) -> ActixResult<impl Responder> {
    let (id, node) = path.into_inner();
    let Some(session) = data.session(id).await else {
        return Ok(canvas_not_found(id));
    };

    match session.update_node_data(&node, body.into_inner()).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Clear what a node has accumulated (a wait node's received sources)
#[post("/api/canvases/{id}/nodes/{node}/reset")]
async fn reset_node(
    data: web::Data<AppState>,
    path: web::Path<(Uuid, String)>,
) -> ActixResult<impl Responder> {
    let (id, node) = path.into_inner();
    let Some(session) = data.session(id).await else {
        return Ok(canvas_not_found(id));
    };

    match session.reset_node(&node).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(error_response(&e)),
    }
}

/// WebSocket endpoint for real-time events, optionally for one canvas
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    query: web::Query<EventsQuery>,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let filter = query.into_inner().canvas;

    info!("WebSocket client connected");

    let mut events = data.events.subscribe();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if filter.is_some_and(|id| id != event.canvas_id) {
                                continue;
                            }
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged by {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let nodes: Vec<_> = data
        .catalog
        .list_node_kinds()
        .iter()
        .map(|kind| {
            let metadata = data.catalog.get_metadata(kind);
            serde_json::json!({
                "type": kind,
                "label": metadata.as_ref().map(|m| m.label.clone()).unwrap_or_default(),
                "description": metadata.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
                "category": metadata.as_ref().map(|m| m.category.clone()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("🚀 Starting Canvas Engine Server");

    let mut backend_config = BackendConfig::default();
    if let Ok(url) = std::env::var("CANVAS_BACKEND_URL") {
        backend_config.base_url = url;
    }
    info!("Service backend: {}", backend_config.base_url);

    let catalog = default_catalog(Arc::new(HttpBackend::new(backend_config)));

    info!("✅ Catalog initialized with {} node types", catalog.list_node_kinds().len());

    let (events, _) = broadcast::channel(1000);
    let app_state = web::Data::new(AppState {
        catalog: Arc::new(catalog),
        canvases: Arc::new(RwLock::new(HashMap::new())),
        events,
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_canvases)
            .service(create_canvas)
            .service(get_canvas)
            .service(replace_canvas)
            .service(delete_canvas)
            .service(run_canvas)
            .service(canvas_status)
            .service(update_node_data)
            .service(reset_node)
            .service(websocket_events)
            .service(list_node_types)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
