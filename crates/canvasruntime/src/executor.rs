use crate::path::calculate_execution_path;
use crate::registry::NodeRegistry;
use canvascore::{
    Canvas, CanvasError, Envelope, EventBus, ExecutionEvent, ExecutionId, ExecutionState,
    FlowError, NodeContext, NodeId, NodeOutput, Payload, SourceInfo,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Pacing of a run
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Pause between two node executions so observers see each transition
    pub settle_delay: Duration,
    /// How long final statuses stay visible before everything returns to idle
    pub decay_window: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            decay_window: Duration::from_secs(3),
        }
    }
}

/// Runs flows over a shared canvas, one node at a time.
pub struct FlowExecutor {
    canvas: Arc<RwLock<Canvas>>,
    registry: NodeRegistry,
    events: EventBus,
    config: ExecutorConfig,
    running: AtomicBool,
    outputs: RwLock<HashMap<NodeId, Payload>>,
    decay: Mutex<Option<JoinHandle<()>>>,
}

impl FlowExecutor {
    pub fn new(
        canvas: Arc<RwLock<Canvas>>,
        registry: NodeRegistry,
        events: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            canvas,
            registry,
            events,
            config,
            running: AtomicBool::new(false),
            outputs: RwLock::new(HashMap::new()),
            decay: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest output a node produced during the current or last run
    pub async fn latest_output(&self, node_id: &str) -> Option<Payload> {
        self.outputs.read().await.get(node_id).cloned()
    }

    /// Run every node reachable from `start_id`, in path order.
    ///
    /// A call made while another run is in flight is dropped and reports
    /// [`RunOutcome::AlreadyRunning`].
    pub async fn execute_flow(&self, start_id: &str) -> Result<RunOutcome, FlowError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Cannot execute flow from {}: flow already executing", start_id);
            self.events.emit(ExecutionEvent::FlowRejected {
                start_node: start_id.to_string(),
                reason: "flow already executing".to_string(),
                timestamp: Utc::now(),
            });
            return Ok(RunOutcome::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let path = {
            let canvas = self.canvas.read().await;
            if !canvas.contains(start_id) {
                return Err(CanvasError::NodeNotFound(start_id.to_string()).into());
            }
            calculate_execution_path(start_id, &canvas.edges)
        };

        let execution_id = ExecutionId::new_v4();
        let started = Instant::now();
        let mut report = RunReport::new(execution_id, start_id, path.clone());

        self.cancel_decay();
        self.outputs.write().await.clear();

        tracing::info!("Starting flow {} from {}: {:?}", execution_id, start_id, path);
        self.events.emit(ExecutionEvent::FlowStarted {
            execution_id,
            start_node: start_id.to_string(),
            path: path.clone(),
            timestamp: Utc::now(),
        });

        for node_id in &path {
            self.set_state(execution_id, node_id, ExecutionState::InPath).await;
        }

        for (index, node_id) in path.iter().enumerate() {
            self.set_state(execution_id, node_id, ExecutionState::Executing).await;

            let Some(handler) = self.registry.lookup(node_id) else {
                tracing::warn!("No execution handler registered for node {}", node_id);
                self.set_state(execution_id, node_id, ExecutionState::InPath).await;
                self.events.emit(ExecutionEvent::NodeSkipped {
                    execution_id,
                    node_id: node_id.clone(),
                    timestamp: Utc::now(),
                });
                report.skipped.push(node_id.clone());
                self.settle(index, path.len()).await;
                continue;
            };

            tracing::debug!("Executing node {} ({})", node_id, handler.kind());
            let ctx = self.build_context(execution_id, node_id).await;
            let node_started = Instant::now();

            match handler.execute(ctx, Envelope::trigger()).await {
                Ok(output) => {
                    let duration_ms = node_started.elapsed().as_millis() as u64;
                    let payload = self.commit(node_id, output).await;
                    let payload_kind = payload.kind();

                    let state = if payload.is_error() {
                        tracing::warn!(
                            "Node {} resolved with error: {}",
                            node_id,
                            payload.as_error().unwrap_or_default()
                        );
                        report.errored.push(node_id.clone());
                        ExecutionState::Error
                    } else {
                        tracing::info!("Node {} completed in {}ms", node_id, duration_ms);
                        report.completed.push(node_id.clone());
                        ExecutionState::Complete
                    };
                    self.set_state(execution_id, node_id, state).await;
                    self.events.emit(ExecutionEvent::NodeCompleted {
                        execution_id,
                        node_id: node_id.clone(),
                        payload_kind,
                        duration_ms,
                        timestamp: Utc::now(),
                    });

                    if payload.carries_data() {
                        self.deliver_downstream(execution_id, node_id, &payload).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Error executing node {}: {}", node_id, e);
                    self.set_state(execution_id, node_id, ExecutionState::Error).await;
                    self.events.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: node_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    report.failed_node = Some(node_id.clone());
                    report.aborted = true;
                    break;
                }
            }

            self.settle(index, path.len()).await;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(ExecutionEvent::FlowFinished {
            execution_id,
            aborted: report.aborted,
            duration_ms: report.duration_ms,
            timestamp: Utc::now(),
        });
        if report.aborted {
            tracing::warn!("Flow {} aborted after {}ms", execution_id, report.duration_ms);
        } else {
            tracing::info!("Flow {} finished in {}ms", execution_id, report.duration_ms);
        }

        self.schedule_decay();
        Ok(RunOutcome::Finished(report))
    }

    /// Hand a producer's output to every fan-in node directly downstream.
    async fn deliver_downstream(&self, execution_id: ExecutionId, source: &str, payload: &Payload) {
        let targets = self.canvas.read().await.outgoing_targets(source);

        for target in targets {
            let Some(handler) = self.registry.lookup(&target) else {
                continue;
            };
            if !handler.accepts_deliveries() {
                continue;
            }

            let ctx = self.build_context(execution_id, &target).await;
            let envelope = Envelope::from_source(source, payload.clone());
            match handler.execute(ctx, envelope).await {
                Ok(output) => {
                    let result = self.commit(&target, output).await;
                    tracing::debug!(
                        "Delivered {} output to {}: {}",
                        source,
                        target,
                        result.kind()
                    );
                    self.events.emit(ExecutionEvent::Delivered {
                        execution_id,
                        source: source.to_string(),
                        target: target.clone(),
                        result: result.kind(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Delivery from {} to {} failed: {}", source, target, e);
                }
            }
        }
    }

    /// Store a node's new state and output; returns the payload.
    async fn commit(&self, node_id: &str, output: NodeOutput) -> Payload {
        let NodeOutput { payload, state } = output;
        if let Some(state) = state {
            match self.canvas.write().await.find_node_mut(node_id) {
                Some(node) => node.data = state,
                None => tracing::warn!("Node {} disappeared before its state was saved", node_id),
            }
        }
        self.outputs
            .write()
            .await
            .insert(node_id.to_string(), payload.clone());
        payload
    }

    async fn build_context(&self, execution_id: ExecutionId, node_id: &str) -> NodeContext {
        let (state, sources) = {
            let canvas = self.canvas.read().await;
            let state = canvas
                .find_node(node_id)
                .map(|n| n.data.clone())
                .unwrap_or_default();
            let sources: Vec<SourceInfo> = canvas
                .incoming_sources(node_id)
                .into_iter()
                .filter_map(|id| {
                    canvas
                        .find_node(&id)
                        .map(|n| SourceInfo::new(id.clone(), n.kind.clone()))
                })
                .collect();
            (state, sources)
        };

        let inputs = {
            let outputs = self.outputs.read().await;
            sources
                .iter()
                .filter_map(|s| {
                    outputs
                        .get(&s.node_id)
                        .map(|p| Envelope::from_source(s.node_id.clone(), p.clone()))
                })
                .collect()
        };

        NodeContext::new(
            node_id,
            self.events.create_emitter(execution_id, node_id.to_string()),
        )
        .with_state(state)
        .with_inputs(inputs)
        .with_sources(sources)
    }

    async fn set_state(&self, execution_id: ExecutionId, node_id: &str, state: ExecutionState) {
        {
            let mut canvas = self.canvas.write().await;
            let Some(previous) = canvas.status(node_id) else {
                tracing::debug!(
                    "Node {} no longer on the canvas, status {} dropped",
                    node_id,
                    state
                );
                return;
            };
            debug_assert!(
                previous.can_transition_to(state),
                "illegal transition {} -> {} for node {}",
                previous,
                state,
                node_id
            );
            canvas.set_status(node_id, state);
        }
        self.events.emit(ExecutionEvent::NodeStateChanged {
            execution_id,
            node_id: node_id.to_string(),
            state,
            timestamp: Utc::now(),
        });
    }

    async fn settle(&self, index: usize, len: usize) {
        if index + 1 < len && !self.config.settle_delay.is_zero() {
            sleep(self.config.settle_delay).await;
        }
    }

    fn schedule_decay(&self) {
        let canvas = self.canvas.clone();
        let events = self.events.clone();
        let window = self.config.decay_window;

        let handle = tokio::spawn(async move {
            sleep(window).await;
            canvas.write().await.reset_status();
            tracing::debug!("Execution statuses reset to idle");
            events.emit(ExecutionEvent::StatusReset {
                timestamp: Utc::now(),
            });
        });

        if let Some(previous) = self
            .decay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
    }

    fn cancel_decay(&self) {
        if let Some(pending) = self
            .decay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.abort();
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Result of [`FlowExecutor::execute_flow`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Finished(RunReport),
    /// Dropped because another run was in flight
    AlreadyRunning,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Finished(report) => Some(report),
            RunOutcome::AlreadyRunning => None,
        }
    }

    pub fn was_rejected(&self) -> bool {
        matches!(self, RunOutcome::AlreadyRunning)
    }
}

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_id: ExecutionId,
    pub start_node: NodeId,
    pub path: Vec<NodeId>,
    pub completed: Vec<NodeId>,
    pub errored: Vec<NodeId>,
    pub skipped: Vec<NodeId>,
    pub failed_node: Option<NodeId>,
    pub aborted: bool,
    pub duration_ms: u64,
}

impl RunReport {
    fn new(execution_id: ExecutionId, start_node: &str, path: Vec<NodeId>) -> Self {
        Self {
            execution_id,
            start_node: start_node.to_string(),
            path,
            completed: Vec::new(),
            errored: Vec::new(),
            skipped: Vec::new(),
            failed_node: None,
            aborted: false,
            duration_ms: 0,
        }
    }
}
