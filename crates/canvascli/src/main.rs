use anyhow::{anyhow, Result};
use canvascore::{
    Canvas, CanvasDocument, CanvasNode, ExecutionEvent, NodeEvent, NodeKind, Payload,
};
use canvasnodes::{default_catalog, BackendConfig, HttpBackend};
use canvasruntime::{calculate_execution_path, CanvasSession, NodeCatalog, RunOutcome};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canvas")]
#[command(about = "Canvas flow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow from a start node of a canvas file
    Run {
        /// Path to canvas JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Start node id (defaults to the first start node)
        #[arg(short, long)]
        start: Option<String>,

        /// Base URL of the AI / scraping API
        #[arg(long, default_value = "http://localhost:8000")]
        backend_url: String,

        /// Write the canvas back after the run (node data updated by the run)
        #[arg(long)]
        save: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the execution path from a start node
    Path {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        start: String,
    },

    /// Validate a canvas file
    Validate {
        /// Path to canvas JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create an example canvas
    Init {
        /// Output file path
        #[arg(short, long, default_value = "canvas.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            start,
            backend_url,
            save,
            verbose,
        } => {
            init_logging(if verbose { "debug" } else { "info" });
            run_canvas(file, start, backend_url, save).await?;
        }

        Commands::Path { file, start } => {
            init_logging("warn");
            print_path(file, start)?;
        }

        Commands::Validate { file } => {
            init_logging("warn");
            validate_canvas(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_canvas(output)?;
        }
    }

    Ok(())
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn catalog(backend_url: &str) -> NodeCatalog {
    let backend = HttpBackend::new(BackendConfig {
        base_url: backend_url.to_string(),
        ..BackendConfig::default()
    });
    default_catalog(Arc::new(backend))
}

fn load_canvas(file: &Path) -> Result<Canvas> {
    let document = CanvasDocument::read_from(file)?;
    Ok(document.into_canvas()?)
}

async fn run_canvas(
    file: PathBuf,
    start: Option<String>,
    backend_url: String,
    save: bool,
) -> Result<()> {
    println!("🚀 Loading canvas from: {}", file.display());

    let document = CanvasDocument::read_from(&file)?;
    println!("   Nodes: {}", document.nodes.len());
    println!("   Edges: {}", document.edges.len());
    println!();

    let start = match start {
        Some(start) => start,
        None => document
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .map(|n| n.id.clone())
            .ok_or_else(|| anyhow!("Canvas has no start node; pass --start"))?,
    };

    tracing::debug!("Using service backend at {}", backend_url);
    let session = CanvasSession::new(Arc::new(catalog(&backend_url)));
    session.load(document).await?;

    let mut events = session.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::FlowStarted { path, .. } => {
                    println!("▶️  Flow started: {}", path.join(" → "));
                }
                ExecutionEvent::FlowRejected { reason, .. } => {
                    println!("⏸️  Run rejected: {}", reason);
                }
                ExecutionEvent::NodeStateChanged { .. } => {}
                ExecutionEvent::NodeSkipped { node_id, .. } => {
                    println!("  ⏭️  Node {} has no handler, skipped", node_id);
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    payload_kind,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "  ✅ Node {} resolved {} in {}ms",
                        node_id, payload_kind, duration_ms
                    );
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::Delivered {
                    source,
                    target,
                    result,
                    ..
                } => {
                    println!("  📥 {} delivered to {} ({})", source, target, result);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {}% - {}", node_id, percent, msg);
                        } else {
                            println!("     📊 [{}] {}%", node_id, percent);
                        }
                    }
                },
                ExecutionEvent::FlowFinished {
                    aborted,
                    duration_ms,
                    ..
                } => {
                    if aborted {
                        println!("💥 Flow aborted after {}ms", duration_ms);
                    } else {
                        println!("✨ Flow finished in {}ms", duration_ms);
                    }
                }
                ExecutionEvent::StatusReset { .. } => {}
            }
        }
    });

    let outcome = session.trigger_start(&start).await?;

    // Let the listener drain before printing the summary.
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let RunOutcome::Finished(report) = outcome else {
        return Err(anyhow!("Another run was already in progress"));
    };

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!(
        "   Completed: {}/{} nodes",
        report.completed.len(),
        report.path.len()
    );
    if !report.errored.is_empty() {
        println!("   Errors: {}", report.errored.join(", "));
    }
    if !report.skipped.is_empty() {
        println!("   Skipped: {}", report.skipped.join(", "));
    }
    if let Some(failed) = &report.failed_node {
        println!("   Aborted at: {}", failed);
    }

    println!();
    println!("📤 Outputs:");
    for node_id in &report.path {
        if let Some(payload) = session.latest_output(node_id).await {
            println!("   {}: {}", node_id, summarize(&payload));
        }
    }

    if save {
        session.snapshot().await.write_to(&file)?;
        println!();
        println!("💾 Saved canvas to {}", file.display());
    }

    Ok(())
}

fn summarize(payload: &Payload) -> String {
    let text = match payload {
        Payload::Text { text } => text.clone(),
        Payload::Chat(reply) => reply.response.clone(),
        Payload::Error { error } => format!("error: {}", error),
        Payload::Waiting(status) => status.message.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.kind().to_string()),
    };
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() > 120 {
        let cut: String = single_line.chars().take(117).collect();
        format!("[{}] {}...", payload.kind(), cut)
    } else {
        format!("[{}] {}", payload.kind(), single_line)
    }
}

fn print_path(file: PathBuf, start: String) -> Result<()> {
    let canvas = load_canvas(&file)?;
    if !canvas.contains(&start) {
        return Err(anyhow!("Node not found: {}", start));
    }

    let path = calculate_execution_path(&start, &canvas.edges);
    println!("🧭 Execution path from {}:", start);
    for (position, node_id) in path.iter().enumerate() {
        let kind = canvas
            .find_node(node_id)
            .map(|n| n.kind.to_string())
            .unwrap_or_default();
        println!("   {}. {} ({})", position + 1, node_id, kind);
    }
    Ok(())
}

fn validate_canvas(file: PathBuf) -> Result<()> {
    println!("🔍 Validating canvas: {}", file.display());

    let canvas = load_canvas(&file)?;
    let catalog = catalog("http://localhost:8000");
    let known = catalog.list_node_kinds();

    println!("✅ Canvas is valid:");
    println!("   Nodes: {}", canvas.nodes.len());
    println!("   Edges: {}", canvas.edges.len());

    if !canvas.is_acyclic() {
        println!("   ⚠️  Canvas contains a cycle; each node still runs at most once per flow");
    }
    for node in &canvas.nodes {
        if !known.contains(&node.kind) {
            println!(
                "   ⚠️  Node {} has type {} with no handler; it will be skipped",
                node.id, node.kind
            );
        }
        if node.kind == NodeKind::Start && !node.has_connections {
            println!("   ⚠️  Start node {} has no outgoing connections", node.id);
        }
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let catalog = catalog("http://localhost:8000");

    for kind in catalog.list_node_kinds() {
        if let Some(metadata) = catalog.get_metadata(&kind) {
            println!("  • {} - {} ({})", kind, metadata.label, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", kind);
        }
    }
}

fn create_example_canvas(output: PathBuf) -> Result<()> {
    let mut canvas = Canvas::new();

    let start = canvas.add_node(CanvasNode::new("start", NodeKind::Start).with_position(0.0, 0.0))?;
    let text = canvas.add_node(
        CanvasNode::new("topic", NodeKind::Text)
            .with_data("text", "The history of the printing press")
            .with_position(250.0, 0.0),
    )?;
    let chat = canvas.add_node(
        CanvasNode::new("chat", NodeKind::AiChat)
            .with_data("systemPrompt", "You are a helpful AI assistant.")
            .with_data("userPrompt", "Summarize this topic in three sentences.")
            .with_position(500.0, 0.0),
    )?;
    let output_node = canvas.add_node(
        CanvasNode::new("answer", NodeKind::AiOutput).with_position(750.0, 0.0),
    )?;

    canvas.connect(start.clone(), text.clone())?;
    canvas.connect(text, chat.clone())?;
    canvas.connect(chat, output_node)?;

    CanvasDocument::from_canvas(&canvas).write_to(&output)?;

    println!("✨ Created example canvas: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  canvas run --file {} --start {}", output.display(), start);

    Ok(())
}
