use async_trait::async_trait;
use canvascore::{
    CombinedFormat, CombinedPayload, Envelope, Node, NodeContext, NodeError, NodeId, NodeKind,
    NodeOutput, Payload, PayloadKind, SourceInfo, WaitingStatus,
};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

const ANONYMOUS_PREFIX: &str = "anonymous-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Waiting,
    Received,
}

/// What the rendezvous knows about one upstream source
#[derive(Debug, Clone)]
pub struct TrackedSource {
    pub node_id: NodeId,
    /// `None` for anonymous deliveries
    pub kind: Option<NodeKind>,
    pub status: SourceStatus,
    pub data: Option<Payload>,
    pub received_at: Option<DateTime<Utc>>,
}

impl TrackedSource {
    fn waiting(info: &SourceInfo) -> Self {
        Self {
            node_id: info.node_id.clone(),
            kind: Some(info.kind.clone()),
            status: SourceStatus::Waiting,
            data: None,
            received_at: None,
        }
    }

    fn is_anonymous(&self) -> bool {
        self.node_id.starts_with(ANONYMOUS_PREFIX)
    }
}

/// Snapshot published to observers after every change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendezvousStatus {
    pub tracked: usize,
    pub received: usize,
    pub ready: bool,
}

#[derive(Default)]
struct Inner {
    sources: Vec<TrackedSource>,
    /// Sources connected at the last sync; a reset re-seeds from these.
    connected: Vec<SourceInfo>,
    ready: bool,
    combined: Option<CombinedPayload>,
    anonymous_seq: usize,
}

impl Inner {
    fn status(&self) -> RendezvousStatus {
        RendezvousStatus {
            tracked: self.sources.len(),
            received: self.received_count(),
            ready: self.ready,
        }
    }

    fn received_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.status == SourceStatus::Received)
            .count()
    }

    /// Track new sources as waiting, drop disconnected ones. Anonymous
    /// deliveries have no edge and are kept.
    fn sync(&mut self, connected: &[SourceInfo]) -> bool {
        self.connected = connected.to_vec();
        let before = self.sources.len();
        self.sources
            .retain(|s| s.is_anonymous() || connected.iter().any(|c| c.node_id == s.node_id));
        let mut changed = self.sources.len() != before;

        for info in connected {
            match self.sources.iter_mut().find(|s| s.node_id == info.node_id) {
                Some(tracked) => {
                    if tracked.kind.is_none() {
                        tracked.kind = Some(info.kind.clone());
                    }
                }
                None => {
                    self.sources.push(TrackedSource::waiting(info));
                    changed = true;
                }
            }
        }

        if changed {
            self.evaluate();
        }
        changed
    }

    /// Work out which tracked source an envelope belongs to.
    fn resolve_source(&mut self, envelope: &Envelope) -> NodeId {
        if let Some(source) = &envelope.source {
            return source.clone();
        }

        let kind = envelope.payload.kind();
        let matched = self.sources.iter().find(|s| {
            s.status == SourceStatus::Waiting
                && s.kind.as_ref().and_then(NodeKind::produces) == Some(kind)
        });
        if let Some(tracked) = matched {
            return tracked.node_id.clone();
        }

        self.anonymous_seq += 1;
        format!("{}{}-{}", ANONYMOUS_PREFIX, kind, self.anonymous_seq)
    }

    fn record(&mut self, envelope: Envelope) -> NodeId {
        let source_id = self.resolve_source(&envelope);
        let now = Utc::now();

        match self.sources.iter_mut().find(|s| s.node_id == source_id) {
            Some(tracked) => {
                tracked.status = SourceStatus::Received;
                tracked.data = Some(envelope.payload);
                tracked.received_at = Some(now);
            }
            None => self.sources.push(TrackedSource {
                node_id: source_id.clone(),
                kind: None,
                status: SourceStatus::Received,
                data: Some(envelope.payload),
                received_at: Some(now),
            }),
        }

        self.evaluate();
        source_id
    }

    fn evaluate(&mut self) {
        self.ready = !self.sources.is_empty()
            && self
                .sources
                .iter()
                .all(|s| s.status == SourceStatus::Received);
        self.combined = self.ready.then(|| combine(&self.sources));
    }

    fn output(&self) -> Payload {
        match &self.combined {
            Some(combined) if self.ready => Payload::Combined(combined.clone()),
            _ => Payload::Waiting(self.waiting_status()),
        }
    }

    fn waiting_status(&self) -> WaitingStatus {
        let missing: Vec<&str> = self
            .sources
            .iter()
            .filter(|s| s.status == SourceStatus::Waiting)
            .map(|s| s.node_id.as_str())
            .collect();

        let message = if self.sources.is_empty() {
            "Waiting for all inputs to be ready: no connected sources".to_string()
        } else {
            format!("Waiting for all inputs to be ready: {}", missing.join(", "))
        };

        WaitingStatus {
            message,
            current_source_count: self.sources.len(),
            received_source_count: self.received_count(),
        }
    }
}

/// Merge every received payload into one combined output.
fn combine(sources: &[TrackedSource]) -> CombinedPayload {
    let mut combined = CombinedPayload {
        video: None,
        web: None,
        document: None,
        passthrough: BTreeMap::new(),
        format: None,
        source_count: sources.len(),
        source_ids: sources.iter().map(|s| s.node_id.clone()).collect(),
        timestamp: Utc::now(),
    };

    let mut kinds = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(payload) = &source.data else {
            continue;
        };
        kinds.push(payload.kind());

        match payload {
            Payload::Video(video) if combined.video.is_none() => {
                combined.video = Some(video.clone());
            }
            Payload::Web(web) if combined.web.is_none() => {
                combined.web = Some(web.clone());
            }
            Payload::Document(document) if combined.document.is_none() => {
                combined.document = Some(document.clone());
            }
            Payload::Video(_)
            | Payload::Web(_)
            | Payload::Document(_)
            | Payload::Trigger
            | Payload::Text { .. }
            | Payload::Chat(_)
            | Payload::Combined(_)
            | Payload::Waiting(_)
            | Payload::Error { .. }
            | Payload::Json { .. } => {
                combined
                    .passthrough
                    .insert(source.node_id.clone(), payload.clone());
            }
        }
    }

    if let &[first, second] = kinds.as_slice() {
        combined.format = research_format(first, second);
    }
    combined
}

fn research_format(a: PayloadKind, b: PayloadKind) -> Option<CombinedFormat> {
    use PayloadKind::{Document, Video, Web};
    match (a, b) {
        (Video, Web) | (Web, Video) => Some(CombinedFormat::YoutubeAndWeb),
        (Video, Document) | (Document, Video) => Some(CombinedFormat::YoutubeAndDocument),
        (Web, Document) | (Document, Web) => Some(CombinedFormat::WebAndDocument),
        _ => None,
    }
}

/// Fan-in node: collects one output from every connected source and, once
/// all of them have arrived, emits them merged into a single payload.
pub struct RendezvousNode {
    inner: Mutex<Inner>,
    updates: watch::Sender<RendezvousStatus>,
}

impl RendezvousNode {
    /// New rendezvous waiting on `sources`
    pub fn new(sources: &[SourceInfo]) -> Self {
        let inner = Inner {
            sources: sources.iter().map(TrackedSource::waiting).collect(),
            connected: sources.to_vec(),
            ..Inner::default()
        };
        let (updates, _) = watch::channel(inner.status());

        Self {
            inner: Mutex::new(inner),
            updates,
        }
    }

    /// Record one delivery and return the resulting output: combined when
    /// every source has now delivered, waiting otherwise.
    pub fn receive(&self, envelope: Envelope) -> Payload {
        let mut inner = self.lock();
        let source_id = inner.record(envelope);
        tracing::debug!(
            "Rendezvous received {} ({} of {} sources)",
            source_id,
            inner.received_count(),
            inner.sources.len()
        );
        if inner.ready {
            tracing::info!("Rendezvous ready with {} sources", inner.sources.len());
        }
        self.publish(&inner);
        inner.output()
    }

    /// Re-sync the tracked set with the sources currently connected.
    pub fn sync_sources(&self, sources: &[SourceInfo]) {
        let mut inner = self.lock();
        if inner.sync(sources) {
            self.publish(&inner);
        }
    }

    /// Current output without recording anything
    pub fn current(&self) -> Payload {
        self.lock().output()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn status(&self) -> RendezvousStatus {
        self.lock().status()
    }

    pub fn sources(&self) -> Vec<TrackedSource> {
        self.lock().sources.clone()
    }

    pub fn combined(&self) -> Option<CombinedPayload> {
        self.lock().combined.clone()
    }

    /// Observe every status change as it happens
    pub fn subscribe(&self) -> watch::Receiver<RendezvousStatus> {
        self.updates.subscribe()
    }

    /// Resolve once every tracked source has delivered.
    pub async fn wait_ready(&self) -> Option<CombinedPayload> {
        let mut updates = self.subscribe();
        updates.wait_for(|status| status.ready).await.ok()?;
        self.combined()
    }

    /// Forget everything received so far. Connected sources are tracked
    /// again as waiting; anonymous deliveries are dropped.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let reseeded: Vec<TrackedSource> =
            inner.connected.iter().map(TrackedSource::waiting).collect();
        inner.sources = reseeded;
        inner.ready = false;
        inner.combined = None;
        tracing::debug!("Rendezvous reset");
        self.publish(&inner);
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.status());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Node for RendezvousNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Wait
    }

    async fn execute(&self, ctx: NodeContext, input: Envelope) -> Result<NodeOutput, NodeError> {
        self.sync_sources(&ctx.sources);

        let delivery = !input.payload.is_trigger()
            && (input.source.is_some() || input.payload.carries_data());
        let payload = if delivery {
            self.receive(input)
        } else {
            self.current()
        };

        if let Payload::Waiting(status) = &payload {
            ctx.events.info(format!(
                "{} of {} inputs received",
                status.received_source_count, status.current_source_count
            ));
        }
        Ok(payload.into())
    }

    fn accepts_deliveries(&self) -> bool {
        true
    }

    fn sources_changed(&self, sources: &[SourceInfo]) {
        self.sync_sources(sources);
    }

    fn reset(&self) {
        self.clear();
    }
}

pub struct RendezvousNodeFactory;

impl NodeFactory for RendezvousNodeFactory {
    fn create(&self, mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(RendezvousNode::new(&mount.sources)))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Wait
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "Wait".to_string(),
            description: "Waits for every connected input, then combines them".to_string(),
            category: "flow".to_string(),
        }
    }
}
