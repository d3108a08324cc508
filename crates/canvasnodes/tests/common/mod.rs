#![allow(dead_code)]

use async_trait::async_trait;
use canvascore::{Envelope, EventEmitter, NodeContext, NodeState, SourceInfo, WebContent};
use canvasnodes::{BackendError, ServiceBackend};
use std::sync::Mutex;

/// In-process backend with canned answers
#[derive(Default)]
pub struct StubBackend {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl StubBackend {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(BackendError::Status {
                status: 503,
                detail: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceBackend for StubBackend {
    async fn chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        self.record(format!("chat:{}", user_prompt))?;
        Ok(format!("echo: {}", user_prompt))
    }

    async fn scrape(&self, url: &str) -> Result<WebContent, BackendError> {
        self.record(format!("scrape:{}", url))?;
        Ok(WebContent {
            url: url.to_string(),
            title: Some("Example Domain".to_string()),
            description: None,
            content: Some("This domain is for use in examples.".to_string()),
        })
    }

    async fn analyze_video(&self, _url: &str, video_id: &str) -> Result<String, BackendError> {
        self.record(format!("video:{}", video_id))?;
        Ok(format!("analysis of {}", video_id))
    }
}

pub fn context(state: NodeState, inputs: Vec<Envelope>) -> NodeContext {
    NodeContext::new("node", EventEmitter::detached("node"))
        .with_state(state)
        .with_inputs(inputs)
}

pub fn context_with_sources(sources: Vec<SourceInfo>) -> NodeContext {
    NodeContext::new("wait", EventEmitter::detached("wait")).with_sources(sources)
}
