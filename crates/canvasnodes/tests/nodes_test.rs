mod common;

use canvascore::{
    ChatReply, CombinedFormat, CombinedPayload, Envelope, Node, NodeState, Payload,
    VideoContent, WaitingStatus, WebContent,
};
use canvasnodes::{
    build_prompt, content_type, extract_video_id, AiChatNode, AiOutputNode, BackendConfig,
    DocumentNode, HttpBackend, StartNode, TextNode, VideoNode, WebSourceNode,
    DEFAULT_SYSTEM_PROMPT,
};
use common::{context, StubBackend};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

fn chat(response: &str) -> Payload {
    Payload::Chat(ChatReply {
        response: response.to_string(),
        system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        user_prompt: "question".to_string(),
    })
}

#[tokio::test]
async fn test_start_passes_trigger() {
    let output = StartNode
        .execute(context(NodeState::new(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(output.payload, Payload::Trigger);
}

#[tokio::test]
async fn test_text_node() {
    let state = NodeState::new().with("text", "hello");
    let output = TextNode
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(output.payload, Payload::text("hello"));

    let blank = NodeState::new().with("text", "   ");
    let output = TextNode
        .execute(context(blank, Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(output.payload, Payload::error("No text provided"));
}

#[tokio::test]
async fn test_ai_chat_sends_enhanced_prompt() {
    let backend = Arc::new(StubBackend::default());
    let node = AiChatNode::new(backend.clone());
    let state = NodeState::new()
        .with("systemPrompt", "Be brief.")
        .with("userPrompt", "Echo");
    let inputs = vec![Envelope::from_source("text", Payload::text("hello"))];

    let output = node
        .execute(context(state, inputs), Envelope::trigger())
        .await
        .unwrap();

    let Payload::Chat(reply) = &output.payload else {
        panic!("expected chat reply, got {:?}", output.payload);
    };
    assert!(reply.user_prompt.starts_with("INPUT TEXT:\nhello"));
    assert!(reply.user_prompt.ends_with("\n\nEcho"));
    assert_eq!(reply.system_prompt, "Be brief.");
    assert_eq!(reply.response, format!("echo: {}", reply.user_prompt));

    let state = output.state.expect("state records the last response");
    assert_eq!(state.get_str("lastResponse"), Some(reply.response.as_str()));
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn test_ai_chat_without_prompt_is_an_error() {
    let backend = Arc::new(StubBackend::default());
    let node = AiChatNode::new(backend.clone());

    let output = node
        .execute(context(NodeState::new(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    assert_eq!(output.payload, Payload::error("No usable prompt available."));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_ai_chat_rejects_waiting_rendezvous() {
    let node = AiChatNode::new(Arc::new(StubBackend::default()));
    let waiting = Payload::Waiting(WaitingStatus {
        message: "Waiting for all inputs to be ready: site".to_string(),
        current_source_count: 2,
        received_source_count: 1,
    });
    let state = NodeState::new().with("userPrompt", "Summarize");

    let output = node
        .execute(
            context(state, vec![Envelope::from_source("wait", waiting)]),
            Envelope::trigger(),
        )
        .await
        .unwrap();

    let error = output.payload.as_error().expect("error payload");
    assert!(error.contains("site"));
}

#[tokio::test]
async fn test_ai_chat_backend_failure_resolves_with_error() {
    let node = AiChatNode::new(Arc::new(StubBackend::failing()));
    let state = NodeState::new().with("userPrompt", "Hi");

    let output = node
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    assert!(output.payload.as_error().unwrap().contains("503"));
    assert!(output.state.is_none());
}

#[tokio::test]
async fn test_ai_chat_unreachable_http_backend_resolves_with_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = HttpBackend::new(BackendConfig {
        base_url: format!("http://127.0.0.1:{}", port),
        ..BackendConfig::default()
    });
    let node = AiChatNode::new(Arc::new(backend));
    let state = NodeState::new().with("userPrompt", "Hi");

    let output = node
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    assert!(output.payload.is_error());
}

#[test]
fn test_prompt_from_combined_sources() {
    let combined = Payload::Combined(CombinedPayload {
        video: Some(VideoContent {
            video_id: "abc".to_string(),
            url: "https://youtu.be/abc".to_string(),
            title: "Talk".to_string(),
            analysis: Some("A talk about Rust".to_string()),
        }),
        web: Some(WebContent {
            url: "https://example.com".to_string(),
            title: Some("Example".to_string()),
            description: None,
            content: Some("Body".to_string()),
        }),
        document: None,
        passthrough: BTreeMap::new(),
        format: Some(CombinedFormat::YoutubeAndWeb),
        source_count: 2,
        source_ids: vec!["yt".to_string(), "site".to_string()],
        timestamp: chrono::Utc::now(),
    });

    let prompt = build_prompt("", &[Envelope::from_source("wait", combined)]);

    let video_at = prompt.find("VIDEO ANALYSIS:").unwrap();
    let web_at = prompt.find("WEBPAGE CONTENT:").unwrap();
    assert!(video_at < web_at);
    assert!(prompt.contains("Analysis:\nA talk about Rust"));
    assert!(prompt.contains("Source URL: https://example.com"));
    assert!(prompt.contains("RESEARCH TASK"));
    assert!(prompt.ends_with("provide insights or a summary."));
}

#[test]
fn test_prompt_without_context_is_user_prompt() {
    assert_eq!(build_prompt("  Echo ", &[]), "Echo");
    assert_eq!(
        build_prompt("", &[Envelope::trigger(), Envelope::anonymous(Payload::error("x"))]),
        ""
    );

    let json = Payload::Json {
        value: serde_json::json!({"topic": "tides", "error": "ignored", "nested": {"a": 1}}),
    };
    let prompt = build_prompt("Go", &[Envelope::anonymous(json)]);
    assert!(prompt.starts_with("CONTEXT DATA:\n"));
    assert!(prompt.contains("topic: tides"));
    assert!(prompt.contains("nested: (complex data)"));
    assert!(!prompt.contains("ignored"));
}

#[tokio::test]
async fn test_ai_output_accepts_chat_reply() {
    let state = NodeState::new().with("errorMessage", "stale");
    let output = AiOutputNode
        .execute(
            context(state, vec![Envelope::from_source("chat", chat("42"))]),
            Envelope::trigger(),
        )
        .await
        .unwrap();

    assert_eq!(output.payload, chat("42"));
    let state = output.state.unwrap();
    assert_eq!(state.get_str("response"), Some("42"));
    assert!(state.get("errorMessage").is_none());
}

#[tokio::test]
async fn test_ai_output_reports_upstream_error() {
    let output = AiOutputNode
        .execute(
            context(
                NodeState::new(),
                vec![Envelope::from_source("chat", Payload::error("API error 500"))],
            ),
            Envelope::trigger(),
        )
        .await
        .unwrap();

    assert_eq!(output.payload, Payload::error("API error 500"));
    assert_eq!(
        output.state.unwrap().get_str("errorMessage"),
        Some("API error 500")
    );
}

#[tokio::test]
async fn test_ai_output_rejects_other_payloads() {
    for inputs in [vec![], vec![Envelope::from_source("t", Payload::text("hi"))]] {
        let output = AiOutputNode
            .execute(context(NodeState::new(), inputs), Envelope::trigger())
            .await
            .unwrap();
        assert_eq!(
            output.payload,
            Payload::error("Received invalid data from previous node.")
        );
    }
}

#[tokio::test]
async fn test_document_reads_file() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "Quarterly notes").unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let output = DocumentNode
        .execute(
            context(NodeState::new().with("filePath", path), Vec::new()),
            Envelope::trigger(),
        )
        .await
        .unwrap();

    let Payload::Document(document) = output.payload else {
        panic!("expected document");
    };
    assert_eq!(document.text, "Quarterly notes");
    assert_eq!(document.filesize, 15);
    assert_eq!(document.content_type, "text/plain");
    assert!(document.filename.ends_with(".txt"));
}

#[tokio::test]
async fn test_document_errors() {
    let missing = DocumentNode
        .execute(context(NodeState::new(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(missing.payload, Payload::error("No document selected."));

    let unreadable = DocumentNode
        .execute(
            context(
                NodeState::new().with("filePath", "/definitely/not/here.pdf"),
                Vec::new(),
            ),
            Envelope::trigger(),
        )
        .await
        .unwrap();
    assert!(unreadable.payload.as_error().unwrap().contains("here.pdf"));
}

#[tokio::test]
async fn test_document_uses_extracted_text() {
    let state = NodeState::new()
        .with("filename", "report.pdf")
        .with("text", "Extracted");

    let output = DocumentNode
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    let Payload::Document(document) = output.payload else {
        panic!("expected document");
    };
    assert_eq!(document.content_type, "application/pdf");
    assert_eq!(document.text, "Extracted");
    assert_eq!(content_type("notes.MD"), "text/markdown");
}

#[test]
fn test_extract_video_id() {
    let cases = [
        ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
        ("https://www.youtube.com/watch?t=42&v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
        ("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42", Some("dQw4w9WgXcQ")),
        ("https://www.youtube.com/embed/dQw4w9WgXcQ?start=3", Some("dQw4w9WgXcQ")),
        ("https://youtu.be/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
        ("https://example.com/watch?v=nope", None),
        ("https://youtu.be/", None),
    ];
    for (url, expected) in cases {
        assert_eq!(extract_video_id(url).as_deref(), expected, "{}", url);
    }
}

#[tokio::test]
async fn test_video_analysis_is_fetched_once_and_cached() {
    let backend = Arc::new(StubBackend::default());
    let node = VideoNode::new(backend.clone());
    let state = NodeState::new().with("url", "https://youtu.be/dQw4w9WgXcQ");

    let output = node
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    let Payload::Video(video) = &output.payload else {
        panic!("expected video");
    };
    assert_eq!(video.video_id, "dQw4w9WgXcQ");
    assert_eq!(video.title, "YouTube Video");
    assert_eq!(video.analysis.as_deref(), Some("analysis of dQw4w9WgXcQ"));

    let cached = output.state.unwrap();
    let again = node
        .execute(context(cached, Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(again.payload, output.payload);
    assert_eq!(backend.calls(), vec!["video:dQw4w9WgXcQ"]);
}

#[tokio::test]
async fn test_video_adopts_upstream_url() {
    let node = VideoNode::new(Arc::new(StubBackend::default()));
    let inputs = vec![Envelope::from_source(
        "text",
        Payload::text("https://www.youtube.com/watch?v=abc123"),
    )];

    let output = node
        .execute(context(NodeState::new(), inputs), Envelope::trigger())
        .await
        .unwrap();

    let Payload::Video(video) = output.payload else {
        panic!("expected video");
    };
    assert_eq!(video.video_id, "abc123");
    assert_eq!(video.url, "https://www.youtube.com/watch?v=abc123");
}

#[tokio::test]
async fn test_video_without_video_is_an_error() {
    let node = VideoNode::new(Arc::new(StubBackend::default()));
    let output = node
        .execute(context(NodeState::new(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(output.payload, Payload::error("No video selected."));
}

#[tokio::test]
async fn test_web_source_scrapes_then_uses_cache() {
    let backend = Arc::new(StubBackend::default());
    let node = WebSourceNode::new(backend.clone());
    let state = NodeState::new().with("url", "https://example.com");

    let output = node
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    let Payload::Web(page) = &output.payload else {
        panic!("expected web content");
    };
    assert_eq!(page.title.as_deref(), Some("Example Domain"));

    let again = node
        .execute(context(output.state.unwrap(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(again.payload, output.payload);
    assert_eq!(backend.calls(), vec!["scrape:https://example.com"]);
}

#[tokio::test]
async fn test_web_source_reads_api_shaped_cache() {
    let node = WebSourceNode::new(Arc::new(StubBackend::default()));
    let state = NodeState::new().with(
        "scrapedContent",
        serde_json::json!({"url": "https://a.test", "title": "A", "main_content": "Body"}),
    );

    let output = node
        .execute(context(state, Vec::new()), Envelope::trigger())
        .await
        .unwrap();

    let Payload::Web(page) = output.payload else {
        panic!("expected web content");
    };
    assert_eq!(page.content.as_deref(), Some("Body"));
}

#[tokio::test]
async fn test_web_source_without_content_is_an_error() {
    let node = WebSourceNode::new(Arc::new(StubBackend::default()));
    let output = node
        .execute(context(NodeState::new(), Vec::new()), Envelope::trigger())
        .await
        .unwrap();
    assert_eq!(
        output.payload,
        Payload::error("No scraped content. Please scrape a website first.")
    );
}
