use async_trait::async_trait;
use canvascore::WebContent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Received empty response from API")]
    EmptyResponse,
}

/// External services the AI, video and web nodes call out to
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Send a prompt pair to the chat model, returning its answer
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError>;

    async fn scrape(&self, url: &str) -> Result<WebContent, BackendError>;

    /// Produce a textual analysis of a video
    async fn analyze_video(&self, url: &str, video_id: &str) -> Result<String, BackendError>;
}

/// Settings for [`HttpBackend`]
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Model name sent with video analysis requests
    pub video_model: String,
    pub analysis_prompt: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            video_model: "gemini-2.0-flash".to_string(),
            analysis_prompt: "Analyze this video and summarize its key points, topics and \
                              takeaways."
                .to_string(),
        }
    }
}

/// [`ServiceBackend`] over the companion HTTP API
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.detail.or(b.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown API error")
                        .to_string()
                });
            tracing::warn!("{} returned {}: {}", url, status, detail);
            return Err(BackendError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json::<R>().await?)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: Option<String>,
}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    main_content: Option<String>,
    content: Option<String>,
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptRequest<'a> {
    upload_result: UploadRef<'a>,
    prompt: &'a str,
    model: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRef<'a> {
    uri: &'a str,
    video_id: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    #[serde(alias = "response", alias = "analysis")]
    text: Option<String>,
}

#[async_trait]
impl ServiceBackend for HttpBackend {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        let reply: ChatResponse = self
            .post(
                "/api/ai-chat",
                &ChatRequest {
                    system_prompt,
                    user_prompt,
                },
            )
            .await?;

        reply
            .response
            .filter(|r| !r.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)
    }

    async fn scrape(&self, url: &str) -> Result<WebContent, BackendError> {
        let page: ScrapeResponse = self.post("/api/scrape", &ScrapeRequest { url }).await?;

        Ok(WebContent {
            url: page.url.unwrap_or_else(|| url.to_string()),
            title: page.title,
            description: page.description,
            content: page.main_content.or(page.content).or(page.text),
        })
    }

    async fn analyze_video(&self, url: &str, video_id: &str) -> Result<String, BackendError> {
        let reply: PromptResponse = self
            .post(
                "/api/prompt",
                &PromptRequest {
                    upload_result: UploadRef { uri: url, video_id },
                    prompt: &self.config.analysis_prompt,
                    model: &self.config.video_model,
                },
            )
            .await?;

        reply
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}
