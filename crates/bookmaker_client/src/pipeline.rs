//! Pipeline backend client
//!
//! Plain JSON over HTTP. Non-2xx responses carry `{detail}`; when the body
//! has none the error falls back to `HTTP <status>`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Model used when a caller does not pick one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub project_id: String,
    pub status: String,
    pub current_phase: i64,
    pub total_chapters: i64,
    pub completed_chapters: i64,
    pub is_running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPipeline {
    pub start_phase: u32,
    pub end_phase: u32,
    pub model: String,
}

impl Default for StartPipeline {
    fn default() -> Self {
        Self {
            start_phase: 1,
            end_phase: 11,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Acknowledgement for start/pause/resume/stop and single-phase runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAck {
    pub status: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_phase: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_phase: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunAgent {
    pub phase: u32,
    pub chapter_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Serialize)]
struct RunAgentBody<'a> {
    agent_name: &'a str,
    phase: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    chapter_id: Option<&'a str>,
    model: &'a str,
}

#[derive(Serialize)]
struct RunPhaseBody<'a> {
    phase: u32,
    model: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub agent_name: String,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u64,
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub phase: u32,
    pub is_chapter_level: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub phase: u32,
    pub agents: Vec<AgentInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub timestamp: String,
    pub config_loaded: bool,
}

#[derive(Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
}

#[derive(Clone)]
pub struct PipelineClient {
    base_url: String,
    client: reqwest::Client,
}

impl Default for PipelineClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl PipelineClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorDetail>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(PipelineError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "pipeline GET");
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        debug!(path, "pipeline POST");
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::decode(request.send().await?).await
    }

    pub async fn status(&self, project_id: &str) -> Result<PipelineStatus> {
        self.get(&format!("/api/projects/{project_id}/status")).await
    }

    pub async fn start(&self, project_id: &str, request: &StartPipeline) -> Result<PipelineAck> {
        self.post(&format!("/api/projects/{project_id}/start"), Some(request))
            .await
    }

    pub async fn pause(&self, project_id: &str) -> Result<PipelineAck> {
        self.post::<_, ()>(&format!("/api/projects/{project_id}/pause"), None)
            .await
    }

    pub async fn resume(&self, project_id: &str) -> Result<PipelineAck> {
        self.post::<_, ()>(&format!("/api/projects/{project_id}/resume"), None)
            .await
    }

    pub async fn stop(&self, project_id: &str) -> Result<PipelineAck> {
        self.post::<_, ()>(&format!("/api/projects/{project_id}/stop"), None)
            .await
    }

    pub async fn run_phase(
        &self,
        project_id: &str,
        phase: u32,
        model: Option<&str>,
    ) -> Result<PipelineAck> {
        let body = RunPhaseBody {
            phase,
            model: model.unwrap_or(DEFAULT_MODEL),
        };
        self.post(&format!("/api/projects/{project_id}/phases/{phase}"), Some(&body))
            .await
    }

    pub async fn run_agent(
        &self,
        project_id: &str,
        agent_name: &str,
        request: &RunAgent,
    ) -> Result<AgentResult> {
        let body = RunAgentBody {
            agent_name,
            phase: request.phase,
            chapter_id: request.chapter_id.as_deref(),
            model: request.model.as_deref().unwrap_or(DEFAULT_MODEL),
        };
        self.post(
            &format!("/api/projects/{project_id}/agents/{agent_name}"),
            Some(&body),
        )
        .await
    }

    pub async fn phases(&self) -> Result<Vec<PhaseInfo>> {
        self.get("/api/phases").await
    }

    pub async fn health(&self) -> Result<Health> {
        let response = self.client.get(self.url("/health")).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::Api {
                status: response.status().as_u16(),
                detail: format!("Backend API not available at {}", self.base_url),
            });
        }
        Ok(response.json().await?)
    }
}
