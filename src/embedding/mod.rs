//! External embedding-service client (§6, §9).
//!
//! Treated as an external collaborator (§1): given text, returns a dense
//! float vector of the model's fixed dimension. §5 specifies a 60s request
//! timeout with capped exponential backoff honoring `Retry-After`; §9's
//! "exception-driven control flow for retry loops" redesign flag replaces
//! a try/catch retry loop with an explicit decision enum inspected by the
//! caller instead of unwound via an exception.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::{KbError, KbErrorKind, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(20);

const DIRECT_ENDPOINT: &str = "https://embeddings.example.com/v1/embed";
const GATEWAY_ENDPOINT: &str = "https://public-embeddings-gateway.example.com/v1/embed";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// The outcome of one HTTP attempt, inspected explicitly by the retry
/// loop rather than thrown and caught (§9 redesign flag).
enum AttemptOutcome {
    Done(Vec<f32>),
    Retry { after: Option<Duration> },
    Fatal(KbError),
}

fn classify_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    raw.parse::<u64>().ok().map(Duration::from_secs)
}

async fn run_with_retries<F, Fut>(mut attempt: F) -> Result<Vec<f32>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome>,
{
    let mut backoff = BASE_BACKOFF;
    for attempt_no in 0..MAX_ATTEMPTS {
        match attempt().await {
            AttemptOutcome::Done(vector) => return Ok(vector),
            AttemptOutcome::Fatal(err) => return Err(err),
            AttemptOutcome::Retry { after } => {
                if attempt_no + 1 == MAX_ATTEMPTS {
                    return Err(KbError::new(
                        KbErrorKind::Transport,
                        "embedding request exhausted retries",
                    ));
                }
                let wait = after.unwrap_or(backoff);
                warn!(attempt = attempt_no, wait_ms = wait.as_millis() as u64, "retrying embedding request");
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
    Err(KbError::new(KbErrorKind::Transport, "embedding request exhausted retries"))
}

/// Dispatches one already-configured request (auth, if any, already
/// attached by the caller) and classifies the outcome.
async fn send_request(request: reqwest::RequestBuilder) -> AttemptOutcome {
    match request.send().await {
        Ok(response) => handle_response(response).await,
        Err(err) if err.is_timeout() => {
            AttemptOutcome::Fatal(KbError::with_source(KbErrorKind::Timeout, "embedding request timed out", err))
        }
        Err(err) if err.is_connect() => AttemptOutcome::Retry { after: None },
        Err(err) => AttemptOutcome::Fatal(KbError::with_source(KbErrorKind::Transport, "embedding request failed", err)),
    }
}

pub struct DirectEmbeddingClient {
    http: Client,
    account: String,
    token: String,
    model: String,
}

impl DirectEmbeddingClient {
    pub fn new(account: String, token: String, model: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| KbError::with_source(KbErrorKind::Internal, "failed to build http client", e))?;
        Ok(Self { http, account, token, model })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest { model: &self.model, input: text };
        run_with_retries(|| {
            let request = self
                .http
                .post(DIRECT_ENDPOINT)
                .json(&body)
                .basic_auth(&self.account, Some(&self.token));
            send_request(request)
        })
        .await
    }
}

pub struct GatewayEmbeddingClient {
    http: Client,
    model: String,
}

impl GatewayEmbeddingClient {
    pub fn new(model: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| KbError::with_source(KbErrorKind::Internal, "failed to build http client", e))?;
        Ok(Self { http, model })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest { model: &self.model, input: text };
        run_with_retries(|| send_request(self.http.post(GATEWAY_ENDPOINT).json(&body))).await
    }
}

async fn handle_response(response: reqwest::Response) -> AttemptOutcome {
    let status = response.status();
    if status.is_success() {
        return match response.json::<EmbedResponse>().await {
            Ok(parsed) => AttemptOutcome::Done(parsed.embedding),
            Err(err) => AttemptOutcome::Fatal(KbError::with_source(
                KbErrorKind::Corrupt,
                "malformed embedding response body",
                err,
            )),
        };
    }
    if classify_status(status) {
        return AttemptOutcome::Retry { after: retry_after(response.headers()) };
    }
    if status == StatusCode::UNAUTHORIZED {
        return AttemptOutcome::Fatal(KbError::new(KbErrorKind::Unauthorized, "embedding service rejected credentials"));
    }
    AttemptOutcome::Fatal(KbError::new(
        KbErrorKind::Transport,
        format!("embedding service returned unexpected status {status}"),
    ))
}

/// Selects the direct-call or public-gateway client per §6: direct when
/// `EMBED_ACCOUNT`/`EMBED_TOKEN` are both present, gateway otherwise.
pub enum EmbeddingClient {
    Direct(DirectEmbeddingClient),
    Gateway(GatewayEmbeddingClient),
}

impl EmbeddingClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.has_direct_embed_credentials() {
            let account = config.embed_account.clone().expect("checked by has_direct_embed_credentials");
            let token = config.embed_token.clone().expect("checked by has_direct_embed_credentials");
            Ok(EmbeddingClient::Direct(DirectEmbeddingClient::new(
                account,
                token,
                config.embed_model.clone(),
            )?))
        } else {
            Ok(EmbeddingClient::Gateway(GatewayEmbeddingClient::new(config.embed_model.clone())?))
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            EmbeddingClient::Direct(client) => client.embed(text).await,
            EmbeddingClient::Gateway(client) => client.embed(text).await,
        }
    }
}
