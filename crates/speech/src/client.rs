//! HTTP-backed implementation of the three external-speech traits,
//! behind a bounded worker pool with retry/backoff (spec §4.3).
//!
//! One `SpeechClient` implements `SpeechToText`, `Translator`, and
//! `TextToSpeech` against a single provider; it owns the connection pool,
//! the semaphore that bounds in-flight requests to `api_worker_pool`, and
//! the per-operation deadline/retry policy. Retry only covers transient
//! (network, 5xx, timeout) failures — 4xx responses are permanent and
//! fail immediately, mirroring the distinction a backoff loop needs to
//! make to avoid hammering a provider that's rejecting the request itself.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use relay_config::SpeechClientConfig;
use relay_core::{Error, Language, PcmBytes, Recognition, SpeechToText, TextToSpeech, Translator};
use relay_core::{VoiceInfo, VoiceProfile};

#[derive(Clone)]
pub struct SpeechClient {
    http: Client,
    config: SpeechClientConfig,
    inflight: Arc<Semaphore>,
    voices: Vec<VoiceInfo>,
}

impl SpeechClient {
    pub fn new(config: SpeechClientConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inflight: Arc::new(Semaphore::new(config.api_worker_pool)),
            http,
            config,
            voices: Vec::new(),
        })
    }

    pub fn with_voices(mut self, voices: Vec<VoiceInfo>) -> Self {
        self.voices = voices;
        self
    }

    async fn call_with_retry<Req, Resp>(
        &self,
        endpoint: &str,
        body: &Req,
        deadline: Duration,
        latency_metric: &'static str,
    ) -> Result<Resp, Error>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let started_at = std::time::Instant::now();
        let result = self.call_with_retry_inner(endpoint, body, deadline).await;
        metrics::histogram!(latency_metric).record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn call_with_retry_inner<Req, Resp>(
        &self,
        endpoint: &str,
        body: &Req,
        deadline: Duration,
    ) -> Result<Resp, Error>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|_| Error::Internal("speech client worker pool closed".into()))?;

        let mut backoff = self.config.initial_backoff();
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(endpoint, attempt, ?backoff, "retrying speech API call");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let attempt_result = tokio::time::timeout(
                deadline,
                self.http.post(endpoint).json(body).send(),
            )
            .await;

            let response = match attempt_result {
                Err(_) => {
                    last_err = Some(Error::Transient(format!("{endpoint} timed out")));
                    continue;
                }
                Ok(Err(e)) => {
                    last_err = Some(Error::Transient(format!("{endpoint} request failed: {e}")));
                    continue;
                }
                Ok(Ok(r)) => r,
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Resp>()
                    .await
                    .map_err(|e| Error::Permanent(format!("invalid response from {endpoint}: {e}")));
            }

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                last_err = Some(Error::Transient(format!("{endpoint} returned {status}")));
                continue;
            }

            // Client error: not retryable.
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Permanent(format!(
                "{endpoint} rejected request ({status}): {body}"
            )));
        }

        Err(last_err.unwrap_or_else(|| Error::Transient(format!("{endpoint}: retries exhausted"))))
    }
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    pcm_base64: String,
    source_lang: &'a str,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[async_trait]
impl SpeechToText for SpeechClient {
    async fn recognize(&self, pcm: &PcmBytes, source_lang: &Language) -> Result<Recognition, Error> {
        let Some(endpoint) = self.config.recognize_endpoint.as_deref() else {
            return Err(Error::Internal("recognize_endpoint is not configured".into()));
        };

        use base64::Engine;
        let request = RecognizeRequest {
            pcm_base64: base64::engine::general_purpose::STANDARD.encode(pcm.as_slice()),
            source_lang: source_lang.code(),
        };

        let resp: RecognizeResponse = self
            .call_with_retry(endpoint, &request, self.config.recognize_deadline())
            .await?;

        Ok(Recognition {
            text: resp.text,
            confidence: resp.confidence,
        })
    }

    fn model_name(&self) -> &str {
        "relay-speech-http"
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    text: String,
}

/// Wrap `text` with its context snippet the way the provider expects it
/// (spec §4.3: `"[...ctx] text"`), or return it unchanged when there is no
/// context to disambiguate pronouns with.
fn wrap_with_context(text: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!("[{ctx}] {text}"),
        _ => text.to_string(),
    }
}

/// Strip a context prefix the provider echoed back, by matching on the
/// closing bracket (spec §4.3). If the response carries no bracket at all
/// the stripping is considered to have failed and the full response is
/// kept verbatim, rather than guessing where the prefix ended.
fn strip_context_prefix(response: &str, had_context: bool) -> String {
    if !had_context {
        return response.to_string();
    }
    match response.find(']') {
        Some(idx) => response[idx + 1..].trim_start().to_string(),
        None => response.to_string(),
    }
}

#[async_trait]
impl Translator for SpeechClient {
    async fn translate(
        &self,
        text: &str,
        source_lang: &Language,
        target_lang: &Language,
        context: Option<&str>,
    ) -> Result<String, Error> {
        let Some(endpoint) = self.config.translate_endpoint.as_deref() else {
            return Err(Error::Internal("translate_endpoint is not configured".into()));
        };

        let had_context = matches!(context, Some(c) if !c.is_empty());
        let wrapped_text = wrap_with_context(text, context);

        let request = TranslateRequest {
            text: &wrapped_text,
            source_lang: source_lang.code(),
            target_lang: target_lang.code(),
        };

        let resp: TranslateResponse = self
            .call_with_retry(endpoint, &request, self.config.translate_deadline())
            .await?;

        Ok(strip_context_prefix(&resp.text, had_context))
    }
}


#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    language: &'a str,
    voice_id: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    pcm_base64: String,
}

#[async_trait]
impl TextToSpeech for SpeechClient {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<PcmBytes, Error> {
        let Some(endpoint) = self.config.synthesize_endpoint.as_deref() else {
            return Err(Error::Internal("synthesize_endpoint is not configured".into()));
        };

        let request = SynthesizeRequest {
            text,
            language: voice.language.code(),
            voice_id: voice.cache_key_component(),
        };

        let resp: SynthesizeResponse = self
            .call_with_retry(endpoint, &request, self.config.synthesize_deadline())
            .await?;

        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(resp.pcm_base64)
            .map_err(|e| Error::Permanent(format!("invalid base64 audio payload: {e}")))?;

        Ok(PcmBytes::new(bytes))
    }

    fn available_voices(&self) -> &[VoiceInfo] {
        &self.voices
    }
}
