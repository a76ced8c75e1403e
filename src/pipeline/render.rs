//! Render client: one diagram source in, one artifact (or failure) out.
//!
//! ## Request
//!
//! `GET {base}/{svg|img}/{payload}` where the payload is the URL-safe,
//! unpadded base64 of the source (see [`crate::pipeline::encode`]).
//!
//! ## Validation
//!
//! The service can answer 200 with an HTML error page, so status alone is
//! not trusted: an SVG body must start with `<svg` or `<?xml` after
//! trimming, a PNG body with the PNG signature.
//!
//! ## Retries
//!
//! Every failure is classified by the [`RetryPolicy`]. The loop stops on
//! success, on a `Fatal` class, or when attempts run out. If the last failure
//! was batch-aborting (the service could not be reached), the outcome is
//! [`RenderOutcome::Aborted`] and the orchestrator stops the batch.

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::Mmd2SvgError;
use crate::interrupt::Interrupt;
use crate::pipeline::encode::encode_source;
use crate::pipeline::extract::DiagramBlock;
use crate::pipeline::retry::{AttemptFailure, FailureClass, FailureKind, RetryDecision, RetryPolicy};
use crate::progress::ProgressCallback;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Maximum number of body characters quoted in a failure reason.
const BODY_PREVIEW_CHARS: usize = 200;

/// Raw HTTP answer from the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Network seam between the render client and the rendering service.
///
/// [`HttpTransport`] is the production implementation; tests supply scripted
/// ones through [`crate::config::ConversionConfigBuilder::transport`].
pub trait RenderTransport: Send + Sync {
    /// Issue a GET request. Transport-level failures are reported as an
    /// [`AttemptFailure`] carrying the matching [`FailureKind`].
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TransportResponse, AttemptFailure>>;
}

/// [`RenderTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, Mmd2SvgError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mmd2svg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Mmd2SvgError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Map a reqwest error onto the retry model. Timeouts are checked first:
/// a connect timeout is an ordinary transient failure, not an unreachable host.
fn classify_reqwest_error(e: &reqwest::Error) -> AttemptFailure {
    if e.is_timeout() {
        AttemptFailure::new(FailureKind::Timeout, format!("request timed out: {e}"))
    } else if e.is_connect() {
        AttemptFailure::new(FailureKind::Connect, format!("connection failed: {e}"))
    } else {
        AttemptFailure::new(FailureKind::Transport, format!("transport error: {e}"))
    }
}

impl RenderTransport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TransportResponse, AttemptFailure>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            Ok(TransportResponse {
                status,
                body: body.to_vec(),
            })
        })
    }
}

/// One try at rendering a diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderAttempt {
    /// 1-based, at most the policy's `max_attempts`.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Vec<u8>),
    Failure(AttemptFailure),
}

/// Final result of rendering one diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A validated artifact.
    Rendered { artifact: Vec<u8>, attempts: u32 },
    /// Retryable failures until attempts ran out.
    Failed { reason: String, attempts: u32 },
    /// The classifier refused to retry.
    Rejected { reason: String, attempts: u32 },
    /// The service could not be reached; the batch must stop.
    Aborted { reason: String, attempts: u32 },
    /// The interrupt fired before the diagram finished.
    Interrupted { attempts: u32 },
}

impl RenderOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RenderOutcome::Rendered { attempts, .. }
            | RenderOutcome::Failed { attempts, .. }
            | RenderOutcome::Rejected { attempts, .. }
            | RenderOutcome::Aborted { attempts, .. }
            | RenderOutcome::Interrupted { attempts } => *attempts,
        }
    }
}

/// Check that a response carries a usable artifact of `format`.
pub fn validate_response(
    format: OutputFormat,
    response: &TransportResponse,
) -> Result<(), AttemptFailure> {
    if response.status != 200 {
        return Err(AttemptFailure::new(
            FailureKind::HttpStatus(response.status),
            format!("HTTP {}", response.status),
        ));
    }

    let valid = match format {
        OutputFormat::Svg => {
            let text = String::from_utf8_lossy(&response.body);
            let text = text.trim_start();
            text.starts_with("<svg") || text.starts_with("<?xml")
        }
        OutputFormat::Png => response.body.starts_with(PNG_SIGNATURE),
    };

    if valid {
        Ok(())
    } else {
        Err(AttemptFailure::new(
            FailureKind::InvalidBody,
            format!(
                "response is not a valid {} document",
                format.extension().to_uppercase()
            ),
        ))
    }
}

fn body_preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect()
}

/// Renders diagram blocks through a [`RenderTransport`], retrying per policy.
pub struct RenderClient {
    transport: Arc<dyn RenderTransport>,
    base_url: String,
    format: OutputFormat,
    policy: RetryPolicy,
    progress: Option<ProgressCallback>,
}

impl RenderClient {
    pub fn new(
        transport: Arc<dyn RenderTransport>,
        base_url: impl Into<String>,
        format: OutputFormat,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            format,
            policy,
            progress: None,
        }
    }

    /// Build a client from the conversion config, creating an
    /// [`HttpTransport`] unless one was injected.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Mmd2SvgError> {
        let transport: Arc<dyn RenderTransport> = match config.transport {
            Some(ref t) => Arc::clone(t),
            None => Arc::new(HttpTransport::new(config.timeout)?),
        };
        let mut client = Self::new(
            transport,
            &config.base_url,
            config.format,
            config.retry_policy(),
        );
        client.progress = config.progress_callback.clone();
        Ok(client)
    }

    /// Full request URL for a diagram source.
    pub fn request_url(&self, source: &str) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.base_url,
            self.format.endpoint(),
            encode_source(source)
        );
        if let Some(query) = self.format.query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Perform a single attempt against `url`.
    pub async fn attempt(&self, url: &str, attempt: u32) -> RenderAttempt {
        let outcome = match self.transport.get(url).await {
            Ok(response) => match validate_response(self.format, &response) {
                Ok(()) => AttemptOutcome::Success(response.body),
                Err(failure) => {
                    let preview = body_preview(&response.body);
                    debug!("Rejected response body: {:?}", preview);
                    AttemptOutcome::Failure(failure)
                }
            },
            Err(failure) => AttemptOutcome::Failure(failure),
        };
        RenderAttempt { attempt, outcome }
    }

    /// Render one block, retrying until success, give-up, or interrupt.
    pub async fn render(&self, block: &DiagramBlock, interrupt: &Interrupt) -> RenderOutcome {
        let url = self.request_url(&block.source);
        let max = self.policy.max_attempts();
        debug!("Diagram {}: GET {}", block.ordinal, url);

        let mut attempt = 1;
        loop {
            if interrupt.is_triggered() {
                return RenderOutcome::Interrupted {
                    attempts: attempt - 1,
                };
            }

            let failure = match self.attempt(&url, attempt).await.outcome {
                AttemptOutcome::Success(artifact) => {
                    if attempt > 1 {
                        info!("Diagram {} rendered on attempt {}", block.ordinal, attempt);
                    }
                    return RenderOutcome::Rendered {
                        artifact,
                        attempts: attempt,
                    };
                }
                AttemptOutcome::Failure(failure) => failure,
            };

            let class = self.policy.classify(&failure);
            let decision = self.policy.decide(attempt, class);
            let retry_in = match decision {
                RetryDecision::RetryAfter(delay) => Some(delay),
                RetryDecision::GiveUp => None,
            };

            warn!(
                "Diagram {}: attempt {}/{} failed: {}",
                block.ordinal, attempt, max, failure
            );
            if let Some(ref cb) = self.progress {
                cb.on_attempt_failed(block.ordinal, attempt, max, &failure.reason, retry_in);
            }

            let Some(delay) = retry_in else {
                let reason = failure.reason;
                return match class {
                    FailureClass::Retryable => RenderOutcome::Failed {
                        reason,
                        attempts: attempt,
                    },
                    FailureClass::Fatal => RenderOutcome::Rejected {
                        reason,
                        attempts: attempt,
                    },
                    FailureClass::BatchAborting => RenderOutcome::Aborted {
                        reason,
                        attempts: attempt,
                    },
                };
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = interrupt.triggered() => {
                    return RenderOutcome::Interrupted { attempts: attempt };
                }
            }
            attempt += 1;
        }
    }
}
