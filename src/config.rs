//! Configuration types for diagram conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Retry limits, the service address and
//! the network transport are plain fields here rather than module globals, so
//! tests can inject a zero-delay policy and a scripted transport.

use crate::error::Mmd2SvgError;
use crate::pipeline::extract::DEFAULT_LANGUAGE;
use crate::pipeline::render::RenderTransport;
use crate::pipeline::retry::{
    FailureClassifier, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default rendering service.
pub const DEFAULT_BASE_URL: &str = "https://mermaid.ink";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a conversion run.
///
/// # Example
/// ```rust
/// use mmd2svg::ConversionConfig;
/// use std::time::Duration;
///
/// let config = ConversionConfig::builder()
///     .max_attempts(3)
///     .retry_delay(Duration::from_millis(500))
///     .base_url("http://localhost:3000")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering service root, without trailing slash. Default: `https://mermaid.ink`.
    pub base_url: String,

    /// Artifact kind requested from the service. Default: [`OutputFormat::Svg`].
    pub format: OutputFormat,

    /// Fence language tag that marks a diagram block. Default: `mermaid`.
    pub language: String,

    /// Attempts per diagram, including the first. Default: 5.
    pub max_attempts: u32,

    /// Fixed pause between attempts. Default: 2 s.
    pub retry_delay: Duration,

    /// Per-request timeout. Default: 30 s.
    pub timeout: Duration,

    /// Override for the failure classifier. `None` uses
    /// [`crate::pipeline::retry::DefaultClassifier`].
    pub classifier: Option<Arc<dyn FailureClassifier>>,

    /// Write files here instead of the directory derived from the document name.
    pub output_dir: Option<PathBuf>,

    /// Pre-constructed transport. Takes precedence over the built-in HTTP client.
    pub transport: Option<Arc<dyn RenderTransport>>,

    /// Receives per-diagram and per-attempt events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            format: OutputFormat::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            classifier: None,
            output_dir: None,
            transport: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("base_url", &self.base_url)
            .field("format", &self.format)
            .field("language", &self.language)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field(
                "classifier",
                &self.classifier.as_ref().map(|_| "<dyn FailureClassifier>"),
            )
            .field("output_dir", &self.output_dir)
            .field(
                "transport",
                &self.transport.as_ref().map(|_| "<dyn RenderTransport>"),
            )
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build the retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, self.retry_delay);
        match self.classifier {
            Some(ref classifier) => policy.with_classifier(Arc::clone(classifier)),
            None => policy,
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn language(mut self, tag: impl Into<String>) -> Self {
        self.config.language = tag.into();
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.config.classifier = Some(classifier);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RenderTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Mmd2SvgError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(Mmd2SvgError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if c.timeout.is_zero() {
            return Err(Mmd2SvgError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(Mmd2SvgError::InvalidConfig(
                "diagram language tag must not be empty".into(),
            ));
        }
        if c.transport.is_none()
            && !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://"))
        {
            return Err(Mmd2SvgError::InvalidConfig(format!(
                "base URL must be an http:// or https:// address, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Artifact kind requested from the rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Vector markup (`/svg/` endpoint). (default)
    #[default]
    Svg,
    /// Raster image (`/img/` endpoint, PNG).
    Png,
}

impl OutputFormat {
    /// Path segment selecting this format on the service.
    pub fn endpoint(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "img",
        }
    }

    /// Query string appended to the request, if any.
    pub fn query(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Svg => None,
            OutputFormat::Png => Some("type=png"),
        }
    }

    /// File extension for written artifacts.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
