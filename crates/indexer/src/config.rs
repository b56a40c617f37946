//! Configuration management for the tickstream indexer.
//!
//! Configuration is read from a TOML file. Values may reference environment
//! variables with `${VAR_NAME}`; every section except `[source]` has defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tickstream_core::Epoch;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source event service
    pub source: SourceConfig,

    /// Kafka producer
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Checkpoint store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sync loop
    #[serde(default)]
    pub sync: SyncConfig,

    /// Metrics and status endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source event service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the event service (e.g., "http://localhost:8000")
    pub url: String,

    /// Timeout of a single HTTP request in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Kafka producer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Comma separated `host:port` list
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,

    /// Topic every event is produced to
    #[serde(default = "default_produce_topic")]
    pub produce_topic: String,

    /// Compression codec: none, gzip, snappy, lz4, zstd
    #[serde(default = "default_compression")]
    pub compression: String,

    /// librdkafka `message.timeout.ms`; must not exceed the sync delivery timeout
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,

    /// Timeout of the metadata request sent at startup
    #[serde(default = "default_startup_check_timeout_secs")]
    pub startup_check_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            produce_topic: default_produce_topic(),
            compression: default_compression(),
            message_timeout_ms: default_message_timeout_ms(),
            startup_check_timeout_secs: default_startup_check_timeout_secs(),
        }
    }
}

/// Checkpoint store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database URL (e.g., "sqlite://events-publisher.db")
    #[serde(default = "default_storage_url")]
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
        }
    }
}

/// Sync loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the sync loop at all
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,

    /// First epoch to look at on startup
    #[serde(default = "default_start_epoch")]
    pub start_epoch: Epoch,

    /// Pause between cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout of the status request in seconds
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,

    /// Timeout of a tick fetch in seconds
    #[serde(default = "default_tick_fetch_timeout_secs")]
    pub tick_fetch_timeout_secs: u64,

    /// Longest wait for a tick's deliveries in seconds (0 = unbounded)
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Backoff after the first failed cycle in milliseconds (0 = no backoff)
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,

    /// Upper bound of the backoff in milliseconds
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            start_epoch: default_start_epoch(),
            poll_interval_ms: default_poll_interval_ms(),
            status_timeout_secs: default_status_timeout_secs(),
            tick_fetch_timeout_secs: default_tick_fetch_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            retry_backoff_initial_ms: default_retry_backoff_initial_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
        }
    }
}

impl SyncConfig {
    /// Pause between cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout of the status request.
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Timeout of a tick fetch.
    pub fn tick_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_fetch_timeout_secs)
    }

    /// Tick barrier bound, `None` when unbounded.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        (self.delivery_timeout_secs > 0).then(|| Duration::from_secs(self.delivery_timeout_secs))
    }

    /// Backoff before the next cycle after `failures` consecutive failed cycles.
    pub fn retry_backoff(&self, failures: u32) -> Duration {
        if failures == 0 || self.retry_backoff_initial_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (failures - 1).min(16);
        let backoff = self
            .retry_backoff_initial_ms
            .saturating_mul(factor)
            .min(self.retry_backoff_max_ms);
        Duration::from_millis(backoff)
    }
}

/// Metrics and status endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Port of the HTTP server (0 = disabled)
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// Prefix of every metric name
    #[serde(default = "default_metrics_namespace")]
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
            namespace: default_metrics_namespace(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_request_timeout_secs() -> u64 {
    10
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_produce_topic() -> String {
    "qubic-events".to_string()
}

fn default_compression() -> String {
    "zstd".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_startup_check_timeout_secs() -> u64 {
    10
}

fn default_storage_url() -> String {
    "sqlite://events-publisher.db".to_string()
}

fn default_sync_enabled() -> bool {
    true
}

fn default_start_epoch() -> Epoch {
    153
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_status_timeout_secs() -> u64 {
    5
}

fn default_tick_fetch_timeout_secs() -> u64 {
    5
}

fn default_delivery_timeout_secs() -> u64 {
    60
}

fn default_retry_backoff_initial_ms() -> u64 {
    1000
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

fn default_metrics_port() -> u16 {
    9999
}

fn default_metrics_namespace() -> String {
    "qubic_kafka".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `bootstrap_servers = "${KAFKA_BROKERS}"`
    ///
    /// # Example
    /// ```no_run
    /// # use tickstream_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let url = self.source.url.trim();
        if url.is_empty() {
            anyhow::bail!("Source url cannot be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("Source url must start with http:// or https:// (got '{}')", url);
        }
        if self.source.request_timeout_secs == 0 {
            anyhow::bail!("Source request_timeout_secs must be > 0");
        }

        if self.broker.bootstrap_servers.trim().is_empty() {
            anyhow::bail!("Broker bootstrap_servers cannot be empty");
        }
        if self.broker.produce_topic.trim().is_empty() {
            anyhow::bail!("Broker produce_topic cannot be empty");
        }
        let valid_codecs = ["none", "gzip", "snappy", "lz4", "zstd"];
        if !valid_codecs.contains(&self.broker.compression.as_str()) {
            anyhow::bail!(
                "Broker compression must be one of: {} (got '{}')",
                valid_codecs.join(", "),
                self.broker.compression
            );
        }
        if self.broker.message_timeout_ms == 0 {
            anyhow::bail!("Broker message_timeout_ms must be > 0");
        }

        if self.storage.url.is_empty() {
            anyhow::bail!("Storage url cannot be empty");
        }

        if self.sync.start_epoch == 0 {
            anyhow::bail!("Sync start_epoch must be > 0");
        }
        if self.sync.poll_interval_ms == 0 {
            anyhow::bail!("Sync poll_interval_ms must be > 0 (tokio interval cannot be zero)");
        }
        if self.sync.status_timeout_secs == 0 {
            anyhow::bail!("Sync status_timeout_secs must be > 0");
        }
        if self.sync.tick_fetch_timeout_secs == 0 {
            anyhow::bail!("Sync tick_fetch_timeout_secs must be > 0");
        }
        if self.sync.retry_backoff_max_ms < self.sync.retry_backoff_initial_ms {
            anyhow::bail!(
                "Sync retry_backoff_max_ms ({}) cannot be below retry_backoff_initial_ms ({})",
                self.sync.retry_backoff_max_ms,
                self.sync.retry_backoff_initial_ms
            );
        }
        // A delivery report has to arrive before the engine stops waiting for it.
        if let Some(delivery_timeout) = self.sync.delivery_timeout() {
            if u128::from(self.broker.message_timeout_ms) > delivery_timeout.as_millis() {
                anyhow::bail!(
                    "Broker message_timeout_ms ({}) cannot exceed sync delivery_timeout_secs ({}s)",
                    self.broker.message_timeout_ms,
                    self.sync.delivery_timeout_secs
                );
            }
        }

        let namespace = &self.metrics.namespace;
        if namespace.is_empty()
            || namespace.starts_with(|c: char| c.is_ascii_digit())
            || !namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        {
            anyhow::bail!(
                "Metrics namespace must be a valid Prometheus name (got '{}')",
                namespace
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// TOML string kinds tracked while expanding placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

impl Quote {
    /// Longest delimiters first so `"""` is not read as an empty `""`.
    const OPENERS: [Quote; 4] = [
        Quote::MultiBasic,
        Quote::MultiLiteral,
        Quote::Basic,
        Quote::Literal,
    ];

    fn delimiter(self) -> &'static str {
        match self {
            Quote::Basic => "\"",
            Quote::Literal => "'",
            Quote::MultiBasic => "\"\"\"",
            Quote::MultiLiteral => "'''",
        }
    }

    fn allows_escapes(self) -> bool {
        matches!(self, Quote::Basic | Quote::MultiBasic)
    }

    fn is_multiline(self) -> bool {
        matches!(self, Quote::MultiBasic | Quote::MultiLiteral)
    }
}

/// Replace `${VAR_NAME}` placeholders with environment values.
///
/// Placeholders inside TOML comments are left alone. A `#` only opens a comment
/// outside strings; `"""` and `'''` strings stay open across lines, and escaped
/// quotes in basic strings do not close them.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut quote: Option<Quote> = None;
    let mut in_comment = false;
    let mut line_no = 1usize;
    let mut rest = input;

    while let Some(ch) = rest.chars().next() {
        if ch == '\n' {
            line_no += 1;
            in_comment = false;
            if quote.is_some_and(|open| !open.is_multiline()) {
                quote = None;
            }
        } else if in_comment {
            // copied as-is
        } else if ch == '\\' && quote.is_some_and(Quote::allows_escapes) {
            let escaped = rest[1..].chars().next();
            if escaped == Some('\n') {
                line_no += 1;
            }
            let len = 1 + escaped.map_or(0, char::len_utf8);
            result.push_str(&rest[..len]);
            rest = &rest[len..];
            continue;
        } else if let Some(placeholder) = rest.strip_prefix("${") {
            let end = placeholder
                .find(|c: char| c == '}' || c == '\n')
                .filter(|&end| placeholder[end..].starts_with('}'))
                .with_context(|| {
                    format!(
                        "Unclosed environment variable placeholder at line {}",
                        line_no
                    )
                })?;
            let name = &placeholder[..end];
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name at line {}", line_no);
            }
            let value = std::env::var(name).map_err(|_| {
                anyhow::anyhow!(
                    "Environment variable '{}' is not set (referenced at line {})",
                    name,
                    line_no
                )
            })?;
            result.push_str(&value);
            rest = &placeholder[end + 1..];
            continue;
        } else if let Some(open) = quote {
            if rest.starts_with(open.delimiter()) {
                quote = None;
                result.push_str(open.delimiter());
                rest = &rest[open.delimiter().len()..];
                continue;
            }
        } else if ch == '#' {
            in_comment = true;
        } else if let Some(kind) = Quote::OPENERS
            .into_iter()
            .find(|kind| rest.starts_with(kind.delimiter()))
        {
            quote = Some(kind);
            result.push_str(kind.delimiter());
            rest = &rest[kind.delimiter().len()..];
            continue;
        }

        result.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let toml = r#"
[source]
url = "http://localhost:8000"
request_timeout_secs = 3

[broker]
bootstrap_servers = "kafka-1:9092,kafka-2:9092"
produce_topic = "events"
compression = "lz4"

[storage]
url = "sqlite://events.db"

[sync]
start_epoch = 160
poll_interval_ms = 250
delivery_timeout_secs = 0

[metrics]
port = 9100
namespace = "events_publisher"

[logging]
level = "debug"
format = "json"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.source.url, "http://localhost:8000");
        assert_eq!(config.broker.produce_topic, "events");
        assert_eq!(config.broker.compression, "lz4");
        assert_eq!(config.storage.url, "sqlite://events.db");
        assert_eq!(config.sync.start_epoch, 160);
        assert_eq!(config.sync.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.sync.delivery_timeout(), None);
        assert_eq!(config.metrics.namespace, "events_publisher");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("[source]\nurl = \"http://localhost:8000\"").unwrap();

        assert_eq!(config.source.request_timeout_secs, 10);
        assert_eq!(config.broker.bootstrap_servers, "localhost:9092");
        assert_eq!(config.broker.produce_topic, "qubic-events");
        assert_eq!(config.broker.compression, "zstd");
        assert_eq!(config.broker.message_timeout_ms, 30_000);
        assert_eq!(config.storage.url, "sqlite://events-publisher.db");
        assert!(config.sync.enabled);
        assert_eq!(config.sync.start_epoch, 153);
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.sync.status_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.tick_fetch_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.sync.delivery_timeout(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.metrics.port, 9999);
        assert_eq!(config.metrics.namespace, "qubic_kafka");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_source_section() {
        assert!(Config::from_toml_str("[sync]\nstart_epoch = 1").is_err());
    }

    #[test]
    fn test_validation_empty_source_url() {
        let result = Config::from_toml_str("[source]\nurl = \"\"");
        assert!(result.unwrap_err().to_string().contains("Source url"));
    }

    #[test]
    fn test_validation_source_url_scheme() {
        let result = Config::from_toml_str("[source]\nurl = \"localhost:8000\"");
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[test]
    fn test_validation_zero_start_epoch() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[sync]
start_epoch = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("start_epoch"));
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[sync]
poll_interval_ms = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_validation_unknown_compression() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[broker]
compression = "brotli"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("compression"));
    }

    #[test]
    fn test_validation_backoff_bounds() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[sync]
retry_backoff_initial_ms = 5000
retry_backoff_max_ms = 1000
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("retry_backoff_max_ms"));
    }

    #[test]
    fn test_validation_message_timeout_within_delivery_timeout() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[broker]
message_timeout_ms = 300000

[sync]
delivery_timeout_secs = 60
        "#;

        let err = Config::from_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("message_timeout_ms (300000)"), "{err}");
        assert!(err.contains("delivery_timeout_secs (60s)"), "{err}");

        // Equal bounds are fine, and an unbounded delivery wait accepts anything.
        let equal = toml.replace("300000", "60000");
        assert!(Config::from_toml_str(&equal).is_ok());
        let unbounded = toml.replace("delivery_timeout_secs = 60", "delivery_timeout_secs = 0");
        assert!(Config::from_toml_str(&unbounded).is_ok());
    }

    #[test]
    fn test_validation_metrics_namespace() {
        for namespace in ["", "qubic-kafka", "9lives", "with space"] {
            let toml = format!(
                "[source]\nurl = \"http://localhost:8000\"\n[metrics]\nnamespace = \"{}\"",
                namespace
            );
            let result = Config::from_toml_str(&toml);
            assert!(
                result.unwrap_err().to_string().contains("namespace"),
                "accepted '{namespace}'"
            );
        }
    }

    #[test]
    fn test_validation_log_level() {
        let toml = r#"
[source]
url = "http://localhost:8000"

[logging]
level = "verbose"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("Logging level"));
    }

    #[test]
    fn test_retry_backoff() {
        let sync = SyncConfig {
            retry_backoff_initial_ms: 1000,
            retry_backoff_max_ms: 30_000,
            ..SyncConfig::default()
        };

        assert_eq!(sync.retry_backoff(0), Duration::ZERO);
        assert_eq!(sync.retry_backoff(1), Duration::from_secs(1));
        assert_eq!(sync.retry_backoff(2), Duration::from_secs(2));
        assert_eq!(sync.retry_backoff(5), Duration::from_secs(16));
        assert_eq!(sync.retry_backoff(6), Duration::from_secs(30));
        assert_eq!(sync.retry_backoff(u32::MAX), Duration::from_secs(30));

        let disabled = SyncConfig {
            retry_backoff_initial_ms: 0,
            ..sync
        };
        assert_eq!(disabled.retry_backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TICKSTREAM_TEST_BROKERS", "kafka:29092");

        let input = r#"bootstrap_servers = "${TICKSTREAM_TEST_BROKERS}""#;
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(expanded, r#"bootstrap_servers = "kafka:29092""#);

        std::env::remove_var("TICKSTREAM_TEST_BROKERS");
    }

    #[test]
    fn test_env_var_in_comment_not_expanded() {
        let input = "url = \"http://localhost\" # ${TICKSTREAM_TEST_UNSET}\n# ${ALSO_UNSET}\n";
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(expanded, input);
    }

    #[test]
    fn test_hash_inside_string_is_not_a_comment() {
        std::env::set_var("TICKSTREAM_TEST_TOPIC", "events");

        let input = r#"produce_topic = "a#b-${TICKSTREAM_TEST_TOPIC}" # trailing"#;
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(expanded, r#"produce_topic = "a#b-events" # trailing"#);

        std::env::remove_var("TICKSTREAM_TEST_TOPIC");
    }

    #[test]
    fn test_escaped_quote_keeps_string_open() {
        let input = "name = \"say \\\"#hi\\\"\" # ${TICKSTREAM_TEST_UNSET}";
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(expanded, input);
    }

    #[test]
    fn test_multiline_basic_string_spans_lines() {
        std::env::set_var("TICKSTREAM_TEST_MULTILINE", "expanded");

        let input = "note = \"\"\"\nfirst\nsecond # not a comment ${TICKSTREAM_TEST_MULTILINE}\n\"\"\" # ${TICKSTREAM_TEST_UNSET}\n";
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(
            expanded,
            "note = \"\"\"\nfirst\nsecond # not a comment expanded\n\"\"\" # ${TICKSTREAM_TEST_UNSET}\n"
        );

        std::env::remove_var("TICKSTREAM_TEST_MULTILINE");
    }

    #[test]
    fn test_multiline_literal_string_spans_lines() {
        std::env::set_var("TICKSTREAM_TEST_LITERAL", "kept");

        let input = "pattern = '''\n^a\"b#c\n${TICKSTREAM_TEST_LITERAL}'''\n# ${TICKSTREAM_TEST_UNSET}\nx = 1";
        let expanded = expand_env_vars(input).unwrap();
        assert_eq!(
            expanded,
            "pattern = '''\n^a\"b#c\nkept'''\n# ${TICKSTREAM_TEST_UNSET}\nx = 1"
        );

        std::env::remove_var("TICKSTREAM_TEST_LITERAL");
    }

    #[test]
    fn test_env_var_missing_reports_line_after_multiline_string() {
        let input = "a = \"\"\"\none\ntwo\"\"\"\nb = \"${TICKSTREAM_TEST_DEFINITELY_UNSET}\"";
        let message = expand_env_vars(input).unwrap_err().to_string();
        assert!(message.contains("line 4"), "{message}");
    }

    #[test]
    fn test_env_var_missing() {
        let result = expand_env_vars("url = \"${TICKSTREAM_TEST_DEFINITELY_UNSET}\"");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("TICKSTREAM_TEST_DEFINITELY_UNSET"));
        assert!(message.contains("line 1"));
    }

    #[test]
    fn test_env_var_unclosed() {
        let result = expand_env_vars("url = \"${UNCLOSED\"");
        assert!(result.unwrap_err().to_string().contains("Unclosed"));
    }

    #[test]
    fn test_env_var_empty_name() {
        let result = expand_env_vars("url = \"${}\"");
        assert!(result.unwrap_err().to_string().contains("Empty"));
    }

    #[test]
    fn test_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[source]\nurl = \"http://localhost:8000\"\n[sync]\nenabled = false\n",
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.sync.enabled);
    }
}
