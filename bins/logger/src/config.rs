use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser};
use serde::Deserialize;

use bridge_api::DeliveryQos;
use pipeline::{BackoffPolicy, SessionConfig};
use storage_file::{LogFileNaming, PayloadDecoding, RotationPolicy};
use transport_mqtt::{MAX_PACKET_SIZE, MqttConfig};

use crate::error::LoggerError;

#[derive(Parser)]
#[command(
    name = "mqtt-logger",
    about = "Log every MQTT message to sequentially numbered files"
)]
pub struct Cli {
    #[command(flatten)]
    pub args: RunArgs,
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Path to the TOML config file (optional)
    #[arg(long, default_value = "mqtt-logger.toml", env = "MQTT_LOGGER_CONFIG")]
    pub config: String,

    /// Broker host
    #[arg(long, env = "MQTT_LOGGER_HOST")]
    pub host: Option<String>,

    /// Broker port
    #[arg(long, env = "MQTT_LOGGER_PORT")]
    pub port: Option<u16>,

    /// MQTT client id (default: mqtt-logger-<pid>)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Keepalive interval in seconds
    #[arg(long)]
    pub keepalive: Option<u64>,

    /// Subscription QoS level (0, 1 or 2)
    #[arg(long)]
    pub qos: Option<u8>,

    /// Directory for log files
    #[arg(long, env = "MQTT_LOGGER_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Records buffered between network and disk before the oldest are dropped
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// First reconnect delay in milliseconds
    #[arg(long)]
    pub backoff_initial_ms: Option<u64>,

    /// Reconnect delay ceiling in milliseconds
    #[arg(long)]
    pub backoff_max_ms: Option<u64>,

    /// Consecutive failed connects before exiting (0 = retry forever)
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub keepalive_secs: Option<u64>,
    pub qos: Option<u8>,
    pub log_dir: Option<String>,
    pub file_prefix: Option<String>,
    pub file_suffix: Option<String>,
    pub queue_capacity: Option<usize>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub disconnect_timeout_secs: Option<u64>,
    pub rotate_max_bytes: Option<u64>,
    pub rotate_max_age_secs: Option<u64>,
    pub payload_decoding: Option<PayloadDecoding>,
    pub write_retry_delay_ms: Option<u64>,
    pub request_capacity: Option<usize>,
    pub max_packet_size: Option<usize>,
    pub stable_after_secs: Option<u64>,
}

impl FileConfig {
    /// Load the file; a file that does not exist yields the defaults.
    pub fn load(path: &str) -> Result<Self, LoggerError> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LoggerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| LoggerError::Config {
            context: "parse",
            detail: format!("'{path}': {e}"),
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration: defaults < config file < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub mqtt: MqttConfig,
    pub session: SessionConfig,
    pub naming: LogFileNaming,
    pub rotation: RotationPolicy,
    pub queue_capacity: usize,
    pub decoding: PayloadDecoding,
    pub write_retry_delay: Duration,
}

impl Effective {
    pub fn new(args: &RunArgs) -> Result<Self, LoggerError> {
        let cfg = FileConfig::load(&args.config)?;
        Self::merge(args, cfg)
    }

    pub fn merge(args: &RunArgs, cfg: FileConfig) -> Result<Self, LoggerError> {
        let invalid = |detail: String| LoggerError::Config { context: "validate", detail };

        let qos_level = args.qos.or(cfg.qos).unwrap_or(0);
        let qos = DeliveryQos::from_level(qos_level)
            .ok_or_else(|| invalid(format!("qos must be 0, 1 or 2, got {qos_level}")))?;

        let keepalive = args.keepalive.or(cfg.keepalive_secs).unwrap_or(60);
        if keepalive < 5 {
            return Err(invalid(format!("keepalive must be at least 5 seconds, got {keepalive}")));
        }

        let client_id = args
            .client_id
            .clone()
            .or(cfg.client_id)
            .unwrap_or_else(|| format!("mqtt-logger-{}", std::process::id()));
        if client_id.is_empty() || client_id.starts_with(char::is_whitespace) {
            return Err(invalid(format!("invalid client id '{client_id}'")));
        }

        let queue_capacity = args.queue_capacity.or(cfg.queue_capacity).unwrap_or(1024);
        if queue_capacity == 0 {
            return Err(invalid("queue capacity must be positive".into()));
        }

        let max_packet_size = cfg.max_packet_size.unwrap_or(MAX_PACKET_SIZE);
        if max_packet_size == 0 {
            return Err(invalid("max packet size must be positive".into()));
        }

        let mqtt = MqttConfig {
            host: args.host.clone().or(cfg.host).unwrap_or_else(|| "localhost".into()),
            port: args.port.or(cfg.port).unwrap_or(1883),
            client_id,
            keepalive: Duration::from_secs(keepalive),
            qos,
            request_capacity: cfg.request_capacity.unwrap_or(10),
            max_packet_size,
        };

        let initial_ms = args.backoff_initial_ms.or(cfg.backoff_initial_ms).unwrap_or(500);
        let max_ms = args.backoff_max_ms.or(cfg.backoff_max_ms).unwrap_or(30_000);
        let session = SessionConfig {
            backoff: BackoffPolicy {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
            },
            max_attempts: args.max_attempts.or(cfg.max_attempts).unwrap_or(10),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.unwrap_or(10)),
            disconnect_timeout: Duration::from_secs(cfg.disconnect_timeout_secs.unwrap_or(5)),
            stable_after: Duration::from_secs(cfg.stable_after_secs.unwrap_or(30)),
        };
        session.validate().map_err(|e| invalid(e.to_string()))?;

        let defaults = LogFileNaming::default();
        let naming = LogFileNaming {
            dir: args.log_dir.clone().or(cfg.log_dir).map(Into::into).unwrap_or(defaults.dir),
            prefix: cfg.file_prefix.unwrap_or(defaults.prefix),
            suffix: cfg.file_suffix.unwrap_or(defaults.suffix),
            width: defaults.width,
        };

        Ok(Self {
            mqtt,
            session,
            naming,
            rotation: RotationPolicy {
                max_bytes: cfg.rotate_max_bytes,
                max_age: cfg.rotate_max_age_secs.map(Duration::from_secs),
            },
            queue_capacity,
            decoding: cfg.payload_decoding.unwrap_or_default(),
            write_retry_delay: Duration::from_millis(cfg.write_retry_delay_ms.unwrap_or(100)),
        })
    }
}
