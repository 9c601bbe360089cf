use crate::fabric::FabricConfig;
use crate::pool::WorkerConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Fabric Bench - a load-testing harness for pub/sub telemetry fabrics
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Fabric broker address
    #[clap(long, default_value = crate::defaults::FABRIC_ADDRESS)]
    pub fabric_address: String,

    /// Fabric broker STOMP port
    #[clap(long, default_value_t = crate::defaults::FABRIC_PORT)]
    pub fabric_port: u16,

    /// Broker username
    #[clap(long, default_value = "system")]
    pub username: String,

    /// Broker password
    #[clap(long, default_value = "manager")]
    pub password: String,

    /// Topic published to and subscribed from
    #[clap(long, default_value = crate::defaults::TOPIC)]
    pub topic: String,

    /// Initial number of subscriber workers
    #[clap(long, default_value_t = crate::defaults::NUM_SUBSCRIBERS)]
    pub num_subscribers: usize,

    /// Initial number of publisher connections
    #[clap(long, default_value_t = crate::defaults::NUM_PUBLISHERS)]
    pub num_publishers: usize,

    /// Initial messages per burst
    #[clap(long, default_value_t = crate::defaults::NUM_MESSAGES)]
    pub num_messages: usize,

    /// Initial sleep between burst messages, in seconds (> 0)
    #[clap(long, default_value_t = crate::defaults::SECONDS_BETWEEN_PUBLISHES, value_parser = parse_positive_f64)]
    pub seconds_between_publishes: f64,

    /// Background loop tick interval (e.g. "100ms", "1s")
    #[clap(long, default_value = "100ms", value_parser = parse_duration)]
    pub tick_interval: Duration,

    /// Subscriber worker executable
    #[clap(long, default_value = "subscriber-worker")]
    pub worker_command: PathBuf,

    /// Deadline for the worker readiness handshake
    #[clap(long, default_value = "5s", value_parser = parse_duration)]
    pub readiness_timeout: Duration,

    /// Pause between per-connection sends within one message's fan-out
    #[clap(long, default_value = "0ms", value_parser = parse_duration)]
    pub fanout_delay: Duration,

    /// Optional result sink: JSON-lines snapshots appended per `results`
    #[clap(long)]
    pub results_file: Option<PathBuf>,
}

/// Internal configuration derived from parsed CLI arguments.
#[derive(Debug, Clone)]
pub struct HarnessConfiguration {
    pub fabric: FabricConfig,
    pub topic: String,
    pub initial_settings: crate::state::Settings,
    pub tick_interval: Duration,
    pub worker_command: PathBuf,
    pub readiness_timeout: Duration,
    pub fanout_delay: Duration,
    pub results_file: Option<PathBuf>,
}

impl From<&Args> for HarnessConfiguration {
    fn from(args: &Args) -> Self {
        Self {
            fabric: FabricConfig {
                address: args.fabric_address.clone(),
                port: args.fabric_port,
                username: args.username.clone(),
                password: args.password.clone(),
            },
            topic: args.topic.clone(),
            initial_settings: crate::state::Settings {
                num_subscribers: args.num_subscribers,
                num_publishers: args.num_publishers,
                num_messages: args.num_messages,
                seconds_between_publishes: args.seconds_between_publishes,
            },
            tick_interval: args.tick_interval,
            worker_command: args.worker_command.clone(),
            readiness_timeout: args.readiness_timeout,
            fanout_delay: args.fanout_delay,
            results_file: args.results_file.clone(),
        }
    }
}

impl HarnessConfiguration {
    /// Worker invocation parameters for the pool manager.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            command: self.worker_command.clone(),
            fabric_address: self.fabric.address.clone(),
            fabric_port: self.fabric.port,
            username: self.fabric.username.clone(),
            password: self.fabric.password.clone(),
            topic: self.topic.clone(),
            readiness_timeout: self.readiness_timeout,
        }
    }
}

/// Parse a duration from a human-readable string (e.g. "500ms", "10s", "5m").
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        // Bare numbers default to seconds
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number in duration: {:?}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err("duration must be a non-negative finite number".to_string());
    }

    let duration = match unit {
        "ms" => Duration::from_secs_f64(num / 1000.0),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => unreachable!(),
    };
    Ok(duration)
}

/// Parse a strictly positive float (validated on the argument token only).
pub fn parse_positive_f64(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid decimal value: {:?}", s))?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err("value must be a positive finite number".to_string())
    }
}
