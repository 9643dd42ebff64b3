pub mod interfaces;
pub mod probes;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use garimpo_dispatcher::Dispatcher;
use garimpo_lib::PipelineConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interfaces::HostResult;

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_concurrency_limit() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

#[derive(Default, Clone, Serialize, Deserialize, Debug, Parser)]
#[command(
    name = "garimpo",
    about = "The garimpo investigation host",
    long_about = None
)]
#[serde(default)]
pub struct Opts {
    #[arg(long, require_equals = true, default_value = "0.0.0.0:8080")]
    #[serde(default = "default_address")]
    /// Server bind address
    /// [default: 0.0.0.0:8080]
    pub address: String,

    #[arg(long, require_equals = true, default_value = "16")]
    #[serde(default = "default_concurrency_limit")]
    /// Limit the max number of in-flight launch requests
    pub concurrency_limit: usize,

    #[arg(long, require_equals = true)]
    /// Directory for rolling log files; logs go to stdout when unset
    pub log_path: Option<PathBuf>,

    #[arg(long, require_equals = true)]
    /// Path to a JSON config file with pipeline settings. Command line
    /// options override its contents
    pub config_path: Option<PathBuf>,

    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    /// Set the log level
    pub log_level: String,

    #[arg(long, require_equals = true, default_value = "redis://localhost:6379")]
    #[serde(default = "default_redis_url")]
    /// URL of the redis backing store
    pub redis_url: String,

    #[arg(long)]
    /// Use the in-process memory backend instead of redis (demos and tests)
    pub in_memory: bool,

    #[arg(skip)]
    #[serde(flatten)]
    /// Pipeline tuning; configured through the config file only
    pub pipeline: PipelineConfig,
}

impl Opts {
    /// Read the options from the config file and merge them with the current
    /// options; command line values win, pipeline settings come from the
    /// file.
    pub fn merge_from_file(&mut self) -> HostResult<()> {
        let Some(config_path) = &self.config_path else {
            return Ok(());
        };
        let file = std::fs::File::open(config_path)?;
        let reader = std::io::BufReader::new(file);
        let mut config: Value = serde_json::from_reader(reader)?;
        let mut this = serde_json::to_value(&self)?;

        // The command line cannot set pipeline knobs, so their serialized
        // values are always defaults; drop them so the file's settings win.
        if let (Value::Object(this), Value::Object(defaults)) = (
            &mut this,
            serde_json::to_value(PipelineConfig::default())?,
        ) {
            for key in defaults.keys() {
                this.remove(key);
            }
        }
        merge(&mut config, &this);

        *self = serde_json::from_value(config)?;
        Ok(())
    }
}

/// Merges two json's together, overwriting `a` with the values of `b`
fn merge(a: &mut Value, b: &Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (a, b) if !b.is_null() => *a = b.clone(),
        // If b is null, just keep a (which means do nothing).
        _ => {}
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub opts: Arc<Opts>,
}
