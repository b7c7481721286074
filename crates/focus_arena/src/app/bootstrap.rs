use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use typing_engine::{ChallengeError, ConfigError, EngineConfig, LoopConfig};

use crate::arena::{
    load_target_defs, parse_target_defs, ArenaScene, ArenaSettings, ContentError,
    DEFAULT_TARGETS_XML,
};

const CONFIG_ENV_VAR: &str = "FOCUS_ARENA_CONFIG";
const CONTENT_ENV_VAR: &str = "FOCUS_ARENA_CONTENT";
const REALTIME_ENV_VAR: &str = "FOCUS_ARENA_REALTIME";
const SUMMARY_ENV_VAR: &str = "FOCUS_ARENA_SUMMARY";
const TYPIST_CPS_ENV_VAR: &str = "FOCUS_ARENA_TYPIST_CPS";
const MAX_TICKS_ENV_VAR: &str = "FOCUS_ARENA_MAX_TICKS";
const BUILT_IN_CONTENT_NAME: &str = "built-in";

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("content '{source_name}' defines no targets")]
    NoTargets { source_name: String },
    #[error("failed to spawn target: {0}")]
    Spawn(#[from] ChallengeError),
    #[error("failed to encode run summary: {0}")]
    EncodeSummary(#[from] serde_json::Error),
    #[error("failed to write run summary {path:?}: {source}")]
    WriteSummary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) scene: ArenaScene,
    pub(crate) summary_path: Option<PathBuf>,
}

/// Startup knobs read from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
struct ArenaEnv {
    config_path: Option<PathBuf>,
    content_path: Option<PathBuf>,
    realtime: bool,
    summary_path: Option<PathBuf>,
    typist_chars_per_second: Option<f64>,
    max_ticks: Option<u64>,
}

impl ArenaEnv {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from)
        };
        let typist_chars_per_second = lookup(TYPIST_CPS_ENV_VAR).and_then(|value| {
            match value.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() && parsed > 0.0 => Some(parsed),
                _ => {
                    warn!(
                        env_var = TYPIST_CPS_ENV_VAR,
                        value = value.as_str(),
                        "invalid typist speed; falling back to default"
                    );
                    None
                }
            }
        });
        let max_ticks = lookup(MAX_TICKS_ENV_VAR).and_then(|value| {
            match value.trim().parse::<u64>() {
                Ok(parsed) if parsed > 0 => Some(parsed),
                _ => {
                    warn!(
                        env_var = MAX_TICKS_ENV_VAR,
                        value = value.as_str(),
                        "invalid tick limit; falling back to default"
                    );
                    None
                }
            }
        });

        Self {
            config_path: path(CONFIG_ENV_VAR),
            content_path: path(CONTENT_ENV_VAR),
            realtime: parse_enabled_flag(lookup(REALTIME_ENV_VAR).as_deref()),
            summary_path: path(SUMMARY_ENV_VAR),
            typist_chars_per_second,
            max_ticks,
        }
    }
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Focus Arena Startup ===");

    let env = ArenaEnv::from_lookup(|key| std::env::var(key).ok());
    build_app_from(&env)
}

fn build_app_from(env: &ArenaEnv) -> Result<AppWiring, AppError> {
    let config = match &env.config_path {
        Some(path) => EngineConfig::load_from_path(path)?,
        None => EngineConfig::default(),
    };

    let (source_name, defs) = match &env.content_path {
        Some(path) => (path.display().to_string(), load_target_defs(path)?),
        None => (
            BUILT_IN_CONTENT_NAME.to_string(),
            parse_target_defs(BUILT_IN_CONTENT_NAME, DEFAULT_TARGETS_XML)?,
        ),
    };
    if defs.is_empty() {
        return Err(AppError::NoTargets { source_name });
    }

    let defaults = ArenaSettings::default();
    let settings = ArenaSettings {
        typist_chars_per_second: env
            .typist_chars_per_second
            .unwrap_or(defaults.typist_chars_per_second),
        ..defaults
    };
    let scene = ArenaScene::new(config, &defs, settings)?;

    let loop_defaults = LoopConfig::default();
    let loop_config = LoopConfig {
        realtime: env.realtime,
        max_ticks: env.max_ticks.or(loop_defaults.max_ticks),
        ..loop_defaults
    };
    info!(
        content = source_name.as_str(),
        targets = defs.len(),
        realtime = loop_config.realtime,
        typist_cps = settings.typist_chars_per_second,
        "arena_wiring"
    );

    Ok(AppWiring {
        loop_config,
        scene,
        summary_path: env.summary_path.clone(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_enabled_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1"))
}
