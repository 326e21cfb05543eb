use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_policy;
use crate::errors::PolicyError;
use crate::model::{PolicySource, TourPolicy};

const ENV_PREFIX: &str = "TOURGUIDE_POLICY__";
const ENV_JSON: &str = "TOURGUIDE_POLICY_OVERRIDE_JSON";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    /// `path=value` pairs given on the command line; applied last.
    pub cli_overrides: Vec<(String, String)>,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
            cli_overrides: Vec::new(),
        }
    }
}

pub fn load_policy(path: Option<&Path>) -> Result<TourPolicy, PolicyError> {
    let mut options = LoadOptions::default();
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    options.include_env = true;
    load_policy_with_options(&options)
}

pub fn load_policy_with_options(options: &LoadOptions) -> Result<TourPolicy, PolicyError> {
    let mut policy = default_policy();
    bootstrap_builtin_provenance(&mut policy)?;

    for path in &options.paths {
        if path.exists() {
            let overlays = overlays_from_file(path)?;
            apply_overlays(&mut policy, overlays)?;
        } else {
            debug!(path = %path.display(), "policy file missing, keeping defaults");
        }
    }

    if options.include_env {
        let env_overlays = overlays_from_env()?;
        apply_overlays(&mut policy, env_overlays)?;
    }

    let cli_overlays = options
        .cli_overrides
        .iter()
        .map(|(path, raw)| PolicyOverlay {
            path: path.trim().to_ascii_lowercase(),
            value: parse_env_value(raw.trim()),
            source: PolicySource::Cli,
        })
        .collect();
    apply_overlays(&mut policy, cli_overlays)?;

    Ok(policy)
}

struct PolicyOverlay {
    path: String,
    value: Value,
    source: PolicySource,
}

fn apply_overlays(policy: &mut TourPolicy, overlays: Vec<PolicyOverlay>) -> Result<(), PolicyError> {
    for overlay in overlays {
        apply_override(policy, &overlay.path, &overlay.value, overlay.source)?;
    }
    Ok(())
}

/// Writes one leaf of the policy and records where it came from.
pub(crate) fn apply_override(
    policy: &mut TourPolicy,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    match path {
        "rev" => policy.rev = to_u64(value)?,
        "pre_render.interval_ms" => policy.pre_render.interval_ms = to_u64(value)?,
        "pre_render.route_mismatch_ticks" => {
            policy.pre_render.route_mismatch_ticks = to_u32(value)?
        }
        "pre_render.element_missing_ticks" => {
            policy.pre_render.element_missing_ticks = to_u32(value)?
        }
        "post_render.interval_ms" => policy.post_render.interval_ms = to_u64(value)?,
        "post_render.missing_ticks" => policy.post_render.missing_ticks = to_u32(value)?,
        "observer.position_poll_ms" => policy.observer.position_poll_ms = to_u64(value)?,
        "observer.debounce_ms" => policy.observer.debounce_ms = to_u64(value)?,
        "cache.ttl_ms" => policy.cache.ttl_ms = to_u64(value)?,
        "cache.capacity" => policy.cache.capacity = to_usize(value)?,
        "selector.max_suffixes" => policy.selector.max_suffixes = to_usize(value)?,
        "selector.max_class_fragments" => {
            policy.selector.max_class_fragments = to_usize(value)?
        }
        path => return Err(PolicyError::UnsupportedPath(path.to_string())),
    }
    policy.set_provenance(path, source);
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<PolicyOverlay>, PolicyError> {
    let content = fs::read_to_string(path).map_err(|err| PolicyError::Io(format!("{}", err)))?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
    Ok(flatten_value(json_value, None, PolicySource::File))
}

fn overlays_from_env() -> Result<Vec<PolicyOverlay>, PolicyError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(PolicyOverlay {
                path,
                value: parse_env_value(&raw),
                source: PolicySource::Env,
            });
        }
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
            overlays.extend(flatten_value(json_value, None, PolicySource::Env));
        }
    }

    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>, source: PolicySource) -> Vec<PolicyOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix), source));
            }
            result
        }
        other => match prefix {
            Some(prefix) => vec![PolicyOverlay {
                path: prefix,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}

fn bootstrap_builtin_provenance(policy: &mut TourPolicy) -> Result<(), PolicyError> {
    let sections = [
        ("pre_render", serde_json::to_value(&policy.pre_render)),
        ("post_render", serde_json::to_value(&policy.post_render)),
        ("observer", serde_json::to_value(&policy.observer)),
        ("cache", serde_json::to_value(&policy.cache)),
        ("selector", serde_json::to_value(&policy.selector)),
    ];
    let mut overlays = Vec::new();
    for (name, value) in sections {
        let value = value.map_err(|err| PolicyError::Invalid(format!("{}", err)))?;
        overlays.extend(flatten_value(value, Some(name.into()), PolicySource::Builtin));
    }
    for overlay in overlays {
        policy.set_provenance(&overlay.path, overlay.source);
    }
    Ok(())
}

fn to_u64(value: &Value) -> Result<u64, PolicyError> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|raw| raw.parse().ok()))
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected integer, got {value}")))
}

fn to_u32(value: &Value) -> Result<u32, PolicyError> {
    let wide = to_u64(value)?;
    u32::try_from(wide).map_err(|_| PolicyError::InvalidValue(format!("value {wide} exceeds u32")))
}

fn to_usize(value: &Value) -> Result<usize, PolicyError> {
    let wide = to_u64(value)?;
    usize::try_from(wide)
        .map_err(|_| PolicyError::InvalidValue(format!("value {wide} exceeds usize")))
}
