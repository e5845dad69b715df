//! Policy loading for the CLI.
//!
//! Layers, later wins:
//! 1. [`KernelPolicy::default()`]
//! 2. a TOML file: `--policy <path>`, else `<config_dir>/agora/policy.toml` if present
//! 3. environment variables `AGORA__<SECTION>__<FIELD>`, e.g.
//!    `AGORA__CONCENTRATION__GINI_THRESHOLD=0.5`
//!
//! The merged policy is validated before any engine sees it.

use std::path::{Path, PathBuf};

use agora_core::KernelPolicy;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};

pub const ENV_PREFIX: &str = "AGORA";
const ENV_SEPARATOR: &str = "__";

/// `<config_dir>/agora/policy.toml`, when the platform has a config dir.
pub fn default_policy_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("agora").join("policy.toml"))
}

/// Load the policy from the process environment and the given or default file.
pub fn load_policy(explicit: Option<&Path>) -> Result<KernelPolicy> {
    build(explicit, default_policy_path(), None)
}

/// Build the layered policy. `env` replaces the process environment when set.
fn build(
    explicit: Option<&Path>,
    fallback: Option<PathBuf>,
    env: Option<Map<String, String>>,
) -> Result<KernelPolicy> {
    let defaults = Config::try_from(&KernelPolicy::default()).context("Failed to encode default policy")?;
    let mut builder = Config::builder().add_source(defaults);

    match (explicit, fallback) {
        (Some(path), _) => {
            tracing::debug!(path = %path.display(), "loading policy file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        (None, Some(path)) if path.exists() => {
            tracing::debug!(path = %path.display(), "loading default policy file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        _ => {}
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );

    let policy: KernelPolicy = builder
        .build()
        .context("Failed to read policy")?
        .try_deserialize()
        .context("Failed to parse policy")?;
    policy.validate().context("Invalid policy")?;
    Ok(policy)
}
