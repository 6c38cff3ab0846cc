//! Configuration assembly (§4.7, §6).
//!
//! Follows the teacher's `load_config()` shape (`riker::load_config`): a
//! [`config::Config`] builder layers a root file, included files, `-D`
//! property overrides and environment variables, and the result is handed
//! out through typed accessors rather than raw [`config::Value`] matching so
//! call sites read `cfg.get_duration("scheduler.tick")` instead of hand
//! unwrapping variants.

pub mod vault;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::ConfigError;
use vault::Vault;

/// A single `actors[]` entry (§3 "Configuration", §6 "Per-actor recognized keys").
#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub name: String,
    pub class: Option<String>,
    pub remote: Option<String>,
    pub optional: bool,
    pub read_from: Vec<String>,
    pub write_to: Vec<String>,
    /// Class-specific keys, kept as a typed sub-tree so actor implementations
    /// can pull out whatever they need without the kernel knowing their shape.
    pub properties: Configuration,
}

impl ActorConfig {
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawActorConfig {
    name: String,
    class: Option<String>,
    remote: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    read_from: ReadWriteField,
    #[serde(default)]
    write_to: ReadWriteField,
    #[serde(flatten)]
    properties: HashMap<String, config::Value>,
}

/// `read-from`/`write-to` accept either a single string or a list (§6).
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ReadWriteField {
    #[default]
    Absent,
    One(String),
    Many(Vec<String>),
}

impl ReadWriteField {
    fn into_vec(self) -> Vec<String> {
        match self {
            ReadWriteField::Absent => Vec::new(),
            ReadWriteField::One(s) => vec![s],
            ReadWriteField::Many(v) => v,
        }
    }
}

/// The root of a parsed universe configuration file (§6 "Recognized top-level keys").
#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub name: String,
    pub time_scale: f64,
    pub start_time: DateTime<Utc>,
    pub show_exceptions: bool,
    pub actors: Vec<ActorConfig>,
}

/// A typed read-only view over a parsed configuration (sub-)tree, resolving
/// `??key` vault references lazily at the point of access (§4.7).
#[derive(Debug, Clone)]
pub struct Configuration {
    inner: Config,
    vault: Vault,
}

impl Configuration {
    fn new(inner: Config, vault: Vault) -> Self {
        Configuration { inner, vault }
    }

    /// Resolves `key` to a string, applying both substitution mechanisms
    /// §4.7 describes: a whole-value `??key` vault reference first, then
    /// `${...}` placeholder expansion over whatever that produced (so a
    /// vaulted value may itself embed a placeholder, and a literal value may
    /// mix placeholders with ordinary text, e.g. `"http://${env:HOST}:8080"`).
    pub fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        let raw: String = self.inner.get(key)?;
        let vault_resolved = self.vault.resolve(&raw)?;
        self.vault.interpolate(&vault_resolved)
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        Ok(self.inner.get::<i64>(key)?)
    }

    pub fn get_float(&self, key: &str) -> Result<f64, ConfigError> {
        Ok(self.inner.get::<f64>(key)?)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.inner.get::<bool>(key)?)
    }

    pub fn get_duration(&self, key: &str) -> Result<Duration, ConfigError> {
        let millis: u64 = self.inner.get::<u64>(key)?;
        Ok(Duration::from_millis(millis))
    }

    /// `(lat, lon)` in decimal degrees.
    pub fn get_geo(&self, key: &str) -> Result<(f64, f64), ConfigError> {
        let lat = self.get_float(&format!("{key}.lat"))?;
        let lon = self.get_float(&format!("{key}.lon"))?;
        Ok((lat, lon))
    }

    pub fn get_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.inner.get::<Vec<String>>(key)?)
    }

    pub fn get_table(&self, key: &str) -> Result<Configuration, ConfigError> {
        let sub: Config = self
            .inner
            .get_table(key)?
            .into_iter()
            .fold(Config::builder(), |b, (k, v)| {
                b.set_override(k, v).unwrap_or_else(|_| Config::builder())
            })
            .build()?;
        Ok(Configuration::new(sub, self.vault.clone()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.get::<config::Value>(key).is_ok()
    }
}

/// Property overrides from `-D<key>=<value>` flags (§6).
pub type Overrides = Vec<(String, String)>;

/// Loads and resolves a universe configuration from one or more files,
/// applying includes, `-D` overrides and environment variables in that
/// precedence order (file < override < env), mirroring the teacher's layered
/// `cfg.merge(...)` pipeline.
pub fn load_universe(
    paths: &[impl AsRef<Path>],
    vault_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<UniverseConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("time-scale", 1.0)?
        .set_default("show-exceptions", false)?;

    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text = resolve_includes(&text, path)?;
        builder = builder.add_source(File::from_str(&text, FileFormat::Toml));
    }

    for (key, value) in overrides {
        builder = builder.set_override(key.as_str(), value.as_str())?;
    }

    builder = builder.add_source(Environment::with_prefix("RACE").separator("__"));

    let cfg = builder.build()?;
    let vault = match vault_path {
        Some(p) => Vault::load(p)?,
        None => Vault::empty(),
    };

    let name: String = cfg.get("name").unwrap_or_else(|_| "universe".to_string());
    let time_scale: f64 = cfg.get("time-scale")?;
    let show_exceptions: bool = cfg.get("show-exceptions")?;
    let start_time: DateTime<Utc> = cfg
        .get::<String>("start-time")
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let raw_actors: Vec<RawActorConfig> = cfg.get("actors").unwrap_or_default();
    let mut seen = std::collections::HashSet::new();
    let mut actors = Vec::with_capacity(raw_actors.len());

    for raw in raw_actors {
        if !seen.insert(raw.name.clone()) {
            return Err(ConfigError::DuplicateActorName(raw.name));
        }
        if raw.class.is_none() && raw.remote.is_none() {
            return Err(ConfigError::MissingClassOrRemote(raw.name));
        }

        let mut props_builder = Config::builder();
        for (k, v) in &raw.properties {
            props_builder = props_builder
                .set_override(k.as_str(), v.clone())
                .map_err(ConfigError::Parse)?;
        }
        let properties = Configuration::new(props_builder.build()?, vault.clone());

        actors.push(ActorConfig {
            name: raw.name,
            class: raw.class,
            remote: raw.remote,
            optional: raw.optional,
            read_from: raw.read_from.into_vec(),
            write_to: raw.write_to.into_vec(),
            properties,
        });
    }

    Ok(UniverseConfig {
        name,
        time_scale,
        start_time,
        show_exceptions,
        actors,
    })
}

/// Expands `include "path"` directives found at the top of a config file,
/// inlining the referenced file's text before the TOML parser ever sees it
/// (§4.7 "root configuration file referencing nested include files").
fn resolve_includes(text: &str, from: &Path) -> Result<String, ConfigError> {
    let base = from.parent().unwrap_or_else(|| Path::new("."));
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("include ") {
            let included = rest.trim().trim_matches('"');
            let included_path = base.join(included);
            let included_text =
                std::fs::read_to_string(&included_path).map_err(|source| ConfigError::Io {
                    path: included_path.display().to_string(),
                    source,
                })?;
            out.push_str(&resolve_includes(&included_text, &included_path)?);
            out.push('\n');
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Parses `-D<key>=<value>` flags from the driver command line (§6).
pub fn parse_property_override(flag: &str) -> Option<(String, String)> {
    let rest = flag.strip_prefix("-D")?;
    let (key, value) = rest.split_once('=')?;
    Some((key.to_string(), value.to_string()))
}
