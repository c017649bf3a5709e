//! Service configuration schema and the store that loads, mutates and saves it

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Default configuration file name, looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "ms_configuration.yml";

/// Services keyed by name, in configuration order
pub type Registry = IndexMap<String, ServiceSpec>;

/// One entry of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name (the mapping key, filled in after load)
    #[serde(skip)]
    pub name: String,

    /// Directory holding the service's startup artifacts, relative to the base directory
    pub path: String,

    /// Port serving the health endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Services that must be reachable before this one starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,

    /// Whether the service takes part in a run (absent means enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Keys this tool does not interpret, carried through to the saved file
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl ServiceSpec {
    /// Create a spec with just a path, as used by tests and tooling
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            port: None,
            dependencies: None,
            enabled: None,
            extra: serde_yaml::Mapping::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Dependency names in declaration order
    pub fn dependencies(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or(&[])
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Where the configuration lives.
///
/// The store never touches a global path; callers hand it a source, which lets
/// tests swap the file for an in-memory double.
pub trait ConfigSource {
    /// Read the raw document. Must return [`ConfigError::NotFound`] when the
    /// source does not exist.
    fn read(&self) -> Result<String, ConfigError>;

    /// Replace the raw document
    fn write(&self, contents: &str) -> Result<(), ConfigError>;

    /// Human readable location, used in log messages
    fn describe(&self) -> String;
}

/// Configuration stored in a YAML file on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn read(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(self.describe())
            } else {
                ConfigError::Io {
                    path: self.describe(),
                    source: e,
                }
            }
        })
    }

    fn write(&self, contents: &str) -> Result<(), ConfigError> {
        std::fs::write(&self.path, contents).map_err(|e| ConfigError::Io {
            path: self.describe(),
            source: e,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Loaded service configuration bound to the source it came from
pub struct ConfigStore<S: ConfigSource = FileSource> {
    source: S,
    services: Registry,
}

impl<S: ConfigSource> ConfigStore<S> {
    /// Load services from `source`
    pub fn load(source: S) -> Result<Self, ConfigError> {
        let content = source.read()?;
        let services = parse_services(&content)?;
        Ok(Self { source, services })
    }

    /// Load services, falling back to an empty set when the source is missing.
    ///
    /// Parse and I/O errors are still returned.
    pub fn load_or_empty(source: S) -> Result<Self, ConfigError> {
        match source.read() {
            Ok(content) => {
                let services = parse_services(&content)?;
                Ok(Self { source, services })
            }
            Err(ConfigError::NotFound(location)) => {
                log::warn!("Configuration not found: {}", location);
                Ok(Self::empty(source))
            }
            Err(e) => Err(e),
        }
    }

    /// A store with no services
    pub fn empty(source: S) -> Self {
        Self {
            source,
            services: Registry::new(),
        }
    }

    /// Set `enabled` on every named service that exists.
    ///
    /// Returns the names that did not match any service.
    pub fn set_enabled<N: AsRef<str>>(&mut self, names: &[N], value: bool) -> Vec<String> {
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.services.get_mut(name) {
                Some(spec) => spec.enabled = Some(value),
                None => unknown.push(name.to_string()),
            }
        }
        unknown
    }

    /// Apply a disable list and then an enable list; a name in both ends up enabled
    pub fn apply<N: AsRef<str>>(&mut self, disable: &[N], enable: &[N]) -> Vec<String> {
        let mut unknown = self.set_enabled(disable, false);
        unknown.extend(self.set_enabled(enable, true));
        unknown
    }

    /// Write the current services back to the source they were loaded from.
    ///
    /// Values and service order are kept, but not the original layout: keys
    /// of each service are written in schema order (`path`, `port`,
    /// `dependencies`, `enabled`, then unknown keys) and flow collections
    /// become block collections. Comments are lost.
    pub fn persist(&self) -> Result<(), ConfigError> {
        self.persist_to(&self.source)
    }

    /// Write the current services to another source
    pub fn persist_to<D: ConfigSource + ?Sized>(&self, destination: &D) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(&self.services)?;
        destination.write(&content)?;
        log::info!(
            "Saved {} services to {}",
            self.services.len(),
            destination.describe()
        );
        Ok(())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn registry(&self) -> &Registry {
        &self.services
    }

    /// Freeze the services for a run
    pub fn into_registry(self) -> Arc<Registry> {
        Arc::new(self.services)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Parse a YAML document into a registry, naming each spec after its key
pub fn parse_services(content: &str) -> Result<Registry, ConfigError> {
    // An empty file is an empty configuration
    if content.trim().is_empty() {
        return Ok(Registry::new());
    }

    let mut services: Registry = serde_yaml::from_str(content)?;
    for (name, spec) in services.iter_mut() {
        spec.name = name.clone();
    }
    Ok(services)
}

/// Errors that can occur when loading or saving the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration not found: {0}")]
    NotFound(String),

    #[error("Failed to access configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}
