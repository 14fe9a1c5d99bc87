use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use eyre::OptionExt;
use figment::{
    Figment,
    providers::{Format, Toml},
};
use nexum_apdu_reader::{Reader, protocols};
use serde::{Deserialize, Serialize};

/// Parameter value as written in TOML; switches may be booleans
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ParameterValue {
    Flag(bool),
    Number(u64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("1"),
            Self::Flag(false) => f.write_str("0"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ReaderConfig {
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default)]
    pub protocols: Vec<String>,
}

impl ReaderConfig {
    /// Push every entry through the reader's validated setters
    ///
    /// With no protocol configured the generic contact protocol is enabled.
    pub fn apply(&self, reader: &Reader) -> eyre::Result<()> {
        for (name, value) in &self.parameters {
            reader.set_parameter(name, &value.to_string())?;
        }
        if self.protocols.is_empty() {
            reader.activate_protocol(protocols::ISO_7816_3)?;
        }
        for protocol in &self.protocols {
            reader.activate_protocol(protocol)?;
        }
        Ok(())
    }
}

/// Returns the base config directory for nexum.
pub fn config_dir() -> eyre::Result<PathBuf> {
    Ok(std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".nxm"))
}

/// Load the reader configuration from `path`, or from `~/.nxm/reader.toml`.
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> eyre::Result<ReaderConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("reader.toml"),
    };
    extract(Figment::new().merge(Toml::file(path)))
}

fn extract(figment: Figment) -> eyre::Result<ReaderConfig> {
    Ok(figment.extract()?)
}
