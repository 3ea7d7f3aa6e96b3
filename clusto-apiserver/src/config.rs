// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Configuration file.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use serde::Deserialize;

use crate::{App, Mounts, server::ROOT_PATHS};

/// Read if no configuration file is given explicitly.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/clusto/clusto.toml";

pub const DEFAULT_DB_FILE: &str = "clusto.db";

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const DEFAULT_PORT: u16 = 9664;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseSettings,
    pub apiserver: ApiServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub file: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            file: DEFAULT_DB_FILE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Disables request logging.
    pub quiet: bool,
    /// Application names by mount point.
    pub apps: BTreeMap<String, String>,
}

impl Default for ApiServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            debug: false,
            quiet: false,
            apps: App::ALL
                .into_iter()
                .map(|app| (format!("/{app}"), app.name().to_owned()))
                .collect(),
        }
    }
}

impl ApiServerSettings {
    /// Resolves the configured applications.
    ///
    /// Trailing slashes of mount points are ignored.
    pub fn mounts(&self) -> anyhow::Result<Mounts> {
        let mut mounts = Mounts::new();
        for (mount_point, name) in &self.apps {
            let Some(app) = App::from_name(name) else {
                bail!("Unknown application \"{name}\" at mount point \"{mount_point}\"");
            };
            let prefix = normalize_mount_point(mount_point)?;
            if mounts.insert(prefix, app).is_some() {
                bail!("Duplicate mount point \"{mount_point}\"");
            }
        }
        Ok(mounts)
    }
}

fn normalize_mount_point(mount_point: &str) -> anyhow::Result<String> {
    let prefix = mount_point.trim_end_matches('/');
    if prefix.is_empty() {
        bail!("Cannot mount an application at the root");
    }
    if !prefix.starts_with('/') {
        bail!("Mount point \"{mount_point}\" does not start with a slash");
    }
    if prefix.contains(['{', '}', '*']) {
        bail!("Invalid characters in mount point \"{mount_point}\"");
    }
    if ROOT_PATHS.contains(&prefix) {
        bail!("Mount point \"{mount_point}\" is reserved");
    }
    Ok(prefix.to_owned())
}

/// Command line settings that take precedence over the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args)]
pub struct Overrides {
    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite database file.
    #[arg(long)]
    pub db_file: Option<PathBuf>,

    /// Log debug messages.
    #[arg(long)]
    pub debug: bool,

    /// Do not log requests.
    #[arg(long)]
    pub quiet: bool,
}

impl Config {
    /// Applies command line settings.
    ///
    /// Flags can only enable `debug` and `quiet`, not disable them.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        let Overrides {
            host,
            port,
            db_file,
            debug,
            quiet,
        } = overrides;
        if let Some(host) = host {
            self.apiserver.host = host;
        }
        if let Some(port) = port {
            self.apiserver.port = port;
        }
        if let Some(db_file) = db_file {
            self.database.file = db_file;
        }
        self.apiserver.debug |= debug;
        self.apiserver.quiet |= quiet;
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).map_err(Into::into)
    }

    /// Loads the configuration from a file.
    ///
    /// Without an explicit path the default file is read, if it exists.
    pub fn load(file_path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(file_path) = file_path {
            return Self::read(file_path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if !default_path.exists() {
            log::debug!("Config file \"{DEFAULT_CONFIG_FILE}\" not found, using defaults");
            return Ok(Self::default());
        }
        Self::read(default_path)
    }

    fn read(file_path: &Path) -> anyhow::Result<Self> {
        let input = fs::read_to_string(file_path).with_context(|| {
            format!(
                "Failed to read config file \"{file_path}\"",
                file_path = file_path.display()
            )
        })?;
        Self::parse(&input).with_context(|| {
            format!(
                "Invalid config file \"{file_path}\"",
                file_path = file_path.display()
            )
        })
    }
}
