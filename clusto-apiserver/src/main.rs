// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::Parser;

use clusto_apiserver::{Config, config::Overrides};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file.
    ///
    /// Defaults to "/etc/clusto/clusto.toml" if that file exists.
    #[arg(long, env = "CLUSTOCONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // In Windows, we must request a virtual terminal environment to display colors correctly.
    // This enables support for the ANSI escape sequences used by `env_logger`.
    #[cfg(windows)]
    let _unused = colored::control::set_virtual_terminal(true);

    let Args { config, overrides } = Args::parse();
    let mut config = Config::load(config.as_deref())?;
    config.apply_overrides(overrides);

    let default_filter = if config.apiserver.debug {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    clusto_apiserver::run(config).await
}
