// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Global subscriber setup.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

type FormatLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Initialize tracing with the given format and optional global level.
///
/// # Example
///
/// ```no_run
/// use sslctx_observability::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Compact, Some("info")).unwrap();
/// tracing::info!("Proxy starting");
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    if let Some(level) = level {
        config = config.with_level(level);
    }
    init_tracing_with_config(&config)
}

/// Initialize tracing from a full configuration.
///
/// Fails with [`LogError::AlreadyInitialized`] if a global subscriber has
/// already been installed.
pub fn init_tracing_with_config(config: &LogConfig) -> Result<(), LogError> {
    let env_filter = build_env_filter(config)?;

    Registry::default()
        .with(env_filter)
        .with(format_layer(config))
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

fn format_layer(config: &LogConfig) -> FormatLayer {
    let base = fmt::layer()
        .with_writer(writer(config.output))
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids);

    match (config.format, config.use_timestamps) {
        (LogFormat::Pretty, true) => base
            .pretty()
            .with_ansi(config.use_color)
            .with_span_events(FmtSpan::ACTIVE)
            .boxed(),
        (LogFormat::Pretty, false) => base
            .pretty()
            .without_time()
            .with_ansi(config.use_color)
            .with_span_events(FmtSpan::ACTIVE)
            .boxed(),
        (LogFormat::Compact, true) => base
            .compact()
            .with_ansi(config.use_color)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        (LogFormat::Compact, false) => base
            .compact()
            .without_time()
            .with_ansi(config.use_color)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        (LogFormat::Json, true) => base
            .json()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        (LogFormat::Json, false) => base
            .json()
            .without_time()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    }
}

fn writer(output: LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let directives = config.filter_directives();

    EnvFilter::try_new(&directives).map_err(|e| LogError::InvalidFilter {
        directive: directives.clone(),
        reason: e.to_string(),
    })
}
