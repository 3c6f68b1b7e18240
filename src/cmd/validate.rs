//! `cachegate validate`: check a config file without starting the proxy.

use serde::Serialize;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::model::{CacheSettings, Config};
use crate::config::sources::file_source::FileSource;
use crate::config::validation;
use crate::error::{CacheGateError, ValidationError};

/// Machine-readable result for `--format json`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Report<'a> {
    Valid {
        valid: bool,
        upstream: &'a str,
        routes: usize,
        cached_routes: usize,
        cache: &'a CacheSettings,
    },
    Invalid {
        valid: bool,
        errors: &'a [ValidationError],
    },
}

impl<'a> Report<'a> {
    fn valid(config: &'a Config) -> Self {
        Self::Valid {
            valid: true,
            upstream: &config.upstream.base_url,
            routes: config.routes.len(),
            cached_routes: config.cached_routes(),
            cache: &config.cache,
        }
    }

    const fn invalid(errors: &'a [ValidationError]) -> Self {
        Self::Invalid {
            valid: false,
            errors,
        }
    }
}

fn print_json(report: &Report<'_>) -> Result<(), CacheGateError> {
    let json = serde_json::to_string(report).map_err(|e| CacheGateError::Io(e.into()))?;
    println!("{json}");
    Ok(())
}

pub fn execute(args: &ValidateArgs) -> Result<(), CacheGateError> {
    let path = &args.config;
    let source = FileSource::open(path)?;

    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CacheGateError::ConfigFileNotFound { path: path.clone() },
        _ => CacheGateError::Io(e),
    })?;
    let config = source.parse(&content)?;
    let display = path.display();

    match (validation::validate(&config), args.format) {
        (Ok(()), ValidateFormat::Text) => {
            let report = validation::format_validation_report(&display.to_string(), &config);
            println!("\u{2713} {report}");
            Ok(())
        }
        (Ok(()), ValidateFormat::Json) => print_json(&Report::valid(&config)),
        (Err(errors), format) => {
            if format == ValidateFormat::Json {
                print_json(&Report::invalid(&errors))?;
            } else {
                eprintln!("\u{2717} {display} has {} errors\n", errors.len());
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            Err(CacheGateError::ConfigValidation { errors })
        }
    }
}
