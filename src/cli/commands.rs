use crate::dispatcher::{Dispatcher, HandlerRequest, HandlerResponse, HeaderVec};
use crate::middleware::{CorsConfig, CorsMiddleware};
use crate::middleware::cors::load_cors_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::{header, Method};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line interface for BRRTRouter CORS policies
///
/// Validates CORS configuration files and replays synthetic requests
/// against them.
#[derive(Parser)]
#[command(name = "brrtrouter-cors")]
#[command(about = "BRRTRouter CORS policy tool", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a CORS configuration file
    Validate {
        /// Path to the YAML configuration (bare or with a `cors:` section)
        #[arg(short, long, env = "BRRTR_CORS_CONFIG")]
        config: PathBuf,
    },
    /// Run one request through the CORS middleware and print the response
    Check {
        /// Path to the YAML configuration (bare or with a `cors:` section)
        #[arg(short, long, env = "BRRTR_CORS_CONFIG")]
        config: PathBuf,

        /// Value of the `Origin` request header
        #[arg(short, long)]
        origin: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path
        #[arg(short, long, default_value = "/")]
        path: String,

        /// Value of the `Host` request header
        #[arg(long)]
        host: Option<String>,

        /// Value of `Access-Control-Request-Method` (preflight)
        #[arg(long)]
        request_method: Option<String>,

        /// Value of `Access-Control-Request-Headers` (preflight)
        #[arg(long)]
        request_headers: Option<String>,
    },
}

/// Parse the process arguments and run the selected command
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid,
/// or if the method is not a valid HTTP method.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    execute(&cli.command, &mut stdout.lock())
}

/// Run `command`, writing the report to `out`
///
/// # Errors
///
/// See [`run_cli`].
pub fn execute(command: &Commands, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Validate { config } => {
            let cors = load_middleware(config)?;
            let matcher = cors.matcher();
            let (exact, wildcards, patterns, special) = matcher.rule_counts();
            writeln!(out, "✅ {} is a valid CORS configuration", config.display())?;
            writeln!(out, "strategy: {}", matcher.strategy_name())?;
            writeln!(
                out,
                "origins: {exact} exact, {wildcards} wildcard, {patterns} pattern, {special} special-scheme"
            )?;
            write_header_set(out, "normal headers", cors.normal_headers().iter())?;
            write_header_set(out, "preflight headers", cors.preflight_headers().iter())?;
            Ok(())
        }
        Commands::Check {
            config,
            origin,
            method,
            path,
            host,
            request_method,
            request_headers,
        } => {
            let cors = load_middleware(config)?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method '{method}'"))?;

            let mut req = HandlerRequest::new(method.clone(), path.as_str(), HeaderVec::new())
                .with_header(header::ORIGIN.as_str(), origin.as_str());
            if let Some(host) = host {
                req = req.with_header(header::HOST.as_str(), host.as_str());
            }
            if let Some(value) = request_method {
                req = req.with_header(
                    header::ACCESS_CONTROL_REQUEST_METHOD.as_str(),
                    value.as_str(),
                );
            }
            if let Some(value) = request_headers {
                req = req.with_header(
                    header::ACCESS_CONTROL_REQUEST_HEADERS.as_str(),
                    value.as_str(),
                );
            }

            let kind = cors.classify(&req);
            let mut dispatcher = Dispatcher::new();
            dispatcher.add_middleware(Arc::new(cors));
            dispatcher.add_route(method, path, |_req| HandlerResponse::status_only(200));
            let res = dispatcher.dispatch(&req);

            writeln!(out, "request: {} {} ({kind:?})", req.method, req.path)?;
            writeln!(out, "status: {}", res.status)?;
            write_header_set(
                out,
                "headers",
                res.headers.iter().map(|(k, v)| (k.as_ref(), v.as_str())),
            )?;
            Ok(())
        }
    }
}

fn load_middleware(path: &Path) -> Result<CorsMiddleware> {
    let config: CorsConfig = load_cors_config(path)?;
    CorsMiddleware::try_new(config)
        .with_context(|| format!("Invalid CORS configuration in {}", path.display()))
}

fn write_header_set<'a>(
    out: &mut dyn Write,
    title: &str,
    headers: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    writeln!(out, "{title}:")?;
    for (name, value) in headers {
        writeln!(out, "  {name}: {value}")?;
    }
    Ok(())
}
