//! # CLI Module
//!
//! Command-line access to CORS policies, mainly for checking a service's
//! `config.yaml` before deploying it.
//!
//! ## Commands
//!
//! ### `validate`
//!
//! Load a configuration, validate it and print the compiled policy:
//!
//! ```bash
//! brrtrouter-cors validate --config config.yaml
//! ```
//!
//! ### `check`
//!
//! Replay one request through the middleware and print the resulting status
//! and headers:
//!
//! ```bash
//! # Simple request
//! brrtrouter-cors check --config config.yaml --origin https://app.example.com
//!
//! # Preflight
//! brrtrouter-cors check --config config.yaml \
//!     --origin https://app.example.com \
//!     --method OPTIONS \
//!     --request-method PUT \
//!     --request-headers "Content-Type, X-Api-Key"
//! ```
//!
//! The configuration path may also come from `BRRTR_CORS_CONFIG`. The exit
//! status is non-zero when the configuration cannot be loaded or is invalid.

mod commands;


pub use commands::{execute, run_cli, Cli, Commands};
