//! # Penguin X API Client
//!
//! An async Rust client for the Penguin X personal finance REST backend.
//!
//! ## Features
//!
//! - Client-side sliding-window rate limiting, honouring server rate-limit headers
//! - Automatic retries with exponential backoff for idempotent requests
//! - A fixed error taxonomy with messages safe to show to end users
//! - Scrubbed telemetry events and log lines: tokens, passwords, emails and
//!   card numbers never leave the process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use penguin_api_client::{ApiClient, endpoints};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new()?;
//!     let transactions: Vec<serde_json::Value> =
//!         client.get(endpoints::finance::TRANSACTIONS).await?;
//!     println!("{} transactions", transactions.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod scrub;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types at crate root
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use error::{ClassifiedError, ConfigError, ErrorKind};
pub use pipeline::{IDEMPOTENCY_KEY_HEADER, REQUEST_ID_HEADER};
pub use request::RequestConfig;

/// Result type alias using ClassifiedError
pub type Result<T> = std::result::Result<T, ClassifiedError>;
