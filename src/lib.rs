//! # cartd
//!
//! A shopping-cart HTTP API on a from-scratch async HTTP/1.1 stack.
//!
//! Requests pass through a [`Pipeline`](middleware::Pipeline): a logger, a
//! tiered token-bucket [rate limiter](security), then the cart [router](api).
//! Reads are served from a [response cache](cache) that every write
//! invalidates before it answers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cartd::api::{self, AppState};
//! use cartd::config::AppConfig;
//! use cartd::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::default();
//!     let state = Arc::new(AppState::in_memory(config.cache_ttl));
//!     let pipeline = api::pipeline(&config, state)?;
//!
//!     let server = Server::bind(&config.addr).await?;
//!     server.run(move |request| pipeline.handle(request)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod cart;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

pub use error::CartError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
