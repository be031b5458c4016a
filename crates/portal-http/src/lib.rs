#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! HTTP access to the metering portal backend.
//!
//! # Example
//!
//! ```no_run
//! use portal_http::{ClientConfig, FileSession, HttpPortalApi};
//! use portal_core::PortalApi;
//! use std::sync::Arc;
//!
//! # async fn example() -> portal_core::Result<()> {
//! let config = ClientConfig::new("https://portal.example/api")
//!     .with_session(Arc::new(FileSession::new("session.json")));
//! let api = HttpPortalApi::from_config(config)?;
//!
//! let parc = api.parc().await?;
//! println!("{parc}");
//! # Ok(())
//! # }
//! ```

/// The HTTP client.
pub mod client;
/// Binary downloads.
pub mod download;
/// Backend routes.
pub mod endpoints;
/// The response envelope.
pub mod envelope;
/// Session records.
pub mod session;

pub use client::{ApiClient, ApiResponse, ClientConfig, DEFAULT_TIMEOUT};
pub use download::{Download, filename_from_disposition, synthesize_filename};
pub use endpoints::HttpPortalApi;
pub use envelope::Envelope;
pub use session::{
    Anonymous, FileSession, PK_USER_HEADER, SESSION_ID_HEADER, Session, SessionSource,
    StaticSession,
};
