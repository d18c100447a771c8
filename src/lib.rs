//! Client core for OAuth-authenticated Yandex service APIs.
//!
//! A concrete service client embeds a [`ServiceClient`], points it at the
//! service domain and issues calls through [`ServiceClient::send_request`].
//! Structured error bodies returned by the service are translated into
//! [`ClientError`] variants; everything else comes back untouched.
//!
//! ```no_run
//! use reqwest::Method;
//! use yandex_client::{ClientError, RequestOptions, ServiceClient};
//!
//! fn fetch_status() -> Result<(), ClientError> {
//!     let mut client = ServiceClient::new();
//!     client
//!         .set_domain("dialogs.yandex.net")
//!         .set_access_token("oauth-token");
//!
//!     let response = client.send_request(Method::GET, "api/v1/status", RequestOptions::new())?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod error;

pub use client::{RequestOptions, Scheme, ServiceClient};
pub use config::ClientConfig;
pub use decode::{decode_body, BodyFormat};
pub use error::{ClientError, ServiceErrorPayload};

/// Library identity reported in the default User-Agent header.
pub const LIBRARY_NAME: &str = "yandex-rust-library";

/// Library version baked in at compile time.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
