//! Edge-gateway plumbing: an upstream HTTP client and response normalization
//!
//! The gateway fronts the auth, IP-inventory, and audit-query services. Its
//! handlers stay thin: build the upstream path, call the [`ServiceClient`],
//! and hand the outcome to [`forward`], which resolves every request to one
//! of four shapes — upstream passthrough, `503` when the upstream cannot be
//! reached, `500` for anything unexpected, or `422` when local validation
//! rejects the request before any upstream call is made.

pub mod client;
pub mod proxy;

pub use client::ServiceClient;
pub use proxy::{forward, ProxyError};
