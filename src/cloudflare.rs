//! Cloudflare API access.
//!
//! - [`ApiClient`]: bearer-authenticated v4 REST and GraphQL client with
//!   pagination, error-envelope mapping and cancellation on every wait
//! - [`Envelope`] / [`GraphqlResponse`]: wire types

mod client;
mod types;

pub use client::{ApiClient, five_minute_window};
pub use types::{ApiMessage, Envelope, GraphqlError, GraphqlResponse, ResultInfo};
