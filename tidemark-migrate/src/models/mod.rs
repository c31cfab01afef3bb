//! Table shapes of the gateway's data model

pub mod api_key;

pub use api_key::ApiKey;
