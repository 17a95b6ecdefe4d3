//! Request middleware for the mirror hosts

mod auth;

pub use auth::{
    request_host, SogouAuth, AUTH_HEADER, DEFAULT_CLIENT_ID, DEFAULT_CREDENTIAL, TAG_HEADER,
    TIMESTAMP_HEADER,
};
