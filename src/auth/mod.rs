//! Credentials, session tokens, reset tokens and the request guard.
pub mod extractors;
pub mod jwt;
pub mod password;
pub mod reset;
