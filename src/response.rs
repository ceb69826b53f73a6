//! Response envelope and extractors whose rejections render as `AppError`.
use axum::{
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Success,
    Fail,
    #[serde(rename = "error")]
    Error,
}

impl Status {
    pub fn for_error(code: StatusCode) -> Self {
        if code.is_client_error() {
            Status::Fail
        } else {
            Status::Error
        }
    }
}

/// `{status, results?, token?, message?, data?}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: Status::Success,
            results: None,
            token: None,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

impl<T: Serialize> Envelope<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        let mut env = Self::data(items);
        env.results = env.data.as_ref().map(Vec::len);
        env
    }
}

impl Envelope<()> {
    pub fn token(token: String) -> Self {
        Self {
            status: Status::Success,
            results: None,
            token: Some(token),
            message: None,
            data: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            results: None,
            token: None,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
