// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domain::models::task::DomainError;
use crate::domain::repositories::task_repository::RepositoryError;
use crate::queue::task_queue::QueueError;

/// 请求层面的错误
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Task not found")]
    NotFound,
}

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(RequestError::BadRequest(message.into()).into())
    }

    pub fn not_found() -> Self {
        Self(RequestError::NotFound.into())
    }

    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<RequestError>() {
            return match e {
                RequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
                RequestError::NotFound => StatusCode::NOT_FOUND,
            };
        }

        if let Some(e) = self.0.downcast_ref::<QueueError>() {
            return match e {
                QueueError::NotFound => StatusCode::NOT_FOUND,
                QueueError::AlreadyTerminal => StatusCode::CONFLICT,
                QueueError::ParentNotFound(_) | QueueError::Invalid(_) => StatusCode::BAD_REQUEST,
                QueueError::LeaseLost | QueueError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }

        if let Some(e) = self.0.downcast_ref::<RepositoryError>() {
            return match e {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Domain(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }

        if self.0.is::<DomainError>()
            || self.0.is::<validator::ValidationErrors>()
            || self.0.is::<serde_json::Error>()
        {
            return StatusCode::BAD_REQUEST;
        }

        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.0.to_string();

        if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
        }

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
