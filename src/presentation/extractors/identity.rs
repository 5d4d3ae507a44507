// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

pub const ORG_ID_HEADER: &str = "X-Org-Id";
pub const ACCOUNT_ID_HEADER: &str = "X-Account-Id";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// 调用方身份
///
/// `X-Org-Id` 必填；`X-Request-Id` 缺省时生成一个，作为任务的关联 ID。
#[derive(Debug, Clone)]
pub struct Identity {
    pub org_id: String,
    pub account_id: Option<String>,
    pub request_id: String,
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(org_id) = header_value(parts, ORG_ID_HEADER) else {
            let body = Json(json!({ "error": "Missing or invalid X-Org-Id header" }));
            return Err((StatusCode::BAD_REQUEST, body).into_response());
        };

        Ok(Identity {
            org_id,
            account_id: header_value(parts, ACCOUNT_ID_HEADER),
            request_id: header_value(parts, REQUEST_ID_HEADER)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }
}
