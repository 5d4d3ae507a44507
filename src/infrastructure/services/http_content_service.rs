// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ContentSettings;
use crate::domain::services::content_service::{ContentError, ContentService, RemoteTaskState};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// 组织标识请求头
const ORG_ID_HEADER: &str = "X-Org-Id";

#[derive(Serialize)]
struct IntrospectRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct SyncResponse {
    task_href: String,
}

#[derive(Serialize)]
struct DistributionsRequest<'a> {
    repository_uuids: &'a [Uuid],
}

/// 基于 HTTP 的内容服务实现
pub struct HttpContentService {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 服务根地址
    base_url: Url,
}

impl HttpContentService {
    /// 创建新的内容服务客户端
    ///
    /// # 参数
    ///
    /// * `base_url` - 服务根地址
    /// * `timeout` - 单次请求超时
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ContentError> {
        // 相对路径按目录拼接，根地址必须以 '/' 结尾
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ContentError::InvalidResponse(format!("invalid base url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContentError::Request(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn from_settings(settings: &ContentSettings) -> Result<Self, ContentError> {
        Self::new(
            &settings.base_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ContentError> {
        self.base_url
            .join(path)
            .map_err(|e| ContentError::InvalidResponse(format!("invalid path {}: {}", path, e)))
    }

    /// 将非成功状态码转换为错误
    async fn check(response: Response) -> Result<Response, ContentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ContentError::NotFound);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ContentError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ContentError> {
        let response = request
            .send()
            .await
            .map_err(|e| ContentError::Request(e.to_string()))?;
        Self::check(response).await
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn introspect(&self, url: &str) -> Result<(), ContentError> {
        let endpoint = self.endpoint("api/content/v1/repositories/introspect")?;
        debug!("Introspecting repository {}", url);
        self.send(self.client.post(endpoint).json(&IntrospectRequest { url }))
            .await?;
        Ok(())
    }

    async fn start_snapshot(
        &self,
        org_id: &str,
        repository_uuid: Uuid,
    ) -> Result<String, ContentError> {
        let endpoint =
            self.endpoint(&format!("api/content/v1/repositories/{}/sync", repository_uuid))?;
        let response = self
            .send(self.client.post(endpoint).header(ORG_ID_HEADER, org_id))
            .await?;
        let body: SyncResponse = response
            .json()
            .await
            .map_err(|e| ContentError::InvalidResponse(e.to_string()))?;
        Ok(body.task_href)
    }

    async fn remote_task(&self, href: &str) -> Result<RemoteTaskState, ContentError> {
        let endpoint = self.endpoint(href)?;
        let response = self.send(self.client.get(endpoint)).await?;
        response
            .json()
            .await
            .map_err(|e| ContentError::InvalidResponse(e.to_string()))
    }

    async fn delete_repository_snapshots(
        &self,
        org_id: &str,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError> {
        let endpoint = self.endpoint(&format!(
            "api/content/v1/repositories/{}/snapshots",
            repository_uuid
        ))?;
        self.send(self.client.delete(endpoint).header(ORG_ID_HEADER, org_id))
            .await?;
        Ok(())
    }

    async fn update_template_distributions(
        &self,
        org_id: &str,
        template_uuid: Uuid,
        repository_uuids: &[Uuid],
    ) -> Result<(), ContentError> {
        let endpoint = self.endpoint(&format!(
            "api/content/v1/templates/{}/distributions",
            template_uuid
        ))?;
        self.send(
            self.client
                .put(endpoint)
                .header(ORG_ID_HEADER, org_id)
                .json(&DistributionsRequest { repository_uuids }),
        )
        .await?;
        Ok(())
    }

    async fn delete_template_distribution(
        &self,
        org_id: &str,
        template_uuid: Uuid,
        repository_uuid: Uuid,
    ) -> Result<(), ContentError> {
        let endpoint = self.endpoint(&format!(
            "api/content/v1/templates/{}/distributions/{}",
            template_uuid, repository_uuid
        ))?;
        self.send(self.client.delete(endpoint).header(ORG_ID_HEADER, org_id))
            .await?;
        Ok(())
    }

    async fn delete_template(&self, org_id: &str, template_uuid: Uuid) -> Result<(), ContentError> {
        let endpoint =
            self.endpoint(&format!("api/content/v1/templates/{}", template_uuid))?;
        self.send(self.client.delete(endpoint).header(ORG_ID_HEADER, org_id))
            .await?;
        Ok(())
    }
}
