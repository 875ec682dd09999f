use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    dashboard::DashboardAggregate,
    domain::{Link, LinkId, Section, SectionId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateLinkRequest, CreateSectionRequest, DeleteSectionResponse, LoginRequest,
        LoginResponse, ReorderSectionsRequest, SectionOrder, UpdateLinkRequest,
        UpdateSectionRequest,
    },
};

use crate::error::ClientError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a [`crate::DashboardSession`] needs from the server.
#[async_trait]
pub trait DashboardBackend: Send + Sync {
    async fn fetch_dashboard(&self) -> Result<DashboardAggregate, ClientError>;
    async fn reorder_sections(&self, assignments: &[SectionOrder]) -> Result<(), ClientError>;
    async fn create_link(&self, request: &CreateLinkRequest) -> Result<Link, ClientError>;
    async fn update_link(
        &self,
        link_id: LinkId,
        patch: &UpdateLinkRequest,
    ) -> Result<Link, ClientError>;
    async fn delete_link(&self, link_id: LinkId) -> Result<(), ClientError>;
    async fn create_section(&self, name: &str) -> Result<Section, ClientError>;
    async fn update_section(
        &self,
        section_id: SectionId,
        patch: &UpdateSectionRequest,
    ) -> Result<Section, ClientError>;
    async fn delete_section(
        &self,
        section_id: SectionId,
    ) -> Result<DeleteSectionResponse, ClientError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    server_url: String,
    user_id: UserId,
}

impl HttpBackend {
    pub fn new(
        server_url: impl Into<String>,
        user_id: UserId,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            user_id,
        })
    }

    /// Logs in by username and returns a backend bound to that user.
    pub async fn login(
        server_url: impl Into<String>,
        username: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut backend = Self::new(server_url, UserId(0), timeout)?;
        let response = backend
            .http
            .post(format!("{}/login", backend.server_url))
            .json(&LoginRequest {
                username: username.to_string(),
            })
            .send()
            .await?;
        let login: LoginResponse = decode(response).await?;
        backend.user_id = UserId(login.user_id);
        Ok(backend)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}?user_id={}", self.server_url, self.user_id)
    }
}

#[async_trait]
impl DashboardBackend for HttpBackend {
    async fn fetch_dashboard(&self) -> Result<DashboardAggregate, ClientError> {
        let response = self.http.get(self.url("/links/dashboard")).send().await?;
        decode(response).await
    }

    async fn reorder_sections(&self, assignments: &[SectionOrder]) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("/sections/reorder"))
            .json(&ReorderSectionsRequest {
                section_orders: assignments.to_vec(),
            })
            .send()
            .await?;
        expect_success(response).await
    }

    async fn create_link(&self, request: &CreateLinkRequest) -> Result<Link, ClientError> {
        let response = self
            .http
            .post(self.url("/links"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    async fn update_link(
        &self,
        link_id: LinkId,
        patch: &UpdateLinkRequest,
    ) -> Result<Link, ClientError> {
        let response = self
            .http
            .put(self.url(&format!("/links/{link_id}")))
            .json(patch)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_link(&self, link_id: LinkId) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/links/{link_id}")))
            .send()
            .await?;
        expect_success(response).await
    }

    async fn create_section(&self, name: &str) -> Result<Section, ClientError> {
        let response = self
            .http
            .post(self.url("/sections"))
            .json(&CreateSectionRequest {
                name: name.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    async fn update_section(
        &self,
        section_id: SectionId,
        patch: &UpdateSectionRequest,
    ) -> Result<Section, ClientError> {
        let response = self
            .http
            .put(self.url(&format!("/sections/{section_id}")))
            .json(patch)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_section(
        &self,
        section_id: SectionId,
    ) -> Result<DeleteSectionResponse, ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/sections/{section_id}")))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

async fn expect_success(response: Response) -> Result<(), ClientError> {
    check_status(response).await.map(|_| ())
}

/// Surfaces a non-2xx response as the server's own `ApiError` body, falling
/// back to a synthetic one when the body is not an `ApiError`.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let err = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let code = match status.as_u16() {
            401 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            400 | 413 => ErrorCode::ValidationFailed,
            _ => ErrorCode::Internal,
        };
        ApiError::new(code, format!("HTTP {status}: {body}"))
    });
    Err(ClientError::Rejected(err))
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
