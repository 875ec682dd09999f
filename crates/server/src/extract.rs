//! Extractors whose rejections use the `ApiError` wire format.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
};

use crate::routes::{reject, Rejection};

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

/// The user named by `?user_id=`. Missing or malformed ids are `Unauthorized`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<UserQuery>::from_request_parts(parts, state)
            .await
            .map_err(|err| {
                reject(ApiError::new(
                    ErrorCode::Unauthorized,
                    format!("user_id query parameter required: {}", err.body_text()),
                ))
            })?;
        Ok(Self(UserId(query.user_id)))
    }
}

pub(crate) struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| Self(value))
            .map_err(|err| reject(ApiError::validation(err.body_text())))
    }
}

pub(crate) struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ApiError::validation(err.body_text())),
            )),
            Err(err) => Err(reject(ApiError::validation(err.body_text()))),
        }
    }
}
