use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::error::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// 鉴权失败
#[derive(Debug, thiserror::Error)]
#[error("token 无效")]
pub struct Unauthorized;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.is::<Unauthorized>() {
            return StatusCode::UNAUTHORIZED;
        }
        match self.0.downcast_ref::<Error>() {
            Some(Error::CollectionNotFound(_)) => StatusCode::NOT_FOUND,
            Some(Error::InvalidTopK { .. } | Error::InvalidCollectionName(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:?}", self.0);
        }
        (status, self.0.to_string()).into_response()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::from(Error::CollectionNotFound("a".into())), StatusCode::NOT_FOUND),
            (AppError::from(Error::InvalidTopK { max: 5, actual: 9 }), StatusCode::BAD_REQUEST),
            (AppError::from(Error::InvalidCollectionName("".into())), StatusCode::BAD_REQUEST),
            (AppError::from(Unauthorized), StatusCode::UNAUTHORIZED),
            (
                AppError::from(Error::RetrievalService("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }
    }
}
