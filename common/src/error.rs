use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug)]
pub struct ServiceError {
    pub code: u16,
    pub err: anyhow::Error,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("Request failed with {}: {:?}", status, self.err);
            return HttpResponse::build(status).json(json!({
                "success": false,
                "message": "Internal server error",
                "error": self.err.to_string(),
            }));
        }

        HttpResponse::build(status).json(json!({
            "success": false,
            "message": self.err.to_string(),
        }))
    }
}

impl<E: Into<anyhow::Error>> From<E> for ServiceError {
    fn from(err: E) -> ServiceError {
        ServiceError {
            code: 500,
            err: err.into(),
        }
    }
}

pub trait AddCode {
    fn code(self, code: u16) -> ServiceError;
}

impl AddCode for anyhow::Error {
    fn code(self, code: u16) -> ServiceError {
        ServiceError { code, err: self }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Malformed JSON bodies are rejected with the same envelope as every other 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| anyhow::anyhow!("Invalid request body: {}", err).code(400).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        anyhow::anyhow!("Invalid query string: {}", err)
            .code(400)
            .into()
    })
}

#[cfg(test)]
mod tests {
    use actix_web::{body::to_bytes, ResponseError};

    use super::AddCode;

    #[actix_web::test]
    async fn client_errors_render_envelope_with_message() {
        let err = anyhow::anyhow!("Issue not found").code(404);
        let response = err.error_response();
        assert_eq!(response.status().as_u16(), 404);

        let body = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Issue not found");
        assert!(body.get("error").is_none());
    }

    #[actix_web::test]
    async fn foreign_errors_become_internal_errors() {
        let err: super::ServiceError = "x".parse::<i32>().unwrap_err().into();
        assert_eq!(err.code, 500);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Internal server error");
        assert!(body["error"].is_string());
    }
}
