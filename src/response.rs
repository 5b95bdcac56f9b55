use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;

/// Success envelope; failures are rendered by `Error`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    status_code: u16,
    data: T,
    message: String,
    success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> ApiResponse<T> {
        ApiResponse {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.is_success(),
        }
    }

    fn respond(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        HttpResponse::build(status).json(self)
    }
}

pub fn ok<T: Serialize>(data: T, message: impl Into<String>) -> HttpResponse {
    ApiResponse::new(StatusCode::OK, data, message).respond()
}

pub fn created<T: Serialize>(data: T, message: impl Into<String>) -> HttpResponse {
    ApiResponse::new(StatusCode::CREATED, data, message).respond()
}
