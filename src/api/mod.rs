pub mod handlers;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use crate::common::errors::EngineError;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let body = json!({
            "error": outer_msg,
            "chain": chain,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Engine errors carry their own HTTP mapping; the blanket `From` above
/// would flatten everything to 500, so handlers route through this instead.
pub fn map_engine(err: EngineError) -> AppError {
    let status = match &err {
        EngineError::NotFound(_) => Status::NotFound,
        EngineError::Validation(_) | EngineError::InvalidWorkflow(_) => Status::BadRequest,
        EngineError::Delivery(_) => Status::BadGateway,
        EngineError::StoreUnavailable(_) => Status::ServiceUnavailable,
        EngineError::TimedOut => Status::GatewayTimeout,
    };
    AppError {
        status,
        error: err.into(),
    }
}
