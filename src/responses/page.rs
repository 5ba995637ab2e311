use poem_openapi::{payload::Html, ApiResponse};

use crate::{config::EventConfig, templates::pages};

#[derive(ApiResponse)]
pub enum PageResponse {
    #[oai(status = 200)]
    Ok(Html<String>),

    #[oai(status = 302)]
    Found(#[oai(header = "Location")] String),

    #[oai(status = 500)]
    InternalServerError(Html<String>),
}

impl PageResponse {
    pub fn redirect(location: impl Into<String>) -> Self {
        PageResponse::Found(location.into())
    }

    pub fn server_error(event: &EventConfig) -> Self {
        PageResponse::InternalServerError(Html(pages::server_error(event)))
    }
}
