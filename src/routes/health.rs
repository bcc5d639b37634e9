use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

#[derive(Serialize, Deserialize)]
pub struct Welcome {
    message: String,
    version: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
    })
}

pub async fn root() -> impl IntoResponse {
    Json(Welcome {
        message: "Welcome to the detection gateway".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
