mod bounding_box;
mod normalizer;
mod routes;
mod server;
mod storage;
mod telemetry;
mod vision;

pub mod app;
pub mod config;

pub use app::start_app;
