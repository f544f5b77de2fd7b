//! HTTP gateway: job submission and status queries.

pub mod app;
