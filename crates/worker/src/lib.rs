//! Worker process: the job consumer loop plus a liveness endpoint.

pub mod health;
