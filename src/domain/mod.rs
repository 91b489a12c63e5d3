//! Domain layer: models, errors, and trait seams.

pub mod errors;
pub mod models;
pub mod ports;
