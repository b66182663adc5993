use std::error::Error;

pub mod chunk;
pub mod config;
pub mod error;
pub mod model;
pub mod notion;
pub mod source;
pub mod sync;
pub mod throttle;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
