//! Utility functions for id generation and timestamp handling.

mod timestamps;
mod uuid_utils;

pub use timestamps::{elapsed_ms, iso_timestamp, now, Timestamp};
pub use uuid_utils::{generate_uuid, generate_uuid_v7};
