//! UUID generation helpers.

use uuid::Uuid;

/// Generates a random (v4) UUID. Used for session ids.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a time-ordered (v7) UUID. Used for offering ids so catalog
/// listings sort by creation time.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}
