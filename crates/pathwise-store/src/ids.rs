//! Identifier helpers.

use uuid::Uuid;

/// Opaque 128-bit row identifier.
pub type Id = Uuid;

/// Fresh time-ordered identifier.
pub fn new_id() -> Id {
    Uuid::now_v7()
}

/// Short, log-safe prefix of an identifier.
pub fn redact_id(id: &Id) -> String {
    let mut s = id.simple().to_string();
    s.truncate(8);
    s
}

pub(crate) fn parse_id(raw: &str) -> Option<Id> {
    Uuid::parse_str(raw).ok()
}
