//! Persistence layout: one JSON document per key.

/// Medications collection.
pub const MEDICATIONS: &str = "apotheca:medications";

/// Movement ledger.
pub const MOVEMENTS: &str = "apotheca:movements";

/// Categories collection.
pub const CATEGORIES: &str = "apotheca:categories";

/// Suppliers collection.
pub const SUPPLIERS: &str = "apotheca:suppliers";

/// Alert configuration object.
pub const ALERT_SETTINGS: &str = "apotheca:alert-settings";

/// Date of the last supplier-return housekeeping run.
pub const LAST_HOUSEKEEPING: &str = "apotheca:housekeeping:last-run";

/// Prefix shared by every per-user acknowledgment list.
pub const ACK_PREFIX: &str = "apotheca:acks:";

/// Acknowledgment list of one user.
pub fn acknowledgments(user_id: &str) -> String {
    format!("{}{}", ACK_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_key_includes_user() {
        assert_eq!(acknowledgments("u-42"), "apotheca:acks:u-42");
        assert!(acknowledgments("u-42").starts_with(ACK_PREFIX));
    }
}
