use serde_json::{Map, Value};

/// Export package format version.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Key-derivation salt length in bytes.
pub const SALT_LENGTH: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count for passphrase stretching.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Minimum passphrase length accepted for key derivation.
pub const MIN_PASSPHRASE_LENGTH: usize = 8;

/// Default record TTL in milliseconds (8 hours).
pub const DEFAULT_TTL_MS: i64 = 8 * 60 * 60 * 1000;

/// Records per batch during export/import before yielding to the runtime.
pub const EXPORT_BATCH: usize = 32;

/// Number of most-recent audit events inspected for the health failure rate.
pub const HEALTH_WINDOW: usize = 100;

/// Item count at which health degrades to Warning.
pub const ITEM_COUNT_WARNING: usize = 10_000;

/// Item count at which health degrades to Critical.
pub const ITEM_COUNT_CRITICAL: usize = 50_000;

/// Recent failure rate above which health degrades to Warning.
pub const FAILURE_RATE_WARNING: f64 = 0.10;

/// Recent failure rate above which health degrades to Critical.
pub const FAILURE_RATE_CRITICAL: f64 = 0.25;

/// Patient record shape: field name to JSON value, insertion order preserved.
pub type FieldMap = Map<String, Value>;

/// The closed set of patient fields that are encrypted at rest.
///
/// Fields outside this set pass through the store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitiveField {
    Name,
    Phone,
    Email,
    Dob,
    Ssn,
    Insurance,
    MemberId,
}

impl SensitiveField {
    /// Every sensitive field, in wire order.
    pub const ALL: [SensitiveField; 7] = [
        SensitiveField::Name,
        SensitiveField::Phone,
        SensitiveField::Email,
        SensitiveField::Dob,
        SensitiveField::Ssn,
        SensitiveField::Insurance,
        SensitiveField::MemberId,
    ];

    /// Record/wire field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveField::Name => "name",
            SensitiveField::Phone => "phone",
            SensitiveField::Email => "email",
            SensitiveField::Dob => "dob",
            SensitiveField::Ssn => "ssn",
            SensitiveField::Insurance => "insurance",
            SensitiveField::MemberId => "memberId",
        }
    }

    /// Looks a record field name up against the closed set.
    pub fn from_field_name(name: &str) -> Option<SensitiveField> {
        match name {
            "name" => Some(SensitiveField::Name),
            "phone" => Some(SensitiveField::Phone),
            "email" => Some(SensitiveField::Email),
            "dob" => Some(SensitiveField::Dob),
            "ssn" => Some(SensitiveField::Ssn),
            "insurance" => Some(SensitiveField::Insurance),
            "memberId" => Some(SensitiveField::MemberId),
            _ => None,
        }
    }
}

/// How field values are protected at rest.
///
/// `Plaintext` stores values unprotected. It is meant for fixtures and demos
/// and only compiles under the non-default `insecure-plaintext` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionStrategy {
    #[default]
    AeadGcm,
    #[cfg(feature = "insecure-plaintext")]
    Plaintext,
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip() {
        for field in SensitiveField::ALL {
            assert_eq!(SensitiveField::from_field_name(field.as_str()), Some(field));
        }
    }

    #[test]
    fn unknown_fields_are_not_sensitive() {
        assert_eq!(SensitiveField::from_field_name("notes"), None);
        assert_eq!(SensitiveField::from_field_name("id"), None);
        assert_eq!(SensitiveField::from_field_name("SSN"), None);
        assert_eq!(SensitiveField::from_field_name(""), None);
    }

    #[test]
    fn member_id_uses_camel_case_wire_name() {
        assert_eq!(SensitiveField::MemberId.as_str(), "memberId");
    }

    #[test]
    fn default_strategy_is_aead() {
        assert_eq!(EncryptionStrategy::default(), EncryptionStrategy::AeadGcm);
    }
}
