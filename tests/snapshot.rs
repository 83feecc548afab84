//! Integration tests for export/import: package wire format, checksum
//! verification order, password transfer between vaults, and partial-import
//! semantics (Scenario B: wrong password fails every record, no partials).

use phivault::{
    compute_checksum, AuditAction, FieldMap, ImportMode, SecureVault, VaultConfig, VaultError,
    EXPORT_FORMAT_VERSION,
};
use serde_json::json;

// ============================================================================
// Helpers
// ============================================================================

const VAULT_PASSPHRASE: &str = "session passphrase one";
const TRANSFER_PASSWORD: &str = "correct-export-password";
const USER: &str = "dr-jones";

fn patient(name: &str, ssn: &str) -> FieldMap {
    json!({
        "name": name,
        "ssn": ssn,
        "insurance": { "carrier": "Acme Health", "tier": 2 },
        "notes": "allergic to penicillin",
    })
    .as_object()
    .expect("object literal")
    .clone()
}

fn seeded_vault() -> SecureVault {
    let vault = SecureVault::open(VAULT_PASSPHRASE, VaultConfig::default()).expect("open vault");
    vault
        .store("patient-001", &patient("Jane Doe", "123-45-6789"), USER)
        .expect("store");
    vault
        .store("patient-002", &patient("John Roe", "987-65-4321"), USER)
        .expect("store");
    vault
}

fn empty_vault() -> SecureVault {
    SecureVault::open("session passphrase two", VaultConfig::default()).expect("open vault")
}

// ============================================================================
// Round trip between vaults
// ============================================================================

#[tokio::test]
async fn export_import_round_trip_across_vaults() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let target = empty_vault();
    let report = target
        .import_all(package, TRANSFER_PASSWORD, ImportMode::Strict, USER)
        .await
        .expect("import");

    assert_eq!(report.imported.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(
        target.retrieve("patient-001", USER).expect("retrieve"),
        patient("Jane Doe", "123-45-6789")
    );
    assert_eq!(
        target.retrieve("patient-002", USER).expect("retrieve"),
        patient("John Roe", "987-65-4321")
    );
}

#[tokio::test]
async fn package_survives_json_serialization() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let wire = serde_json::to_string(&package).expect("serialize");
    let decoded = serde_json::from_str(&wire).expect("deserialize");

    let target = empty_vault();
    let report = target
        .import_all(decoded, TRANSFER_PASSWORD, ImportMode::Strict, USER)
        .await
        .expect("import");
    assert_eq!(report.imported.len(), 2);
}

#[tokio::test]
async fn empty_vault_exports_and_imports_cleanly() {
    let source = empty_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");
    assert!(package.data.is_empty());

    let target = empty_vault();
    let report = target
        .import_all(package, TRANSFER_PASSWORD, ImportMode::Strict, USER)
        .await
        .expect("import");
    assert!(report.imported.is_empty());
}

// ============================================================================
// Wire format
// ============================================================================

#[tokio::test]
async fn package_wire_format_is_stable() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");
    let value = serde_json::to_value(&package).expect("serialize");

    let obj = value.as_object().expect("package object");
    for key in ["version", "timestamp", "salt", "data", "checksum", "encryptedFields"] {
        assert!(obj.contains_key(key), "missing package key {key}");
    }
    assert_eq!(value["version"], EXPORT_FORMAT_VERSION);

    let blob = &value["data"]["patient-001"]["ssn"];
    assert!(blob["ct"].is_string());
    assert!(blob["iv"].is_string());
}

#[tokio::test]
async fn exported_package_contains_no_plaintext() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let wire = serde_json::to_string(&package).expect("serialize");
    assert!(!wire.contains("Jane Doe"));
    assert!(!wire.contains("123-45-6789"));
    assert!(!wire.contains("Acme Health"));
    // Record ids and non-sensitive fields travel in the clear.
    assert!(wire.contains("patient-001"));
    assert!(wire.contains("allergic to penicillin"));
}

#[tokio::test]
async fn each_export_uses_a_fresh_salt() {
    let source = seeded_vault();
    let first = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");
    let second = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    assert_ne!(first.salt, second.salt);
    assert_ne!(first.checksum, second.checksum);
}

// ============================================================================
// Checksum verification comes before decryption
// ============================================================================

#[tokio::test]
async fn tampered_package_is_rejected_before_decryption() {
    let source = seeded_vault();
    let mut package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let blob = package
        .data
        .get_mut("patient-001")
        .and_then(|r| r.get_mut("ssn"))
        .expect("ssn blob");
    blob["ct"] = json!("dGFtcGVyZWQ=");

    let target = empty_vault();
    // Correct password, yet the checksum mismatch surfaces first.
    let err = target
        .import_all(package, TRANSFER_PASSWORD, ImportMode::Strict, USER)
        .await
        .expect_err("tampered import");
    assert!(matches!(err, VaultError::Tamper { .. }));
    assert_eq!(target.stats().item_count, 0);
}

// ============================================================================
// Wrong password (Scenario B)
// ============================================================================

#[tokio::test]
async fn wrong_password_strict_import_stores_nothing() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let target = empty_vault();
    let err = target
        .import_all(package, "wrong-password", ImportMode::Strict, USER)
        .await
        .expect_err("wrong password");

    assert!(matches!(err, VaultError::Integrity));
    assert_eq!(target.stats().item_count, 0);

    let events = target.audit().query(0, 10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::Import);
    assert!(!events[0].success);
}

#[tokio::test]
async fn wrong_password_lenient_import_fails_every_record() {
    let source = seeded_vault();
    let package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let target = empty_vault();
    let err = target
        .import_all(package, "wrong-password", ImportMode::Lenient, USER)
        .await
        .expect_err("wrong password");

    let VaultError::PartialImport(report) = err else {
        panic!("expected PartialImport, got {err}");
    };
    assert!(report.imported.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.error.contains("authentication tag mismatch")));
    // No partially decrypted values land in the vault.
    assert_eq!(target.stats().item_count, 0);
}

// ============================================================================
// Partial import
// ============================================================================

/// A package where one record was sealed under a different transfer password:
/// splice a foreign record in and recompute the checksum, so only per-record
/// decryption can tell the two apart.
#[tokio::test]
async fn lenient_import_keeps_the_good_subset() {
    let source = seeded_vault();
    let mut package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let foreign_vault = empty_vault();
    foreign_vault
        .store("patient-999", &patient("Mallory Moe", "000-00-0000"), USER)
        .expect("store");
    let foreign = foreign_vault
        .export_all("another-transfer-password", USER)
        .await
        .expect("export");
    let foreign_record = foreign.data.get("patient-999").expect("foreign record").clone();
    package.data.insert("patient-999".to_string(), foreign_record);
    package.checksum = compute_checksum(&package).expect("checksum");

    let target = empty_vault();
    let err = target
        .import_all(package, TRANSFER_PASSWORD, ImportMode::Lenient, USER)
        .await
        .expect_err("mixed package");

    let VaultError::PartialImport(report) = err else {
        panic!("expected PartialImport, got {err}");
    };
    assert_eq!(report.imported, vec!["patient-001", "patient-002"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "patient-999");

    assert!(target.retrieve("patient-001", USER).is_ok());
    assert!(matches!(
        target.retrieve("patient-999", USER),
        Err(VaultError::NotFound { .. })
    ));
}

#[tokio::test]
async fn strict_import_aborts_on_the_first_bad_record() {
    let source = seeded_vault();
    let mut package = source.export_all(TRANSFER_PASSWORD, USER).await.expect("export");

    let foreign_vault = empty_vault();
    foreign_vault
        .store("patient-000", &patient("Mallory Moe", "000-00-0000"), USER)
        .expect("store");
    let foreign = foreign_vault
        .export_all("another-transfer-password", USER)
        .await
        .expect("export");
    // "patient-000" sorts first, so strict mode trips on it before the
    // valid records are reached.
    let foreign_record = foreign.data.get("patient-000").expect("foreign record").clone();
    package.data.insert("patient-000".to_string(), foreign_record);
    package.checksum = compute_checksum(&package).expect("checksum");

    let target = empty_vault();
    let err = target
        .import_all(package, TRANSFER_PASSWORD, ImportMode::Strict, USER)
        .await
        .expect_err("mixed package");
    assert!(matches!(err, VaultError::Integrity));
    assert_eq!(target.stats().item_count, 0);
}
