//! Container safety: gate, integrity and required components
//!
//! Covers:
//! - Zip bombs and oversized entries rejected before extraction
//! - Path traversal in entry names and in the manifest file table
//! - Tampered entries detected with no partial writes
//! - Required-component enforcement with the same message on both sides

use std::io::{Cursor, Read};

use noj_problem_archive::config::{ArchiveConfig, ArchiveLimits};
use noj_problem_archive::error::{ErrorKind, ValidationError};
use noj_problem_archive::mock::{sample_meta, zip_bytes, MockBackend, SeedProblem};
use noj_problem_archive::{Caller, ComponentFilter, Container, ImportRequest};
use serde_json::json;
use zip::ZipArchive;

fn backend() -> MockBackend {
    let backend = MockBackend::new();
    backend.courses.add_course("Course A", Some("teacher"));
    backend
}

fn checker_problem(backend: &MockBackend) -> i64 {
    let mut meta = sample_meta();
    meta.pipeline_mut().custom_checker = Some(true);
    backend.seed(SeedProblem::new("teacher", meta).with_asset("checker", "check.py", b"print('AC')".to_vec()))
}

fn export_bytes(backend: &MockBackend, id: i64) -> Vec<u8> {
    backend
        .service()
        .export(&Caller::admin("root"), id, None)
        .unwrap()
        .to_bytes()
        .unwrap()
}

/// Rebuild a container with the bytes of `name` replaced
fn replace_entry(bytes: Vec<u8>, name: &str, data: &[u8]) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        if file.name() == name {
            buf = data.to_vec();
        }
        entries.push((file.name().to_string(), buf));
    }
    let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
    zip_bytes(&pairs).unwrap()
}

fn assert_untouched(backend: &MockBackend) {
    assert!(backend.problems.is_empty(), "records left: {:?}", backend.problems.ids());
    assert!(backend.objects.is_empty(), "objects left: {:?}", backend.objects.keys());
}

// =============================================================================
// Validation gate
// =============================================================================

#[test]
fn test_zip_bomb_rejected_before_extraction() {
    let zeros = vec![0u8; 1024 * 1024];
    let bomb = zip_bytes(&[
        ("manifest.json", b"{}"),
        ("meta.json", b"{}"),
        ("testcase.zip", &zeros),
    ])
    .unwrap();

    let target = backend();
    let err = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bomb), &ImportRequest::new(["Course A"]))
        .unwrap_err();
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::CompressionRatio { name, .. }) if name == "testcase.zip"
    ));
    assert_untouched(&target);
}

#[test]
fn test_size_limits_from_config() {
    let limits = ArchiveLimits {
        max_file_size_mb: 1,
        max_total_size_mb: 1,
        max_compression_ratio: 100.0,
        max_entries: 100,
    };
    let config = ArchiveConfig::default().with_limits(limits);

    let noise: Vec<u8> = (0..(600 * 1024u32)).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
    let bytes = zip_bytes(&[("a.bin", &noise), ("b.bin", &noise)]).unwrap();
    let err = Container::open(Cursor::new(bytes), &config.limits).err().unwrap();
    assert!(matches!(err.as_validation(), Some(ValidationError::TotalSizeExceeded { .. })));
}

#[test]
fn test_empty_entry_flood_rejected() {
    let names: Vec<String> = (0..200).map(|i| format!("pad/{:04}.txt", i)).collect();
    let mut pairs: Vec<(&str, &[u8])> = vec![("manifest.json", &b"{}"[..]), ("meta.json", &b"{}"[..])];
    pairs.extend(names.iter().map(|n| (n.as_str(), &b""[..])));
    let bytes = zip_bytes(&pairs).unwrap();

    let limits = ArchiveLimits {
        max_entries: 100,
        ..ArchiveLimits::default()
    };
    let target = backend();
    let err = target
        .service_with_config(ArchiveConfig::default().with_limits(limits))
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap_err();
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::TooManyEntries { count: 202, limit: 100 })
    ));
    assert_untouched(&target);
}

#[test]
fn test_traversal_entry_rejected() {
    let target = backend();
    for name in ["../../etc/passwd", "/etc/passwd"] {
        let bytes = zip_bytes(&[("manifest.json", b"{}"), ("meta.json", b"{}"), (name, b"root:x:0:0")]).unwrap();
        let err = target
            .service()
            .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Unsafe zip entry: {}", name));
    }
    assert_untouched(&target);
}

#[test]
fn test_traversal_in_manifest_rejected() {
    let meta = serde_json::to_vec(&sample_meta()).unwrap();
    let manifest = json!({
        "formatVersion": "1.1",
        "files": {
            "../outside.txt": {"sha256": noj_canon::digest(b"x"), "size": 1}
        }
    });
    let bytes = zip_bytes(&[
        ("manifest.json", manifest.to_string().as_bytes()),
        ("meta.json", &meta),
        ("outside.txt", b"x"),
    ])
    .unwrap();

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].reason, "Unsafe zip entry: ../outside.txt");
    assert_untouched(&target);
}

// =============================================================================
// Tamper detection
// =============================================================================

#[test]
fn test_tampered_asset_detected() {
    let source = backend();
    let id = checker_problem(&source);
    let bytes = replace_entry(export_bytes(&source, id), "assets/checker/check.py", b"print('WA')");

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert!(outcome.imported.is_empty());
    assert_eq!(outcome.failed[0].kind, ErrorKind::Validation);
    assert_eq!(outcome.failed[0].reason, "Checksum mismatch: assets/checker/check.py");
    assert_untouched(&target);
}

#[test]
fn test_flipped_byte_in_asset_detected() {
    let source = backend();
    let id = checker_problem(&source);
    let mut bytes = export_bytes(&source, id);

    let start = {
        let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        let file = archive.by_name("assets/checker/check.py").unwrap();
        file.data_start() as usize
    };
    bytes[start] ^= 0xff;

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert!(outcome.imported.is_empty());
    assert_eq!(outcome.failed[0].kind, ErrorKind::Validation);
    assert_eq!(outcome.failed[0].reason, "Checksum mismatch: assets/checker/check.py");
    assert_untouched(&target);
}

#[test]
fn test_tampered_testcase_detected() {
    let source = backend();
    let id = source.seed(SeedProblem::new("teacher", sample_meta()));
    let forged = zip_bytes(&[("0000.in", b"1 2\n"), ("0000.out", b"4\n")]).unwrap();
    let bytes = replace_entry(export_bytes(&source, id), "testcase.zip", &forged);

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert_eq!(outcome.failed[0].reason, "Checksum mismatch: testcase.zip");
    assert_untouched(&target);
}

/// Export with the local service filtered out, then list its file in the
/// manifest and ship `shipped` as its bytes.
fn excluded_component_archive(shipped: &[u8]) -> Vec<u8> {
    let source = backend();
    let mut meta = sample_meta();
    meta.config_mut().network_access_enabled = Some(true);
    let id = source.seed(SeedProblem::new("teacher", meta).with_asset("local_service", "service.zip", b"svc".to_vec()));
    let filter = ComponentFilter::parse(["settings.network"]).unwrap();
    let bytes = source
        .service()
        .export(&Caller::admin("root"), id, Some(&filter))
        .unwrap()
        .to_bytes()
        .unwrap();

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        if file.name() == "manifest.json" {
            let mut manifest: serde_json::Value = serde_json::from_slice(&buf).unwrap();
            manifest["files"]["assets/local_service/service.zip"] =
                json!({"sha256": noj_canon::digest(b"svc"), "size": 3, "role": "assets.local_service"});
            buf = serde_json::to_vec(&manifest).unwrap();
        }
        entries.push((file.name().to_string(), buf));
    }
    entries.push(("assets/local_service/service.zip".to_string(), shipped.to_vec()));
    let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
    zip_bytes(&pairs).unwrap()
}

#[test]
fn test_listed_files_of_excluded_components_are_verified() {
    let target = backend();
    let outcome = target
        .service()
        .import(
            &Caller::admin("root"),
            Cursor::new(excluded_component_archive(b"svX")),
            &ImportRequest::new(["Course A"]),
        )
        .unwrap();
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].reason, "Checksum mismatch: assets/local_service/service.zip");
    assert_untouched(&target);

    let outcome = target
        .service()
        .import(
            &Caller::admin("root"),
            Cursor::new(excluded_component_archive(b"svc")),
            &ImportRequest::new(["Course A"]),
        )
        .unwrap();
    assert!(outcome.is_complete(), "failures: {:?}", outcome.failed);
    // verified, not uploaded
    assert_eq!(target.objects.len(), 1);
}

#[test]
fn test_unlisted_entries_are_ignored() {
    let source = backend();
    let id = source.seed(SeedProblem::new("teacher", sample_meta()));
    let bytes = export_bytes(&source, id);

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        entries.push((file.name().to_string(), buf));
    }
    entries.push(("notes/readme.txt".to_string(), b"not in the manifest".to_vec()));
    let pairs: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
    let bytes = zip_bytes(&pairs).unwrap();

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert!(outcome.is_complete());
    assert_eq!(target.objects.len(), 1);
}

// =============================================================================
// Required components
// =============================================================================

#[test]
fn test_required_component_message_matches() {
    let backend = backend();
    let mut meta = sample_meta();
    meta.pipeline_mut().custom_checker = Some(true);
    let missing = backend.seed(SeedProblem::new("teacher", meta));
    let export_err = backend
        .service()
        .export(&Caller::admin("root"), missing, None)
        .unwrap_err();

    let complete = checker_problem(&backend);
    let bytes = export_bytes(&backend, complete);
    let target = self::backend();
    let request = ImportRequest::new(["Course A"]).with_filter(ComponentFilter::core_only());
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &request)
        .unwrap();

    assert_eq!(export_err.to_string(), "missing required components: assets.checker");
    assert_eq!(outcome.failed[0].reason, export_err.to_string());
    assert_untouched(&target);
}

#[test]
fn test_feature_misaligned_archive_rejected() {
    let source = backend();
    let id = checker_problem(&source);
    let bytes = export_bytes(&source, id);

    // flip the switch off without touching the asset
    let mut archive = ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
    let mut meta: serde_json::Value = {
        let mut text = String::new();
        archive.by_name("meta.json").unwrap().read_to_string(&mut text).unwrap();
        serde_json::from_str(&text).unwrap()
    };
    meta["pipeline"]["customChecker"] = json!(false);
    meta["config"]["customChecker"] = json!(false);
    let bytes = replace_entry(bytes, "meta.json", meta.to_string().as_bytes());

    let target = backend();
    let outcome = target
        .service()
        .import(&Caller::admin("root"), Cursor::new(bytes), &ImportRequest::new(["Course A"]))
        .unwrap();
    assert!(outcome.failed[0].reason.starts_with("Assets included but corresponding feature is disabled"));
    assert_untouched(&target);
}
