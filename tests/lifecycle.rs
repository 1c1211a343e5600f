use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use openssl::x509::X509;
use simpleca::authority::CertificateAuthority;
use simpleca::error::CaError;
use simpleca::generate_root_ca::SignatureAlgorithm;
use simpleca::leaf_issuer::LeafRequest;
use simpleca::registry::LeafCertificateEntry;
use simpleca::root_ca_store::RootCaParams;
use simpleca::storage::Storage;
use tempfile::TempDir;

fn authority() -> (TempDir, CertificateAuthority) {
    let dir = TempDir::new().unwrap();
    let ca = CertificateAuthority::new(Storage::new(dir.path().join("data")));
    (dir, ca)
}

fn root_params() -> RootCaParams {
    RootCaParams {
        common_name: "Lifecycle Root".to_string(),
        validity_days: 3650,
        key_size: 1024,
        algorithm: SignatureAlgorithm::Sha256,
    }
}

fn leaf(common_name: &str, sans: &str) -> LeafRequest {
    LeafRequest {
        common_name: common_name.to_string(),
        sans: sans.to_string(),
        validity_days: 90,
        key_size: 1024,
    }
}

fn files_in(dir: &Path) -> BTreeSet<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => BTreeSet::new(),
    }
}

#[test]
fn issue_without_root_ca_creates_nothing() {
    let (_dir, ca) = authority();
    let err = ca.issue_leaf(&leaf("example.com", "")).unwrap_err();
    assert!(matches!(err, CaError::Precondition(_)));
    assert!(files_in(ca.storage().root()).is_empty());
}

#[test]
fn issue_records_entry_and_artifacts() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();

    let entry = ca
        .issue_leaf(&leaf("example.com", "192.168.1.1,api.example.com"))
        .unwrap();
    assert_eq!(entry.name, "example.com");
    assert_eq!(entry.cert_file, "examplecom.crt.pem");
    assert_eq!(entry.key_file, "examplecom.key.pem");
    assert_eq!(entry.chain_file.as_deref(), Some("examplecom.chain.pem"));
    assert_eq!(entry.expiry.len(), "YYYY-MM-DD".len());

    let storage = ca.storage();
    let cert_pem = fs::read_to_string(storage.file_path(&entry.cert_file)).unwrap();
    let root_pem = fs::read_to_string(storage.root_cert_path()).unwrap();
    let chain_pem = fs::read_to_string(storage.file_path("examplecom.chain.pem")).unwrap();
    assert_eq!(chain_pem, format!("{}{}", cert_pem, root_pem));

    let cert = X509::from_pem(cert_pem.as_bytes()).unwrap();
    let root = X509::from_pem(root_pem.as_bytes()).unwrap();
    assert!(cert.verify(&root.public_key().unwrap()).unwrap());

    let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
    let dns_first = text.find("DNS:example.com").unwrap();
    let ip = text.find("IP Address:192.168.1.1").unwrap();
    let dns_second = text.find("DNS:api.example.com").unwrap();
    assert!(dns_first < ip && ip < dns_second);

    assert_eq!(ca.list_leaves(), vec![entry]);
}

#[test]
fn duplicate_name_is_rejected_case_insensitively() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    ca.issue_leaf(&leaf("example.com", "")).unwrap();

    let registry_before = fs::read(ca.storage().registry_path()).unwrap();
    let files_before = files_in(ca.storage().root());

    let err = ca.issue_leaf(&leaf("  Example.com ", "")).unwrap_err();
    assert!(matches!(err, CaError::Conflict(_)));
    assert_eq!(fs::read(ca.storage().registry_path()).unwrap(), registry_before);
    assert_eq!(files_in(ca.storage().root()), files_before);
}

#[test]
fn colliding_base_names_get_suffixes() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();

    let first = ca.issue_leaf(&leaf("web.local", "")).unwrap();
    let second = ca.issue_leaf(&leaf("web-local", "")).unwrap();
    assert_eq!(first.key_file, "weblocal.key.pem");
    assert_eq!(second.key_file, "weblocal-1.key.pem");
    assert_eq!(second.cert_file, "weblocal-1.crt.pem");

    let first_key = fs::read(ca.storage().file_path(&first.key_file)).unwrap();
    let second_key = fs::read(ca.storage().file_path(&second.key_file)).unwrap();
    assert_ne!(first_key, second_key);
}

#[test]
fn invalid_input_is_rejected_before_any_write() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    let before = files_in(ca.storage().root());

    let mut bad_days = leaf("a.example", "");
    bad_days.validity_days = 0;
    let mut bad_size = leaf("a.example", "");
    bad_size.key_size = 3072;
    for request in [
        bad_days,
        bad_size,
        leaf("   ", ""),
        leaf("a.example", "999.1.1.1"),
    ] {
        assert!(matches!(
            ca.issue_leaf(&request),
            Err(CaError::Validation(_))
        ));
    }
    assert_eq!(files_in(ca.storage().root()), before);
}

#[test]
fn delete_removes_files_and_entry() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    let entry = ca.issue_leaf(&leaf("delete.me", "")).unwrap();

    let report = ca.delete_leaf("DELETE.me").unwrap();
    let deleted: BTreeSet<_> = report.deleted.iter().cloned().collect();
    let expected: BTreeSet<_> = entry.files().into_iter().map(String::from).collect();
    assert_eq!(deleted, expected);
    assert!(report.missing.is_empty());
    assert!(ca.list_leaves().is_empty());

    // root material untouched
    assert!(ca.root_ca_exists());
    assert!(matches!(
        ca.delete_leaf("delete.me"),
        Err(CaError::NotFound(_))
    ));
}

#[test]
fn delete_tolerates_already_missing_files() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    let entry = ca.issue_leaf(&leaf("partial", "")).unwrap();
    fs::remove_file(ca.storage().file_path(&entry.key_file)).unwrap();

    let report = ca.delete_leaf("partial").unwrap();
    assert_eq!(report.missing, vec![entry.key_file.clone()]);
    assert_eq!(report.deleted.len(), 2);
    assert!(ca.list_leaves().is_empty());
}

#[test]
fn registry_roundtrip_after_mutations() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    ca.issue_leaf(&leaf("one.example", "")).unwrap();
    ca.issue_leaf(&leaf("two.example", "10.0.0.2")).unwrap();
    ca.delete_leaf("one.example").unwrap();

    let loaded = ca.registry().load();
    ca.registry().save(&loaded).unwrap();
    let reloaded = ca.registry().load();
    assert_eq!(loaded, reloaded);
    assert_eq!(
        reloaded
            .certificates
            .iter()
            .map(|e: &LeafCertificateEntry| e.name.as_str())
            .collect::<Vec<_>>(),
        vec!["two.example"]
    );
}

#[test]
fn corrupt_registry_degrades_to_empty_and_recovers() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    fs::write(ca.storage().registry_path(), b"{ not json").unwrap();
    assert!(ca.list_leaves().is_empty());

    ca.issue_leaf(&leaf("fresh.example", "")).unwrap();
    assert_eq!(ca.list_leaves().len(), 1);
}

#[test]
fn forced_regeneration_replaces_root() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    let old_cert = fs::read(ca.storage().root_cert_path()).unwrap();

    assert!(matches!(
        ca.generate_root_ca(&root_params(), false),
        Err(CaError::Conflict(_))
    ));
    ca.generate_root_ca(&root_params(), true).unwrap();
    assert_ne!(fs::read(ca.storage().root_cert_path()).unwrap(), old_cert);

    // leaves issued afterwards chain to the new root
    let entry = ca.issue_leaf(&leaf("after.rotate", "")).unwrap();
    let cert =
        X509::from_pem(&fs::read(ca.storage().file_path(&entry.cert_file)).unwrap()).unwrap();
    let root = X509::from_pem(&fs::read(ca.storage().root_cert_path()).unwrap()).unwrap();
    assert!(cert.verify(&root.public_key().unwrap()).unwrap());
}

#[test]
fn zero_padded_ip_sans_are_accepted() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();

    let entry = ca
        .issue_leaf(&leaf("padded.example", "192.168.001.010"))
        .unwrap();
    let cert =
        X509::from_pem(&fs::read(ca.storage().file_path(&entry.cert_file)).unwrap()).unwrap();
    let ips: Vec<Vec<u8>> = cert
        .subject_alt_names()
        .unwrap()
        .iter()
        .filter_map(|name| name.ipaddress().map(<[u8]>::to_vec))
        .collect();
    assert_eq!(ips, vec![vec![192, 168, 1, 10]]);
}

#[test]
fn invalid_ip_root_common_name_is_a_validation_error() {
    let (_dir, ca) = authority();
    let mut params = root_params();
    params.common_name = "999.1.1.1".to_string();
    assert!(matches!(
        ca.generate_root_ca(&params, false),
        Err(CaError::Validation(_))
    ));
    assert!(!ca.root_ca_exists());
}

#[test]
fn failed_issuance_leaves_no_artifacts() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    ca.issue_leaf(&leaf("existing.example", "")).unwrap();

    // unreadable key still counts as present, so signing is where it fails
    fs::write(ca.storage().root_key_path(), b"not a key").unwrap();
    let registry_before = fs::read(ca.storage().registry_path()).unwrap();
    let files_before = files_in(ca.storage().root());

    let err = ca.issue_leaf(&leaf("new.example", "")).unwrap_err();
    assert!(matches!(err, CaError::Signing(_)));
    assert_eq!(files_in(ca.storage().root()), files_before);
    assert_eq!(fs::read(ca.storage().registry_path()).unwrap(), registry_before);
    assert_eq!(ca.list_leaves().len(), 1);
}

#[test]
fn delete_io_error_keeps_entry_and_reports() {
    let (_dir, ca) = authority();
    ca.generate_root_ca(&root_params(), false).unwrap();
    let entry = ca.issue_leaf(&leaf("stuck", "")).unwrap();

    // a directory where the key file should be cannot be removed as a file
    let key_path = ca.storage().file_path(&entry.key_file);
    fs::remove_file(&key_path).unwrap();
    fs::create_dir(&key_path).unwrap();

    let err = ca.delete_leaf("stuck").unwrap_err();
    let CaError::Deletion { name, report } = err else {
        panic!("expected a deletion error");
    };
    assert_eq!(name, "stuck");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, entry.key_file);
    let deleted: BTreeSet<_> = report.deleted.iter().map(String::as_str).collect();
    assert!(deleted.contains(entry.cert_file.as_str()));
    assert!(deleted.contains(entry.chain_file.as_deref().unwrap()));

    assert_eq!(ca.list_leaves(), vec![entry]);
}
