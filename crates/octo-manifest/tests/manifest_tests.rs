use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use octo_manifest::document::{Generation, ManifestDocument, RecordDocument};
use octo_manifest::{
    load_bytes, load_path, Checksum, Decryptor, ExportFormat, KeyDerivation, ManifestError,
    ManifestStore, ManifestWarning, Revision, RevisionRepr, DIGEST_HEADER_LEN,
};
use pretty_assertions::assert_eq;

const IV: [u8; 16] = *b"octo-manifest-iv";

fn doc(id: i32, name: &str, payload: &str) -> RecordDocument {
    RecordDocument {
        id,
        name: name.to_string(),
        size: payload.len() as i64,
        crc: 0,
        dependencies: Vec::new(),
        state: Some("ADD".to_string()),
        md5: Checksum::compute(payload.as_bytes()).to_string(),
        object_name: format!("key{id}"),
        generation: Generation(1_700_000_000_000_000 + id as u64),
        upload_version_id: None,
    }
}

fn manifest(this: i32, bundles: Vec<RecordDocument>, resources: Vec<RecordDocument>) -> ManifestDocument {
    ManifestDocument {
        revision: RevisionRepr::Bare(this),
        asset_bundle_list: Some(bundles),
        resource_list: Some(resources),
        url_format: Some("https://cdn.test/{type}/{v}/{o}".to_string()),
    }
}

fn v7() -> ManifestDocument {
    manifest(
        7,
        vec![doc(1, "img_a", "a"), doc(2, "img_b", "b")],
        vec![doc(1, "sud_vo_01.awb", "vo")],
    )
}

fn v12() -> ManifestDocument {
    manifest(
        12,
        vec![doc(1, "img_a", "a"), doc(2, "img_b", "b2"), doc(3, "img_c", "c")],
        vec![doc(1, "sud_vo_01.awb", "vo"), doc(2, "adv_main.txt", "text")],
    )
}

fn encrypted_cache(store: &ManifestStore, key: &[u8]) -> Vec<u8> {
    let mut plain = vec![0u8; DIGEST_HEADER_LEN];
    plain.extend(store.export(ExportFormat::Wire).unwrap().into_inner());
    cbc::Encryptor::<aes::Aes256>::new_from_slices(key, &IV)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(&plain)
}

#[test]
fn test_loader_accepts_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let key = KeyDerivation::Sha256.derive("octo");
    let decryptor = Decryptor::new(&key, &IV).unwrap();
    let expected = ManifestStore::from_document(v12(), 0).unwrap().into_inner();

    let json = dir.path().join("v12.json");
    std::fs::write(&json, serde_json::to_vec(&v12()).unwrap()).unwrap();
    let wire = dir.path().join("v12.pdb");
    std::fs::write(&wire, expected.export(ExportFormat::Wire).unwrap().into_inner()).unwrap();
    let cache = dir.path().join("octocacheevai");
    std::fs::write(&cache, encrypted_cache(&expected, &key)).unwrap();

    for path in [&json, &wire, &cache] {
        let loaded = load_path(path, 0, Some(&decryptor)).unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.into_inner(), expected);
    }
}

#[test]
fn test_loader_reports_every_attempt() {
    let err = load_bytes(b"definitely not a manifest", 0, None).unwrap_err();
    match err {
        ManifestError::Unrecognized { attempts } => {
            let names: Vec<_> = attempts.iter().map(|(name, _)| *name).collect();
            assert_eq!(names, vec!["document", "wire", "encrypted wire"]);
            assert_eq!(attempts[2].1, "not applicable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_path(dir.path().join("absent.json"), 0, None),
        Err(ManifestError::Io { .. })
    ));
}

#[test]
fn test_diff_export_reload_merge() {
    let dir = tempfile::tempdir().unwrap();
    let old = ManifestStore::from_document(v7(), 0).unwrap().into_inner();
    let new = ManifestStore::from_document(v12(), 0).unwrap().into_inner();

    let diff = new.diff(&old).unwrap();
    assert_eq!(diff.revision(), Revision::new(12, 7).unwrap());
    assert_eq!(diff.bundles().len(), 2);
    assert_eq!(diff.resources().len(), 1);

    let path = dir.path().join("v12-diff-v7.json");
    let written = diff.export_to_path(&path, ExportFormat::Infer).unwrap();
    assert!(written.warnings.is_empty());

    let reloaded = load_path(&path, 0, None).unwrap().into_inner();
    assert_eq!(reloaded, diff);
    assert_eq!(reloaded.merge(&old).unwrap(), new);
    assert_eq!(old.merge(&reloaded).unwrap(), new);
}

#[test]
fn test_wire_export_of_diff_warns_and_loses_base() {
    let dir = tempfile::tempdir().unwrap();
    let old = ManifestStore::from_document(v7(), 0).unwrap().into_inner();
    let new = ManifestStore::from_document(v12(), 0).unwrap().into_inner();
    let diff = new.diff(&old).unwrap();

    let path = dir.path().join("v12-diff-v7.pdb");
    let written = diff.export_to_path(&path, ExportFormat::Infer).unwrap();
    assert!(matches!(
        written.warnings.as_slice(),
        [ManifestWarning::LossyWireExport { .. }]
    ));

    let bare = load_path(&path, 0, None).unwrap().into_inner();
    assert_eq!(bare.revision(), Revision::snapshot(12).unwrap());
    let restored = load_path(&path, 7, None).unwrap().into_inner();
    assert_eq!(restored, diff);
}

#[test]
fn test_csv_export_lists_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::from_document(v12(), 0).unwrap().into_inner();
    let path = dir.path().join("v12.csv");
    store.export_to_path(&path, ExportFormat::Infer).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("objectName,md5,name,size,state"));
    assert_eq!(lines.count(), store.len());
    assert!(text.contains("img_c.unity3d"));
}
