//! Destination path resolution
//!
//! Object names look like `sud_vo_adv_unit_01-hski-02.awb`. With
//! categorization on, they are sorted into nested subdirectories derived
//! from the name:
//! - the extension is dropped
//! - everything from the first `-` or `_` followed by a digit is dropped
//! - if an identifier occurs, everything after its first occurrence is dropped
//! - the remainder is split on `_` into path segments
//!
//! This is a best-effort partition; names that reduce to nothing fall back
//! to their leading segment.

use crate::config::{FetchConfig, FetchOptions};
use octo_manifest::{ObjectRecord, RecordKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Character identifiers that end a category path
pub const DEFAULT_IDENTIFIERS: &[&str] = &[
    "hski", "ttmr", "fktn", "amao", "kllj", "kcna", "ssmk", "shro", "hrnm", "hume", "hmsz",
    "jsna", "atbm", "jkno", "nasr", "trvo", "trda", "trvi", "krnh", "andk", "sson", "sgka",
    "ktko", "cmmn",
];

static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]\d").unwrap());

/// Category subdirectory for an object name
#[must_use]
pub fn categorize<S: AsRef<str>>(name: &str, identifiers: &[S]) -> PathBuf {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let mut head = match NUMERIC_SUFFIX.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    };
    for ident in identifiers {
        let ident = ident.as_ref();
        if ident.is_empty() {
            continue;
        }
        if let Some(pos) = head.find(ident) {
            head = &head[..pos + ident.len()];
            break;
        }
    }

    let segments: PathBuf = head.split('_').filter(|s| !s.is_empty()).collect();
    if segments.as_os_str().is_empty() {
        stem.split(['_', '-'])
            .find(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_default()
    } else {
        segments
    }
}

/// Where a record's raw payload is written
///
/// A destination with an extension is an explicit file path and is used
/// verbatim. Otherwise it is a directory: the record's file name is joined
/// onto it, below its category path when `options.categorize` is set.
#[must_use]
pub fn resolve_destination(
    record: &ObjectRecord,
    kind: RecordKind,
    options: &FetchOptions,
    config: &FetchConfig,
) -> PathBuf {
    let destination = &options.destination;
    if destination.extension().is_some() {
        return destination.clone();
    }

    let file_name = record.file_name(kind);
    if options.categorize {
        destination
            .join(categorize(record.name(), config.identifiers.as_slice()))
            .join(file_name)
    } else {
        destination.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octo_manifest::document::{Generation, RecordDocument};
    use proptest::prelude::*;

    fn cat(name: &str) -> PathBuf {
        categorize(name, DEFAULT_IDENTIFIERS)
    }

    fn record(name: &str) -> ObjectRecord {
        ObjectRecord::from_document(RecordDocument {
            id: 1,
            name: name.to_string(),
            size: 0,
            crc: 0,
            dependencies: Vec::new(),
            state: None,
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            object_name: "k".to_string(),
            generation: Generation(0),
            upload_version_id: None,
        })
        .unwrap()
    }

    #[test]
    fn cuts_at_numeric_suffix() {
        assert_eq!(cat("img_general_icon_01.png"), PathBuf::from("img/general/icon"));
        assert_eq!(cat("mov_event-3"), PathBuf::from("mov/event"));
    }

    #[test]
    fn truncates_after_identifier() {
        assert_eq!(
            cat("sud_vo_adv_unit_hski-greeting.awb"),
            PathBuf::from("sud/vo/adv/unit/hski")
        );
        assert_eq!(cat("img_chr_ttmr_costume-summer"), PathBuf::from("img/chr/ttmr"));
    }

    #[test]
    fn keeps_hyphenated_segments() {
        assert_eq!(cat("adv_story-main.txt"), PathBuf::from("adv/story-main"));
    }

    #[test]
    fn empty_result_falls_back_to_leading_segment() {
        assert_eq!(cat("_1abc.png"), PathBuf::from("1abc"));
        assert_eq!(cat(""), PathBuf::new());
    }

    #[test]
    fn custom_vocabulary() {
        assert_eq!(categorize("img_foo_bar_baz", &["foo"]), PathBuf::from("img/foo"));
    }

    #[test]
    fn explicit_file_destination_is_verbatim() {
        let options = FetchOptions::new("out/custom.bin");
        let path = resolve_destination(&record("img_x"), RecordKind::Bundle, &options, &FetchConfig::default());
        assert_eq!(path, PathBuf::from("out/custom.bin"));
    }

    #[test]
    fn directory_destination_categorized() {
        let options = FetchOptions::new("out");
        let path = resolve_destination(&record("img_general_x"), RecordKind::Bundle, &options, &FetchConfig::default());
        assert_eq!(path, PathBuf::from("out/img/general/x/img_general_x.unity3d"));

        let flat = FetchOptions::new("out").with_categorize(false);
        let path = resolve_destination(&record("a_b.txt"), RecordKind::Resource, &flat, &FetchConfig::default());
        assert_eq!(path, PathBuf::from("out/a_b.txt"));
    }

    proptest! {
        #[test]
        fn categories_are_clean_segments(name in "[a-z0-9_-]{1,24}(\\.[a-z]{1,4})?") {
            let path = cat(&name);
            for component in path.components() {
                let segment = component.as_os_str().to_string_lossy();
                prop_assert!(!segment.is_empty());
                prop_assert!(!segment.contains('_'));
            }
        }
    }
}
