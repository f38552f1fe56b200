//! Exercises the public document-loading path end to end against a real
//! file on disk, the way the mount driver reads it at startup.

use std::io::Write;
use std::time::SystemTime;

use phantomfs::path::NormalizationForm;
use phantomfs::tree::load_document;

fn write_temp_document(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp document");
    file.flush().expect("flush temp document");
    file
}

#[test]
fn loads_nested_document_from_disk() {
    let file = write_temp_document(
        r#"[
            {"type": "directory", "name": "test", "size": 0, "contents": [
                {"type": "file", "name": "a", "size": 5}
            ]}
        ]"#,
    );

    let bytes = std::fs::read(file.path()).expect("read temp document");
    let (index, report) =
        load_document(&bytes, NormalizationForm::None, false, 1000, 1000, SystemTime::UNIX_EPOCH)
            .expect("document loads");

    assert_eq!(report.total_files, 1);
    assert_eq!(report.total_bytes, 5);

    let dir = index.get_by_path("/test").expect("directory present");
    assert!(dir.is_dir());
    assert_eq!(index.uid, 1000);
    assert_eq!(index.gid, 1000);

    let file_entry = index.get_by_path("/test/a").expect("file present");
    assert!(!file_entry.is_dir());
    assert_eq!(file_entry.size, 5);
    assert_eq!(index.path_of(file_entry.inode), "/test/a");
}

#[test]
fn rejects_malformed_document_from_disk() {
    let file = write_temp_document("{ this is not valid json");
    let bytes = std::fs::read(file.path()).expect("read temp document");
    let result =
        load_document(&bytes, NormalizationForm::None, false, 0, 0, SystemTime::UNIX_EPOCH);
    assert!(result.is_err());
}

#[test]
fn adding_cache_suppression_files_is_visible_from_a_loaded_disk_document() {
    let file = write_temp_document(r#"[{"type": "file", "name": "a", "size": 0}]"#);
    let bytes = std::fs::read(file.path()).expect("read temp document");
    let (index, _) =
        load_document(&bytes, NormalizationForm::None, true, 0, 0, SystemTime::UNIX_EPOCH)
            .expect("document loads");

    assert!(index.get_by_path("/a").is_some());
    assert!(index.get_by_path("/.nomedia").is_some());
}
