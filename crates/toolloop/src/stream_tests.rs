use super::*;
use std::fs;

#[test]
fn write_chunk_numbers_files_sequentially() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = StreamWriter::new(dir.path());
    writer.write_chunk("hello ").unwrap();
    writer.write_chunk("world").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("chunk_000001.txt")).unwrap(), "hello ");
    assert_eq!(fs::read_to_string(dir.path().join("chunk_000002.txt")).unwrap(), "world");
}

#[test]
fn write_chunk_skips_empty_text() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = StreamWriter::new(dir.path());
    writer.write_chunk("").unwrap();
    writer.write_chunk("x").unwrap();
    assert!(!dir.path().join("chunk_000001.txt").exists());
    assert!(dir.path().join("chunk_000002.txt").exists());
}

#[test]
fn finish_done_writes_marker() {
    let dir = tempfile::tempdir().unwrap();
    let writer = StreamWriter::new(dir.path());
    writer.finish_done().unwrap();
    assert!(dir.path().join("done").exists());
}

#[test]
fn finish_error_writes_message() {
    let dir = tempfile::tempdir().unwrap();
    let writer = StreamWriter::new(dir.path());
    writer.finish_error("boom").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("error")).unwrap(), "boom");
}
