use super::*;
use std::fs;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mediashare-send-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn local_items_should_title_files_after_their_stem() {
    let dir = temp_dir();
    let first = dir.join("So What.mp3");
    let second = dir.join("Blue in Green.flac");
    fs::write(&first, b"one").expect("write first");
    fs::write(&second, b"two").expect("write second");

    let items = local_items(&[first.clone(), second], Some("Miles Davis")).expect("items");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "So What");
    assert_eq!(items[0].path, first);
    assert_eq!(items[1].title, "Blue in Green");
    assert!(items.iter().all(|item| item.artist == "Miles Davis"));
    assert_ne!(items[0].id, items[1].id);
    assert_eq!(items[0].id.len(), 32);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn local_items_should_reject_directories_and_missing_paths() {
    let dir = temp_dir();

    let error = local_items(&[dir.clone()], None).expect_err("directory rejected");
    assert!(error.to_string().starts_with("Not a file"));
    assert!(local_items(&[dir.join("missing.mp3")], None).is_err());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn local_items_should_default_the_artist() {
    let dir = temp_dir();
    let path = dir.join(".mp3");
    fs::write(&path, b"x").expect("write file");

    let items = local_items(&[path], None).expect("items");
    assert_eq!(items[0].artist, "Unknown artist");
    assert_eq!(items[0].title, ".mp3");
    let _ = fs::remove_dir_all(dir);
}
