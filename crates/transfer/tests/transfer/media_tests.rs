use super::*;
use std::path::Path;

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mediashare-{label}-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn shareable(id: &str, title: &str, mime_type: &str) -> ShareableItem {
    ShareableItem {
        id: id.to_string(),
        title: title.to_string(),
        artist: "Sun Ra".to_string(),
        album: None,
        size_bytes: 3,
        mime_type: mime_type.to_string(),
    }
}

#[test]
fn mime_for_path_should_match_extension_case_insensitively() {
    assert_eq!(mime_for_path(Path::new("/music/a.MP3")), "audio/mpeg");
    assert_eq!(mime_for_path(Path::new("b.flac")), "audio/flac");
    assert_eq!(mime_for_path(Path::new("notes")), "application/octet-stream");
    assert_eq!(mime_for_path(Path::new("x.xyz")), "application/octet-stream");
}

#[test]
fn extension_for_mime_should_cover_aliases() {
    assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
    assert_eq!(extension_for_mime("audio/x-wav"), "wav");
    assert_eq!(extension_for_mime("Audio/FLAC"), "flac");
    assert_eq!(extension_for_mime("application/x-unknown"), "bin");
}

#[test]
fn destination_file_name_should_sanitize_and_append_id_prefix() {
    let item = shareable(
        "3f2a9c1e-77aa-4bd0-9e1c-0123456789ab",
        "AC/DC: Back in Black?",
        "audio/mpeg",
    );
    assert_eq!(destination_file_name(&item), "AC_DC_ Back in Black__3f2a9c1e.mp3");
}

#[test]
fn destination_file_name_should_fall_back_for_blank_titles() {
    let item = shareable("abc", " ... ", "audio/flac");
    assert_eq!(destination_file_name(&item), "track_abc.flac");
}

#[test]
fn sanitize_title_should_limit_length() {
    let long = "x".repeat(200);
    assert_eq!(sanitize_title(&long).chars().count(), 80);
}

#[test]
fn resolve_conflict_path_should_number_duplicates() {
    let dir = temp_dir("media-conflict");
    let target = dir.join("song.mp3");
    assert_eq!(resolve_conflict_path(&target), target);

    fs::write(&target, b"a").expect("write original");
    assert_eq!(resolve_conflict_path(&target), dir.join("song (1).mp3"));

    fs::write(dir.join("song (1).mp3"), b"b").expect("write first duplicate");
    assert_eq!(resolve_conflict_path(&target), dir.join("song (2).mp3"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn describe_should_read_size_and_mime() {
    let dir = temp_dir("media-describe");
    let path = dir.join("take five.ogg");
    fs::write(&path, vec![7u8; 42]).expect("write media");

    let local = LocalMediaItem {
        id: "id-1".to_string(),
        path: path.clone(),
        title: "Take Five".to_string(),
        artist: "Dave Brubeck".to_string(),
        album: Some("Time Out".to_string()),
    };
    let described = FsMediaLibrary.describe(&local).expect("describe item");
    assert_eq!(described.size_bytes, 42);
    assert_eq!(described.mime_type, "audio/ogg");
    assert_eq!(described.album.as_deref(), Some("Time Out"));

    let mut bytes = Vec::new();
    FsMediaLibrary
        .open(&local)
        .expect("open item")
        .read_to_end(&mut bytes)
        .expect("read item");
    assert_eq!(bytes.len(), 42);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn describe_should_fail_for_missing_file() {
    let local = LocalMediaItem {
        id: "gone".to_string(),
        path: PathBuf::from("/definitely/not/here.mp3"),
        title: "Gone".to_string(),
        artist: "Nobody".to_string(),
        album: None,
    };
    let error = FsMediaLibrary.describe(&local).expect_err("missing file");
    assert_eq!(error.code, FailureKind::Io.code());
}

#[test]
fn prepare_destination_should_fall_back_to_private_dir() {
    let root = temp_dir("media-fallback");
    let blocker = root.join("blocker");
    fs::write(&blocker, b"file, not a dir").expect("write blocker");

    let mut settings = TransferSettings::defaults_for(&root);
    settings.media_dir = Some(blocker.join("music"));

    let path = FsMediaLibrary
        .prepare_destination(&shareable("abcdef123", "Blue", "audio/mpeg"), &settings)
        .expect("prepare destination");
    assert_eq!(path, root.join("received").join("Blue_abcdef12.mp3"));
    assert!(root.join("received").is_dir());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn prepare_destination_should_use_media_dir_when_available() {
    let root = temp_dir("media-dir");
    let mut settings = TransferSettings::defaults_for(&root);
    settings.media_dir = Some(root.join("music"));

    let path = FsMediaLibrary
        .prepare_destination(&shareable("z9", "So What", "audio/flac"), &settings)
        .expect("prepare destination");
    assert_eq!(path, root.join("music").join("So What_z9.flac"));

    let _ = fs::remove_dir_all(root);
}
