//! Integration tests for shared items: temporary blobs, publishing, cache
//! adoption and download tracking.

mod support;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fileshare_core::sharing::{
    CacheContent, FILE_TTL, FileDescriptor, META_LINK, META_TYPE, META_URIS, Metadata,
};
use fileshare_core::{
    ByteRange, ContentIdentity, FileCache, FileSharingManager, FileType, OfflinePeers,
    ShareAdvertisement, ShareError,
};
use serde_json::json;
use support::fakes::{FakePeerNetwork, FakeUploader, peer, sharing_context};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const JULIET: &str = "juliet@capulet.lit/balcony";
const ROMEO: &str = "romeo@montague.lit/orchard";

fn manager(root: &TempDir) -> FileSharingManager {
    FileSharingManager::new(sharing_context(root.path(), Arc::new(OfflinePeers)))
}

fn advertisement(content: &[u8], name: Option<&str>, sources: Vec<String>) -> ShareAdvertisement {
    let mut file = FileDescriptor::new(ContentIdentity::of_bytes(content));
    file.name = name.map(str::to_string);
    file.size = Some(content.len() as u64);
    file.mime_type = Some("text/plain".to_string());
    ShareAdvertisement { file, sources }
}

#[test]
fn test_temporary_share_is_deleted_when_released() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);

    let item = manager
        .share_bytes("text/plain", b"scratch notes", Metadata::new())
        .unwrap();
    assert_eq!(item.file_type(), FileType::TempFile);
    assert_eq!(item.size(), Some(13));
    let blob = item.path().unwrap().to_path_buf();
    let key = item.key();

    assert!(blob.exists());
    assert!(blob.starts_with(root.path().join("tmp")));
    let name = item.display_name();
    assert!(
        name.starts_with("share-") && name.ends_with(".txt"),
        "Expected share-*.txt in: {name}"
    );

    assert!(manager.release(&key));
    assert!(!blob.exists());
    assert!(!manager.release(&key));
}

#[test]
fn test_sharing_same_bytes_twice_keeps_one_blob() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);

    let first = manager
        .share_bytes("text/plain", b"same", Metadata::new())
        .unwrap()
        .path()
        .unwrap()
        .to_path_buf();
    let second = manager
        .share_bytes("text/plain", b"same", Metadata::new())
        .unwrap()
        .path()
        .unwrap()
        .to_path_buf();

    assert_eq!(manager.len(), 1);
    assert_eq!(first, second);
    assert!(first.exists());
    let blobs = std::fs::read_dir(root.path().join("tmp")).unwrap().count();
    assert_eq!(blobs, 1);
}

#[tokio::test]
async fn test_published_temporary_share_moves_into_cache() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let item = manager
        .share_bytes("text/plain", b"keep me", Metadata::new())
        .unwrap();
    let temp_blob = item.path().unwrap().to_path_buf();

    item.publish().await.unwrap();

    let flags = item.flags();
    assert!(flags.http_finished && flags.peer_stream_finished && flags.publish_notified);
    assert_eq!(item.file_type(), FileType::LocalFile);
    let cached = item.path().unwrap().to_path_buf();
    assert_eq!(cached, root.path().join("cache").join(item.key()));
    assert!(!temp_blob.exists());

    let key = item.key();
    let entry = manager
        .context()
        .cache
        .lookup(&ContentIdentity::of_bytes(b"keep me"))
        .unwrap();
    assert_eq!(entry.meta_str(META_TYPE), Some("text/plain"));

    // the cache owns the blob now
    manager.release(&key);
    assert_eq!(std::fs::read(&cached).unwrap(), b"keep me");
}

#[tokio::test]
async fn test_publish_with_upload_service_records_url() {
    let root = TempDir::new().unwrap();
    let uploader = Arc::new(FakeUploader::succeeding("https://upload.example/d/notes.txt"));
    let ctx = sharing_context(root.path(), Arc::new(OfflinePeers)).with_uploader(uploader.clone());
    let mut manager = FileSharingManager::new(ctx);

    let local = root.path().join("notes.txt");
    std::fs::write(&local, b"linked file").unwrap();
    let item = manager.share_file(&local).unwrap();
    assert_eq!(item.file_type(), FileType::LocalLink);
    assert_eq!(item.mime_type(), "text/plain");

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    item.set_publish_progress(progress_tx);
    item.publish().await.unwrap();

    assert_eq!(uploader.calls(), 1);
    assert_eq!(progress_rx.recv().await, Some(11));
    assert_eq!(item.sources(), ["https://upload.example/d/notes.txt"]);
    assert_eq!(item.log(), ["Published on HTTP upload service"]);
    assert_eq!(item.file_type(), FileType::LocalLink);
    assert_eq!(item.path(), Some(local.as_path()));

    let entry = manager
        .context()
        .cache
        .lookup(&ContentIdentity::of_bytes(b"linked file"))
        .unwrap();
    assert_eq!(
        entry.meta_str(META_LINK).map(str::to_string),
        Some(local.to_string_lossy().into_owned())
    );
    assert_eq!(
        entry.metadata.get(META_URIS),
        Some(&json!(["https://upload.example/d/notes.txt"]))
    );
}

#[tokio::test]
async fn test_failed_upload_is_logged_and_publish_completes() {
    let root = TempDir::new().unwrap();
    let uploader = Arc::new(FakeUploader::failing("413 Payload Too Large"));
    let ctx = sharing_context(root.path(), Arc::new(OfflinePeers)).with_uploader(uploader.clone());
    let mut manager = FileSharingManager::new(ctx);

    let item = manager
        .share_bytes("text/plain", b"too big", Metadata::new())
        .unwrap();
    item.publish().await.unwrap();

    assert_eq!(uploader.calls(), 1);
    assert_eq!(
        item.log(),
        ["Failed to publish on HTTP upload service: 413 Payload Too Large"]
    );
    assert!(item.sources().is_empty());
    assert!(item.flags().publish_notified);
    assert_eq!(item.file_type(), FileType::LocalFile);
}

#[tokio::test]
async fn test_unavailable_upload_service_is_skipped() {
    let root = TempDir::new().unwrap();
    let uploader = Arc::new(FakeUploader::unavailable());
    let ctx = sharing_context(root.path(), Arc::new(OfflinePeers)).with_uploader(uploader.clone());
    let mut manager = FileSharingManager::new(ctx);

    let item = manager
        .share_bytes("text/plain", b"offline", Metadata::new())
        .unwrap();
    item.publish().await.unwrap();

    assert_eq!(uploader.calls(), 0);
    assert!(item.log().is_empty());
    assert!(item.flags().publish_notified);
}

#[tokio::test]
async fn test_remote_item_cannot_be_published() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let item = manager.receive_advertisement(
        &advertisement(b"remote", Some("r.txt"), vec!["https://h/r.txt".to_string()]),
        peer(ROMEO),
    );
    assert_eq!(item.file_type(), FileType::RemoteFile);
    assert_eq!(item.peers(), [peer(ROMEO)]);

    let err = item.publish().await.unwrap_err();
    assert!(matches!(err, ShareError::RemoteItem { .. }));
}

#[test]
fn test_cached_item_marks_published_paths_finished() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let identity = ContentIdentity::of_bytes(b"cached");
    let mut meta = Metadata::new();
    meta.insert(META_TYPE.to_string(), json!("text/plain"));
    meta.insert(
        META_URIS.to_string(),
        json!(["https://h/cached.txt", format!("xmpp:{JULIET}?jingle-ft")]),
    );
    let entry = manager
        .context()
        .cache
        .store(&identity, CacheContent::Bytes(b"cached"), meta, FILE_TTL)
        .unwrap();

    let item = manager.from_cache(&entry);
    assert_eq!(item.file_type(), FileType::LocalFile);
    assert_eq!(item.size(), Some(6));
    let flags = item.flags();
    assert!(flags.size_known && flags.publish_notified);
    assert!(flags.http_finished && flags.peer_stream_finished);
    assert_eq!(item.sources().len(), 2);
    assert_eq!(std::fs::read(item.path().unwrap()).unwrap(), b"cached");
}

#[test]
fn test_advertisement_of_cached_content_is_local() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let content = b"already here";
    manager
        .context()
        .cache
        .store(
            &ContentIdentity::of_bytes(content),
            CacheContent::Bytes(content),
            Metadata::new(),
            FILE_TTL,
        )
        .unwrap();

    let item = manager.receive_advertisement(
        &advertisement(content, Some("here.txt"), vec!["cid:x".to_string()]),
        peer(ROMEO),
    );
    assert_eq!(item.file_type(), FileType::LocalFile);
    assert!(item.path().unwrap().exists());
    assert!(!item.is_downloading());
}

#[tokio::test]
async fn test_advertisement_lists_own_peer_stream_source_first() {
    let root = TempDir::new().unwrap();
    let network = Arc::new(FakePeerNetwork::new().with_local(JULIET));
    let uploader = Arc::new(FakeUploader::succeeding("https://upload.example/d/a.txt"));
    let ctx = sharing_context(root.path(), network).with_uploader(uploader);
    let mut manager = FileSharingManager::new(ctx);

    let item = manager
        .share_bytes("text/plain", b"advertised", Metadata::new())
        .unwrap();
    item.set_description("for romeo");
    item.publish().await.unwrap();

    let advertisement = item.to_advertisement().unwrap();
    assert_eq!(
        advertisement.sources,
        vec![
            format!("xmpp:{JULIET}?jingle-ft"),
            "https://upload.example/d/a.txt".to_string(),
        ]
    );
    assert_eq!(advertisement.file.size, Some(10));
    assert_eq!(advertisement.file.description.as_deref(), Some("for romeo"));
    assert_eq!(advertisement.file.mime_type.as_deref(), Some("text/plain"));
    assert_eq!(advertisement.file.hashes, ContentIdentity::of_bytes(b"advertised"));
}

#[test]
fn test_no_advertisement_without_online_resource() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let item = manager
        .share_bytes("text/plain", b"quiet", Metadata::new())
        .unwrap();
    assert!(item.to_advertisement().is_none());
}

#[test]
fn test_display_name_falls_back_to_hash() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let mut advert = advertisement(b"nameless", None, vec!["cid:n".to_string()]);
    advert.file.mime_type = Some("image/png".to_string());

    let item = manager.receive_advertisement(&advert, peer(ROMEO));
    let hex = ContentIdentity::of_bytes(b"nameless").primary_hex();
    assert_eq!(item.display_name(), format!("share-{hex}.png"));
}

#[test]
fn test_simple_source_only_for_plain_urls() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);

    let item = manager.receive_advertisement(
        &advertisement(
            b"a",
            Some("a.png"),
            vec!["https://h/a.png".to_string(), "cid:abc".to_string()],
        ),
        peer(ROMEO),
    );
    assert!(item.simple_source().is_none());

    let item = manager.receive_advertisement(
        &advertisement(b"b", Some("b.png"), vec!["https://h/b.png".to_string()]),
        peer(ROMEO),
    );
    assert_eq!(
        item.simple_source().map(String::from),
        Some("https://h/b.png".to_string())
    );
}

#[tokio::test]
async fn test_completed_download_is_adopted_by_cache() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let content = b"downloaded body";
    Mock::given(method("GET"))
        .and(path("/f.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&server)
        .await;
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);

    let modified = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let mut advert = advertisement(content, Some("f.txt"), vec![format!("{}/f.txt", server.uri())]);
    advert.file.modified = Some(modified);
    let item = manager.receive_advertisement(&advert, peer(ROMEO));

    let downloader = item.download(None);
    assert!(item.is_downloading());
    let downloaded = downloader.read_to_end().await.unwrap();
    assert_eq!(downloaded, root.path().join("downloads").join("f.txt"));

    let outcome = item.download_finished().await.unwrap().unwrap();
    assert!(outcome.success);
    assert!(!item.is_downloading());
    assert_eq!(item.file_type(), FileType::LocalFile);
    assert!(item.flags().publish_notified);
    assert!(item.flags().http_finished);

    let cached = item.path().unwrap();
    assert_eq!(cached, root.path().join("cache").join(item.key()));
    assert_eq!(std::fs::read(cached).unwrap(), content);
    assert!(!downloaded.exists());
    let mtime: SystemTime = std::fs::metadata(cached).unwrap().modified().unwrap();
    assert_eq!(mtime, modified);
}

#[tokio::test]
async fn test_only_one_full_download_is_tracked() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let item = manager.receive_advertisement(
        &advertisement(b"0123456789", Some("digits.txt"), vec!["cid:digits".to_string()]),
        peer(ROMEO),
    );

    let first = item.download(None);
    assert!(item.is_downloading());
    let second = item.download(None);
    drop(second);
    assert!(item.is_downloading());

    let err = first.read_to_end().await.unwrap_err();
    assert!(err.to_string().contains("offline"), "Expected offline in: {err}");

    let outcome = item.download_finished().await.unwrap().unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Store-and-forward data source is offline")
    );
    assert_eq!(item.file_type(), FileType::RemoteFile);
    assert!(item.download_finished().await.unwrap().is_none());
}

#[test]
fn test_range_download_is_not_tracked_unless_whole_size() {
    let root = TempDir::new().unwrap();
    let mut manager = manager(&root);
    let item = manager.receive_advertisement(
        &advertisement(b"0123456789", Some("digits.txt"), vec!["cid:digits".to_string()]),
        peer(ROMEO),
    );

    let partial = item.download(Some(ByteRange::new(0, 5)));
    assert!(partial.is_ranged());
    assert!(!item.is_downloading());

    let whole = item.download(Some(ByteRange::new(0, 10)));
    assert!(!whole.is_ranged());
    assert_eq!(whole.range(), ByteRange::WHOLE);
    assert!(item.is_downloading());
}
