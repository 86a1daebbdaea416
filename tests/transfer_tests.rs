use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;

use secure_transfer::artifacts::ArtifactStore;
use secure_transfer::crypto::cipher::{self, IV_LEN};
use secure_transfer::crypto::KeyStore;
use secure_transfer::storage::models::FileRecord;
use secure_transfer::storage::Database;
use secure_transfer::transfer::{
    self, Access, GroupLookup, RetrieveError,
};

struct TestEnv {
    dir: tempfile::TempDir,
    db: Database,
    keys: KeyStore,
    artifacts: ArtifactStore,
}

fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let keys = KeyStore::new(db.clone());
    let artifacts = ArtifactStore::new(dir.path().join("files")).unwrap();
    TestEnv {
        dir,
        db,
        keys,
        artifacts,
    }
}

impl TestEnv {
    /// Encrypt `content` into storage and insert its record, the way an
    /// upload batch does.
    async fn store_file(
        &self,
        id: &str,
        group_id: &str,
        content: &[u8],
        password: Option<&str>,
        expiration: Option<DateTime<Utc>>,
        relative_path: Option<&str>,
    ) -> FileRecord {
        let key = self.keys.current().await.unwrap();
        let filename = format!("{id}.bin");
        let encrypted = self.artifacts.encrypted_path(&filename);
        cipher::encrypt(content, &encrypted, &key.material)
            .await
            .unwrap();

        let record = FileRecord {
            id: id.to_string(),
            filename,
            original_name: format!("{id}.bin"),
            relative_path: relative_path.map(|s| s.to_string()),
            encrypted_path: encrypted.to_string_lossy().to_string(),
            key_id: key.id,
            expiration,
            email: None,
            group_id: group_id.to_string(),
            password: password.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        self.db.insert_file(&record).unwrap();
        record
    }

    /// Transient plaintext artifacts currently present in storage.
    fn transient_count(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("files"))
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".dec")
            })
            .count()
    }
}

fn in_one_day() -> Option<DateTime<Utc>> {
    Some(Utc::now() + Duration::days(1))
}

async fn collect<S>(mut stream: S) -> Vec<u8>
where
    S: futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin,
{
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

// ============================================================================
// Access gate
// ============================================================================

#[tokio::test]
async fn test_gate_open_group_allows_anything() {
    let env = test_env();
    env.store_file("open", "group-open", b"data", None, in_one_day(), None)
        .await;

    assert_eq!(
        transfer::authorize(&env.db, "group-open", None).unwrap(),
        Access::Allowed
    );
    assert_eq!(
        transfer::authorize(&env.db, "group-open", Some("whatever")).unwrap(),
        Access::Allowed
    );
}

#[tokio::test]
async fn test_gate_requires_exact_match() {
    let env = test_env();
    env.store_file(
        "locked",
        "group-locked",
        b"data",
        Some("abc123"),
        in_one_day(),
        None,
    )
    .await;

    assert_eq!(
        transfer::authorize(&env.db, "group-locked", Some("abc123")).unwrap(),
        Access::Allowed
    );
    assert_eq!(
        transfer::authorize(&env.db, "group-locked", Some("ABC123")).unwrap(),
        Access::Denied,
        "comparison is case-sensitive"
    );
    assert_eq!(
        transfer::authorize(&env.db, "group-locked", None).unwrap(),
        Access::Denied
    );
}

#[tokio::test]
async fn test_gate_unknown_group() {
    let env = test_env();
    assert_eq!(
        transfer::authorize(&env.db, "no-such-group", None).unwrap(),
        Access::GroupNotFound
    );
}

// ============================================================================
// Group resolution
// ============================================================================

#[tokio::test]
async fn test_resolve_not_found() {
    let env = test_env();
    let lookup = transfer::resolve(&env.db, &env.artifacts, "missing", Utc::now())
        .await
        .unwrap();
    assert!(matches!(lookup, GroupLookup::NotFound));
}

#[tokio::test]
async fn test_resolve_all_expired() {
    let env = test_env();
    let past = Some(Utc::now() - Duration::hours(1));
    env.store_file("old", "group-exp", b"data", None, past, None)
        .await;

    let lookup = transfer::resolve(&env.db, &env.artifacts, "group-exp", Utc::now())
        .await
        .unwrap();
    assert!(matches!(lookup, GroupLookup::AllExpired));
}

#[tokio::test]
async fn test_resolve_expiration_boundary() {
    let env = test_env();
    let now = Utc::now();
    env.store_file("edge", "group-edge", b"data", None, Some(now), None)
        .await;

    // expiration == now is already expired
    let lookup = transfer::resolve(&env.db, &env.artifacts, "group-edge", now)
        .await
        .unwrap();
    assert!(matches!(lookup, GroupLookup::AllExpired));

    // one second earlier it is still live
    let lookup = transfer::resolve(
        &env.db,
        &env.artifacts,
        "group-edge",
        now - Duration::seconds(1),
    )
    .await
    .unwrap();
    assert!(matches!(lookup, GroupLookup::Live(_)));
}

#[tokio::test]
async fn test_resolve_filters_and_reports_sizes() {
    let env = test_env();
    env.store_file("live-1", "group-mix", b"hello world", None, in_one_day(), None)
        .await;
    env.store_file(
        "gone-1",
        "group-mix",
        b"expired",
        None,
        Some(Utc::now() - Duration::hours(1)),
        None,
    )
    .await;

    let lookup = transfer::resolve(&env.db, &env.artifacts, "group-mix", Utc::now())
        .await
        .unwrap();
    let GroupLookup::Live(files) = lookup else {
        panic!("expected live set");
    };

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].record.id, "live-1");
    // Reported size is the encrypted artifact: plaintext plus IV prefix
    assert_eq!(files[0].size, (b"hello world".len() + IV_LEN) as u64);
}

#[tokio::test]
async fn test_resolve_missing_artifact_is_size_zero() {
    let env = test_env();
    let record = env
        .store_file("ghost", "group-ghost", b"data", None, in_one_day(), None)
        .await;
    env.artifacts
        .remove(Path::new(&record.encrypted_path))
        .await
        .unwrap();

    let lookup = transfer::resolve(&env.db, &env.artifacts, "group-ghost", Utc::now())
        .await
        .unwrap();
    let GroupLookup::Live(files) = lookup else {
        panic!("missing bytes are not an error at resolution time");
    };
    assert_eq!(files[0].size, 0);
}

// ============================================================================
// Single-file retrieval
// ============================================================================

#[tokio::test]
async fn test_fetch_file_round_trip_and_cleanup() {
    let env = test_env();
    let content = b"attachment body, decrypted on demand";
    env.store_file("dl", "group-dl", content, None, in_one_day(), None)
        .await;

    let download = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "group-dl",
        "dl",
        Utc::now(),
    )
    .await
    .unwrap();

    assert_eq!(download.original_name, "dl.bin");
    assert_eq!(download.content_length, content.len() as u64);
    assert_eq!(env.transient_count(), 1, "plaintext exists while streaming");

    let body = collect(download.stream).await;
    assert_eq!(body, content);

    assert_eq!(env.transient_count(), 0, "stream drop removes the plaintext");
}

#[tokio::test]
async fn test_fetch_file_cleanup_on_early_drop() {
    let env = test_env();
    env.store_file("drop", "group-drop", &[1u8; 100_000], None, in_one_day(), None)
        .await;

    let mut download = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "group-drop",
        "drop",
        Utc::now(),
    )
    .await
    .unwrap();

    // Simulate a client that disconnects after the first chunk
    let _ = download.stream.next().await;
    drop(download);

    assert_eq!(env.transient_count(), 0);
}

#[tokio::test]
async fn test_fetch_file_outcomes() {
    let env = test_env();
    env.store_file(
        "expired",
        "group-out",
        b"data",
        None,
        Some(Utc::now() - Duration::hours(1)),
        None,
    )
    .await;
    let missing = env
        .store_file("hollow", "group-out", b"data", None, in_one_day(), None)
        .await;
    env.artifacts
        .remove(Path::new(&missing.encrypted_path))
        .await
        .unwrap();

    let gone = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "group-out",
        "expired",
        Utc::now(),
    )
    .await;
    assert!(matches!(gone, Err(RetrieveError::Gone)));

    let absent = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "group-out",
        "hollow",
        Utc::now(),
    )
    .await;
    assert!(matches!(absent, Err(RetrieveError::ArtifactMissing)));

    let unknown = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "group-out",
        "nope",
        Utc::now(),
    )
    .await;
    assert!(matches!(unknown, Err(RetrieveError::NotFound)));

    let wrong_group = transfer::fetch_file(
        &env.db,
        &env.keys,
        &env.artifacts,
        "other-group",
        "expired",
        Utc::now(),
    )
    .await;
    assert!(matches!(wrong_group, Err(RetrieveError::NotFound)));

    assert_eq!(env.transient_count(), 0, "failed fetches leave nothing behind");
}

#[tokio::test]
async fn test_fetch_legacy_enforces_expiration_without_gate() {
    let env = test_env();
    let content = b"pre-group link";
    // Password-gated group: the legacy path ignores the gate entirely
    env.store_file(
        "legacy",
        "group-legacy",
        content,
        Some("secret"),
        in_one_day(),
        None,
    )
    .await;

    let download =
        transfer::fetch_legacy(&env.db, &env.keys, &env.artifacts, "legacy.bin", Utc::now())
            .await
            .unwrap();
    let body = collect(download.stream).await;
    assert_eq!(body, content);
    assert_eq!(env.transient_count(), 0);

    env.store_file(
        "stale",
        "group-stale",
        content,
        None,
        Some(Utc::now() - Duration::hours(1)),
        None,
    )
    .await;
    let gone =
        transfer::fetch_legacy(&env.db, &env.keys, &env.artifacts, "stale.bin", Utc::now()).await;
    assert!(matches!(gone, Err(RetrieveError::Gone)));
}

// ============================================================================
// Zip bundles
// ============================================================================

async fn live_set(env: &TestEnv, group_id: &str) -> Vec<transfer::LiveFile> {
    match transfer::resolve(&env.db, &env.artifacts, group_id, Utc::now())
        .await
        .unwrap()
    {
        GroupLookup::Live(files) => files,
        other => panic!("expected live set, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bundle_streams_all_entries() {
    let env = test_env();
    env.store_file("z1", "group-zip", b"first file", None, in_one_day(), None)
        .await;
    env.store_file("z2", "group-zip", b"second file", None, in_one_day(), None)
        .await;
    env.store_file(
        "z3",
        "group-zip",
        b"nested file",
        None,
        in_one_day(),
        Some("docs/nested/z3.bin"),
    )
    .await;

    let live = live_set(&env, "group-zip").await;
    let bundle = transfer::fetch_bundle(&env.keys, &env.artifacts, &live)
        .await
        .unwrap();

    let archive = collect(bundle.stream).await;

    // Local file header magic, then the entry names stored verbatim
    assert_eq!(&archive[..4], b"PK\x03\x04");
    let contains = |needle: &[u8]| archive.windows(needle.len()).any(|w| w == needle);
    assert!(contains(b"z1.bin"));
    assert!(contains(b"z2.bin"));
    assert!(contains(b"docs/nested/z3.bin"));

    assert_eq!(env.transient_count(), 0, "bundle cleanup is exhaustive");
}

#[tokio::test]
async fn test_bundle_aborts_when_any_artifact_is_missing() {
    let env = test_env();
    env.store_file("ok-1", "group-part", b"present", None, in_one_day(), None)
        .await;
    let missing = env
        .store_file("ok-2", "group-part", b"absent", None, in_one_day(), None)
        .await;
    env.artifacts
        .remove(Path::new(&missing.encrypted_path))
        .await
        .unwrap();

    let live = live_set(&env, "group-part").await;
    let result = transfer::fetch_bundle(&env.keys, &env.artifacts, &live).await;

    // A partial bundle is never produced: no output, no leftovers
    assert!(matches!(result, Err(RetrieveError::ArtifactMissing)));
    assert_eq!(env.transient_count(), 0);
}

#[tokio::test]
async fn test_bundle_cleanup_on_client_disconnect() {
    let env = test_env();
    env.store_file(
        "big-1",
        "group-cut",
        &[7u8; 300_000],
        None,
        in_one_day(),
        None,
    )
    .await;
    env.store_file(
        "big-2",
        "group-cut",
        &[9u8; 300_000],
        None,
        in_one_day(),
        None,
    )
    .await;

    let live = live_set(&env, "group-cut").await;
    let mut bundle = transfer::fetch_bundle(&env.keys, &env.artifacts, &live)
        .await
        .unwrap();

    // Read a little, then hang up
    let _ = bundle.stream.next().await;
    drop(bundle);

    assert_eq!(env.transient_count(), 0);

    // Give the aborted writer task a moment; it must not resurrect anything
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(env.transient_count(), 0);
}

#[tokio::test]
async fn test_concurrent_bundles_use_private_transients() {
    let env = test_env();
    env.store_file("shared", "group-con", b"same artifact", None, in_one_day(), None)
        .await;

    let live = live_set(&env, "group-con").await;
    let first = transfer::fetch_bundle(&env.keys, &env.artifacts, &live)
        .await
        .unwrap();
    let second = transfer::fetch_bundle(&env.keys, &env.artifacts, &live)
        .await
        .unwrap();

    // Two in-flight requests, two private transient files
    assert_eq!(env.transient_count(), 2);

    let a = collect(first.stream).await;
    let b = collect(second.stream).await;
    assert_eq!(&a[..4], b"PK\x03\x04");
    assert_eq!(&b[..4], b"PK\x03\x04");

    assert_eq!(env.transient_count(), 0);
}
