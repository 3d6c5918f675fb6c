//! Integration tests for the crydrv storage engine
//!
//! These tests drive the key hierarchy and the blob store together, the way
//! the server does for one user.

use crydrv_cli::config::Registration;
use crydrv_cli::{AuthError, Authenticator, Credentials, GatewayConfig};
use crydrv_crypto::{
    keys::{derive_fingerprint, derive_password_key, derive_storage_name, derive_user_salt},
    ContentKey, KdfParams, RootSecret, UserSalt,
};
use crydrv_store::{storage_path, BlobFormat, BlobStore, StoreError};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

const PASSWORD: &str = "correcthorsebatterystaple";

fn cheap_params() -> KdfParams {
    KdfParams {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

struct User {
    salt: UserSalt,
    key: ContentKey,
}

impl User {
    fn login(root: &RootSecret, username: &str, password: &str) -> Self {
        let salt = derive_user_salt(root, username);
        let key = derive_password_key(password, &salt, &cheap_params()).unwrap();
        Self { salt, key }
    }

    fn path(&self, namespace: &Path, logical: &str) -> PathBuf {
        storage_path(namespace, &derive_storage_name(&self.key, &self.salt, logical))
    }
}

fn read_all(store: &BlobStore, path: &Path, key: &ContentKey) -> Result<Vec<u8>, StoreError> {
    let mut reader = store.open_for_read(path, key)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// Write, read back, fail with the wrong key, delete
#[test]
fn test_alice_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = RootSecret::generate();
    let store = BlobStore::new(BlobFormat::default());

    let alice = User::login(&root, "alice", PASSWORD);
    let path = alice.path(dir.path(), "/notes.txt");

    store
        .write_all(&path, &mut &b"hello"[..], 5, &alice.key)
        .unwrap();
    assert_eq!(read_all(&store, &path, &alice.key).unwrap(), b"hello");

    // the file name on disk reveals nothing about the logical path
    let on_disk = path.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned();
    assert!(!on_disk.contains("notes"));

    // a wrong key aimed at the same blob is caught by the tags
    let wrong = User::login(&root, "alice", "correcthorsebatterystapler");
    assert!(matches!(
        read_all(&store, &path, &wrong.key),
        Err(StoreError::Integrity)
    ));
    // and through its own naming it does not even find the blob
    assert!(matches!(
        read_all(&store, &wrong.path(dir.path(), "/notes.txt"), &wrong.key),
        Err(StoreError::NotFound)
    ));

    store.delete(&path).unwrap();
    assert!(matches!(
        read_all(&store, &path, &alice.key),
        Err(StoreError::NotFound)
    ));
    assert!(store.locks().is_empty());
}

/// Closed registration: only the allowlisted password opens the namespace
#[test]
fn test_alice_closed_registration_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::new(BlobFormat::default());
    let mut config = GatewayConfig {
        data_dir: dir.path().to_path_buf(),
        registration: Registration::Open,
        min_password_length: 8,
        kdf_params: cheap_params(),
        ..Default::default()
    };

    // learn alice's fingerprint, then allow only her
    let fingerprint = Authenticator::new(&config)
        .authenticate(&Credentials::new("alice", "correcthorse"))
        .unwrap()
        .fingerprint;
    config.registration = Registration::Closed([fingerprint].into_iter().collect());
    let auth = Authenticator::new(&config);

    let alice = auth
        .authenticate(&Credentials::new("alice", "correcthorse"))
        .unwrap();
    assert_eq!(alice.namespace, dir.path());
    let path = alice.storage_path("/notes.txt");
    store
        .write_all(&path, &mut &b"hello"[..], 5, &alice.key)
        .unwrap();

    // refused at login, before any blob is touched
    assert!(matches!(
        auth.authenticate(&Credentials::new("alice", "wrongpassword")),
        Err(AuthError::Forbidden)
    ));
    assert!(store.locks().is_empty());
    assert_eq!(read_all(&store, &path, &alice.key).unwrap(), b"hello");
}

/// Same credentials and root secret give the same names and fingerprint
#[test]
fn test_login_is_reproducible() {
    let root = RootSecret::generate();
    let first = User::login(&root, "alice", PASSWORD);
    let again = User::login(&root, "alice", PASSWORD);
    let namespace = Path::new("/srv/www");

    assert_eq!(first.key, again.key);
    assert_eq!(
        derive_fingerprint(&first.key, &first.salt),
        derive_fingerprint(&again.key, &again.salt)
    );
    assert_eq!(
        first.path(namespace, "/a/b.txt"),
        again.path(namespace, "/a/b.txt")
    );

    // a session token resolves to the same key
    let from_token = ContentKey::from_token(first.key.to_token().as_str()).unwrap();
    assert_eq!(from_token, first.key);

    // another server secret is another world
    let elsewhere = User::login(&RootSecret::generate(), "alice", PASSWORD);
    assert_ne!(elsewhere.key, first.key);
}

/// Multi-block file with random access
#[test]
fn test_large_file_random_access() {
    let dir = tempfile::tempdir().unwrap();
    let root = RootSecret::generate();
    let store = BlobStore::new(BlobFormat::with_block_size(4096).unwrap());
    let alice = User::login(&root, "alice", PASSWORD);
    let path = alice.path(dir.path(), "/big.bin");

    let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
    store
        .write_all(&path, &mut data.as_slice(), data.len() as u64, &alice.key)
        .unwrap();

    let mut reader = store.open_for_read(&path, &alice.key).unwrap();
    assert_eq!(reader.total_size(), data.len() as u64);
    assert_eq!(reader.block_count(), 13);

    for start in [0u64, 4095, 4096, 20_000, 49_999] {
        reader.seek(SeekFrom::Start(start)).unwrap();
        let mut buf = vec![0u8; 100];
        let mut got = Vec::new();
        while got.len() < 100 {
            let n = reader.read(&mut buf[..100 - got.len()]).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        let end = (start as usize + 100).min(data.len());
        assert_eq!(got, &data[start as usize..end], "start {start}");
    }
}

/// Readers and writers on one path never observe a torn file
#[test]
fn test_concurrent_readers_and_writer() {
    let dir = tempfile::tempdir().unwrap();
    let root = RootSecret::generate();
    let store = Arc::new(BlobStore::new(BlobFormat::with_block_size(1024).unwrap()));
    let alice = Arc::new(User::login(&root, "alice", PASSWORD));
    let path = alice.path(dir.path(), "/shared.txt");

    let version_a = vec![b'a'; 10_000];
    let version_b = vec![b'b'; 7_000];
    store
        .write_all(&path, &mut version_a.as_slice(), version_a.len() as u64, &alice.key)
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        let alice = Arc::clone(&alice);
        let path = path.clone();
        let (a, b) = (version_a.clone(), version_b.clone());
        handles.push(thread::spawn(move || {
            for round in 0..20 {
                if i == 0 {
                    let next = if round % 2 == 0 { &b } else { &a };
                    store
                        .write_all(&path, &mut next.as_slice(), next.len() as u64, &alice.key)
                        .unwrap();
                } else {
                    let content = read_all(&store, &path, &alice.key).unwrap();
                    assert!(content == a || content == b, "torn read");
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(store.locks().is_empty());
}
