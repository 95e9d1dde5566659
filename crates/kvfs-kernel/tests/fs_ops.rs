//! Filesystem operations end to end over the in-memory and SQLite backends.

use std::sync::Arc;

use kvfs_kernel::{
    FileSystem, FsError, InodeId, KvFs, MemoryKv, OpenFlags, RetryPolicy, SqliteKv, ensure_root,
};
use tempfile::TempDir;

async fn formatted() -> (Arc<MemoryKv>, KvFs) {
    let kv = Arc::new(MemoryKv::new());
    ensure_root(kv.as_ref()).await.unwrap();
    let fs = KvFs::with_policy(kv.clone(), RetryPolicy::immediate(8));
    (kv, fs)
}

#[tokio::test]
async fn test_walkthrough() {
    let (_kv, fs) = formatted().await;

    fs.mkdir("/a", 0o755).await.unwrap();
    let root = fs.open("/").await.unwrap();
    assert_eq!(root.read_dir_names().unwrap(), vec!["a"]);
    let a = fs.stat("/a").await.unwrap();

    assert!(matches!(fs.mkdir("/a", 0o755).await, Err(FsError::AlreadyExists(_))));

    assert!(a.is_dir());
    assert_eq!(a.permissions, 0o755);
    assert_eq!(a.name, "a");

    fs.rename("/a", "/b").await.unwrap();
    assert!(matches!(fs.stat("/a").await, Err(FsError::NotFound(_))));
    let b = fs.stat("/b").await.unwrap();
    assert!(b.is_dir());
    assert_eq!(b.id, a.id);

    fs.remove("/b").await.unwrap();
    assert!(matches!(fs.stat("/b").await, Err(FsError::NotFound(_))));
}

#[tokio::test]
async fn test_unformatted_namespace() {
    let fs = KvFs::new(Arc::new(MemoryKv::new()));
    assert!(matches!(fs.stat("/").await, Err(FsError::NotFound(_))));
    assert!(matches!(fs.mkdir("/a", 0o755).await, Err(FsError::NotFound(_))));
}

#[tokio::test]
async fn test_paths_are_cleaned() {
    let (_kv, fs) = formatted().await;
    fs.mkdir("a", 0o755).await.unwrap();
    fs.mkdir("/a/./b/", 0o755).await.unwrap();
    fs.mkdir("//a/b/../c", 0o755).await.unwrap();

    let names = fs.open("/a").await.unwrap().read_dir_names().unwrap();
    assert_eq!(names, vec!["b", "c"]);
    assert!(fs.exists("/../a/c").await);
}

#[tokio::test]
async fn test_file_in_the_way() {
    let (_kv, fs) = formatted().await;
    fs.create("/f").await.unwrap();

    assert!(matches!(fs.mkdir("/f/x", 0o755).await, Err(FsError::NotADirectory(p)) if p == "/f"));
    assert!(matches!(fs.stat("/f/x").await, Err(FsError::NotADirectory(p)) if p == "/f"));
    assert!(matches!(fs.mkdir_all("/f/g/h", 0o755).await, Err(FsError::NotADirectory(p)) if p == "/f"));
    assert!(matches!(
        fs.open("/f").await.unwrap().read_dir_names(),
        Err(FsError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn test_mkdir_all() {
    let (kv, fs) = formatted().await;
    fs.mkdir("/p", 0o700).await.unwrap();

    fs.mkdir_all("/p/q/r", 0o755).await.unwrap();
    fs.mkdir_all("/p/q/r", 0o755).await.unwrap();
    fs.mkdir_all("/", 0o755).await.unwrap();

    assert!(fs.stat("/p/q/r").await.unwrap().is_dir());
    // Existing directories keep their mode.
    assert_eq!(fs.stat("/p").await.unwrap().permissions, 0o700);
    assert_eq!(kv.len(), 4);
}

#[tokio::test]
async fn test_remove_rules() {
    let (kv, fs) = formatted().await;
    fs.mkdir_all("/p/q", 0o755).await.unwrap();

    assert!(matches!(fs.remove("/p").await, Err(FsError::DirectoryNotEmpty(_))));
    assert!(fs.stat("/p/q").await.is_ok());

    assert!(matches!(fs.remove("/missing").await, Err(FsError::NotFound(_))));
    assert!(matches!(fs.remove("/").await, Err(FsError::InvalidPath(_))));

    fs.remove("/p/q").await.unwrap();
    fs.remove("/p").await.unwrap();
    assert_eq!(kv.keys(), vec![InodeId::ROOT.to_key()]);
}

#[tokio::test]
async fn test_rename_rules() {
    let (_kv, fs) = formatted().await;
    fs.mkdir_all("/p/q/r", 0o755).await.unwrap();
    fs.mkdir("/x", 0o755).await.unwrap();

    // Into its own subtree.
    assert!(matches!(fs.rename("/p", "/p/q/z").await, Err(FsError::InvalidPath(_))));
    // Target taken.
    assert!(matches!(fs.rename("/p", "/x").await, Err(FsError::AlreadyExists(_))));
    assert!(fs.stat("/p/q/r").await.is_ok());
    // Missing source, root.
    assert!(matches!(fs.rename("/nope", "/y").await, Err(FsError::NotFound(_))));
    assert!(matches!(fs.rename("/", "/y").await, Err(FsError::InvalidPath(_))));
    assert!(matches!(fs.rename("/x", "/").await, Err(FsError::InvalidPath(_))));

    // Same directory.
    fs.rename("/p/q", "/p/q2").await.unwrap();
    let names = fs.open("/p").await.unwrap().read_dir_names().unwrap();
    assert_eq!(names, vec!["q2"]);

    // Across directories, subtree comes along.
    fs.rename("/p/q2", "/x/q").await.unwrap();
    assert!(fs.stat("/x/q/r").await.unwrap().is_dir());
    assert!(fs.open("/p").await.unwrap().read_dir_names().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_and_open_file() {
    let (_kv, fs) = formatted().await;

    let file = fs.create("/notes").await.unwrap();
    let meta = file.metadata();
    assert!(meta.is_file());
    assert_eq!(meta.permissions, 0o666);
    assert_eq!(meta.len(), 0);
    assert_eq!(file.name(), "/notes");

    // Re-create keeps the inode.
    let again = fs.create("/notes").await.unwrap();
    assert_eq!(again.id(), file.id());

    fs.mkdir("/dir", 0o755).await.unwrap();
    assert!(matches!(fs.create("/dir").await, Err(FsError::IsADirectory(_))));

    assert!(matches!(
        fs.open_file("/notes", OpenFlags::create_exclusive(), 0o600).await,
        Err(FsError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.open_file("/absent", OpenFlags::write(), 0o600).await,
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(
        fs.open_file("/nodir/x", OpenFlags::create(), 0o600).await,
        Err(FsError::NotFound(_))
    ));

    let private = fs
        .open_file("/private", OpenFlags::create_exclusive(), 0o600)
        .await
        .unwrap();
    assert_eq!(private.metadata().permissions, 0o600);

    let listing = fs.read_dir("/").await.unwrap();
    let names: Vec<&str> = listing.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["dir", "notes", "private"]);
    assert!(listing[0].is_dir());
}

#[tokio::test]
async fn test_remove_all() {
    let (kv, fs) = formatted().await;
    fs.mkdir_all("/t/a/b", 0o755).await.unwrap();
    fs.create("/t/a/file").await.unwrap();
    fs.create("/t/top").await.unwrap();
    fs.mkdir("/keep", 0o755).await.unwrap();
    assert_eq!(kv.len(), 7);

    fs.remove_all("/t").await.unwrap();
    assert!(!fs.exists("/t").await);
    assert_eq!(kv.len(), 2);

    fs.remove_all("/t").await.unwrap();
    fs.remove_all("/missing/deeper").await.unwrap();
    assert!(matches!(fs.remove_all("/").await, Err(FsError::InvalidPath(_))));
}

#[tokio::test]
async fn test_chmod() {
    let (_kv, fs) = formatted().await;
    fs.create("/f").await.unwrap();

    fs.chmod("/f", 0o100_640).await.unwrap();
    assert_eq!(fs.stat("/f").await.unwrap().mode(), 0o640);

    fs.chmod("/", 0o711).await.unwrap();
    assert_eq!(fs.stat("/").await.unwrap().permissions, 0o711);

    assert!(matches!(fs.chmod("/nope", 0o600).await, Err(FsError::NotFound(_))));
}

#[tokio::test]
async fn test_sqlite_namespace_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kvfs.db");

    {
        let kv = Arc::new(SqliteKv::open(&path).unwrap());
        assert!(ensure_root(kv.as_ref()).await.unwrap());
        let fs = KvFs::new(kv);
        fs.mkdir_all("/srv/data", 0o750).await.unwrap();
        fs.create("/srv/data/index").await.unwrap();
    }

    let kv = Arc::new(SqliteKv::open(&path).unwrap());
    assert!(!ensure_root(kv.as_ref()).await.unwrap());
    let fs = KvFs::new(kv);
    assert_eq!(fs.stat("/srv/data").await.unwrap().permissions, 0o750);
    assert!(fs.stat("/srv/data/index").await.unwrap().is_file());
}
