use depot_storage::stream::IoAdapter;
use depot_storage::{FileMode, FileSystemStorageProvider, StorageError, StorageProvider, Stream};
use std::io::{Read, Write};
use tempfile::TempDir;

fn connect(temp: &TempDir) -> FileSystemStorageProvider {
    FileSystemStorageProvider::builder().root(temp.path().join("depot")).connect_blocking().unwrap()
}

#[test]
fn test_path_traversal_blocked() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    for path in ["../etc/passwd", "foo/../../bar", r"..\outside.txt"] {
        assert!(
            matches!(provider.resolve(path), Err(StorageError::PathTraversalAttempt { .. })),
            "{path} must be rejected"
        );
    }
    assert!(matches!(
        provider.write_data("../escape.txt", FileMode::Create, b"x"),
        Err(StorageError::PathTraversalAttempt { .. })
    ));
    assert!(!temp.path().join("escape.txt").exists());
}

#[test]
fn test_absolute_paths_are_root_relative() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    provider.write_data("/top.txt", FileMode::CreateNew, b"abs").unwrap();
    assert_eq!(provider.read_data("top.txt").unwrap(), b"abs");
    assert_eq!(provider.resolve("/top.txt").unwrap(), provider.root_dir().join("top.txt"));
}

#[test]
fn test_write_modes() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    provider.write_data("a.txt", FileMode::CreateNew, b"one").unwrap();
    assert!(matches!(
        provider.write_data("a.txt", FileMode::CreateNew, b"two"),
        Err(StorageError::AlreadyExists { .. })
    ));
    assert_eq!(provider.read_data("a.txt").unwrap(), b"one");

    provider.write_data("a.txt", FileMode::Create, b"two").unwrap();
    assert_eq!(provider.read_data("a.txt").unwrap(), b"two");

    provider.write_data("a.txt", FileMode::Truncate, b"3").unwrap();
    assert_eq!(provider.read_data("a.txt").unwrap(), b"3");
    assert!(matches!(
        provider.write_data("missing.txt", FileMode::Truncate, b"x"),
        Err(StorageError::FileNotFound { .. })
    ));

    provider.write_data("a.txt", FileMode::Append, b"45").unwrap();
    assert_eq!(provider.read_data("a.txt").unwrap(), b"345");

    for mode in [FileMode::Open, FileMode::OpenOrCreate] {
        assert!(matches!(
            provider.write_data("b.txt", mode, b"x"),
            Err(StorageError::InvalidArgument { .. })
        ));
    }
}

#[test]
fn test_writes_need_an_existing_parent() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    assert!(matches!(
        provider.write_data("nope/a.txt", FileMode::Create, b"x"),
        Err(StorageError::DirectoryNotFound { .. })
    ));

    provider.write_data("file", FileMode::Create, b"x").unwrap();
    assert!(matches!(
        provider.write_data("file/a.txt", FileMode::Create, b"x"),
        Err(StorageError::TypeMismatch { .. })
    ));
    assert!(matches!(
        provider.create_directory("file/sub"),
        Err(StorageError::TypeMismatch { .. })
    ));
    assert!(!provider.file_exists("file/a.txt").unwrap());
    assert!(!provider.directory_exists("file/a/b").unwrap());
}

#[test]
fn test_directory_lifecycle() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    assert!(provider.create_directory("docs").unwrap());
    assert!(!provider.create_directory("docs").unwrap());
    assert!(provider.directory_exists("docs").unwrap());
    assert!(!provider.file_exists("docs").unwrap());

    provider.write_data("docs/a.txt", FileMode::CreateNew, b"a").unwrap();
    assert!(!provider.delete_directory("docs", false).unwrap());
    assert!(provider.directory_exists("docs").unwrap());

    assert!(provider.delete_directory("docs", true).unwrap());
    assert!(!provider.directory_exists("docs").unwrap());
    assert!(matches!(
        provider.delete_directory("docs", true),
        Err(StorageError::DirectoryNotFound { .. })
    ));
    assert!(matches!(
        provider.delete_directory("", true),
        Err(StorageError::InvalidArgument { .. })
    ));
}

#[test]
fn test_listings_are_sorted_and_typed() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    provider.create_directory("docs").unwrap();
    provider.create_directory("docs/zeta").unwrap();
    provider.create_directory("docs/alpha").unwrap();
    provider.write_data("docs/b.txt", FileMode::CreateNew, b"b").unwrap();
    provider.write_data("docs/a.txt", FileMode::CreateNew, b"a").unwrap();

    assert_eq!(provider.list_files("docs").unwrap(), ["docs/a.txt", "docs/b.txt"]);
    assert_eq!(provider.list_directories(r"docs\").unwrap(), ["docs/alpha", "docs/zeta"]);
    assert_eq!(provider.list_directories("").unwrap(), ["docs"]);
    assert!(matches!(provider.list_files("docs/a.txt"), Err(StorageError::TypeMismatch { .. })));
    assert!(provider.list_files("missing").unwrap_err().is_not_found());
}

#[test]
fn test_move_and_copy() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    provider.create_directory("in").unwrap();
    provider.create_directory("out").unwrap();
    provider.write_data("in/a.txt", FileMode::CreateNew, b"a").unwrap();
    provider.write_data("out/taken.txt", FileMode::CreateNew, b"old").unwrap();

    provider.copy_file("in/a.txt", "out/copy.txt", false).unwrap();
    assert_eq!(provider.read_data("out/copy.txt").unwrap(), b"a");
    assert!(provider.file_exists("in/a.txt").unwrap());

    assert!(matches!(
        provider.move_file("in/a.txt", "out/taken.txt", false),
        Err(StorageError::AlreadyExists { .. })
    ));
    provider.move_file("in/a.txt", "out/taken.txt", true).unwrap();
    assert_eq!(provider.read_data("out/taken.txt").unwrap(), b"a");
    assert!(!provider.file_exists("in/a.txt").unwrap());

    assert!(matches!(
        provider.move_file("in/a.txt", "out/again.txt", false),
        Err(StorageError::FileNotFound { .. })
    ));
    assert!(matches!(
        provider.copy_file("out/copy.txt", "in", true),
        Err(StorageError::TypeMismatch { .. })
    ));
}

#[test]
fn test_delete_file() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    provider.write_data("x.bin", FileMode::CreateNew, b"x").unwrap();
    assert!(provider.delete_file("x.bin").unwrap());
    assert!(!provider.file_exists("x.bin").unwrap());
    assert!(matches!(provider.delete_file("x.bin"), Err(StorageError::FileNotFound { .. })));
}

#[test]
fn test_streams_read_and_write_in_place() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    let mut writer = IoAdapter(provider.write_stream("log.txt", FileMode::CreateNew).unwrap());
    writer.write_all(b"line 1\n").unwrap();
    writer.write_all(b"line 2\n").unwrap();
    writer.0.close().unwrap();

    let reader = provider.read_stream("log.txt").unwrap();
    assert!(reader.can_read());
    assert!(!reader.can_write());
    let mut text = String::new();
    IoAdapter(reader).read_to_string(&mut text).unwrap();
    assert_eq!(text, "line 1\nline 2\n");

    assert!(matches!(
        provider.write_stream("log.txt", FileMode::CreateNew),
        Err(StorageError::AlreadyExists { .. })
    ));
    assert!(matches!(provider.read_stream("nope.txt"), Err(StorageError::FileNotFound { .. })));
}

#[test]
fn test_write_from_reader_reports_length() {
    let temp = TempDir::new().unwrap();
    let provider = connect(&temp);

    let mut source = std::io::Cursor::new(vec![7u8; 4096]);
    let written = provider.write_from("blob.bin", FileMode::Create, &mut source).unwrap();
    assert_eq!(written, 4096);
    assert_eq!(provider.read_data("blob.bin").unwrap().len(), 4096);
}

#[test]
fn test_close_can_delete_the_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("scratch");
    let provider = FileSystemStorageProvider::builder()
        .root(&root)
        .delete_root_on_close(true)
        .connect_blocking()
        .unwrap();
    provider.write_data("a.txt", FileMode::CreateNew, b"a").unwrap();

    provider.close().unwrap();
    assert!(provider.is_closed());
    assert!(!root.exists());
    provider.close().unwrap();
}

#[test]
fn test_missing_root_without_create_fails() {
    let temp = TempDir::new().unwrap();
    let result = FileSystemStorageProvider::builder()
        .root(temp.path().join("absent"))
        .create(false)
        .connect_blocking();
    assert!(result.is_err());
}

mod nonblocking {
    use depot_storage::{AsyncStorageProvider, FileMode, FileSystemStorageProvider, StorageError};
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_async_surface_matches_blocking() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("depot");
        let provider = FileSystemStorageProvider::builder().root(root).connect().await.unwrap();

        assert!(provider.create_directory("docs").await.unwrap());
        assert!(!provider.create_directory("docs").await.unwrap());

        provider.write_data("docs/a.txt", FileMode::CreateNew, b"hello").await.unwrap();
        assert!(matches!(
            provider.write_data("docs/a.txt", FileMode::CreateNew, b"again").await,
            Err(StorageError::AlreadyExists { .. })
        ));
        provider.write_data("docs/a.txt", FileMode::Append, b" world").await.unwrap();
        assert_eq!(provider.read_data("docs/a.txt").await.unwrap(), b"hello world");

        let mut source: &[u8] = b"streamed";
        let written =
            provider.write_from("docs/b.txt", FileMode::Create, &mut source).await.unwrap();
        assert_eq!(written, 8);

        provider.copy_file("docs/b.txt", "c.txt", false).await.unwrap();
        provider.move_file("c.txt", "docs/c.txt", false).await.unwrap();
        assert_eq!(
            provider.list_files("docs").await.unwrap(),
            ["docs/a.txt", "docs/b.txt", "docs/c.txt"]
        );
        assert_eq!(provider.list_directories("").await.unwrap(), ["docs"]);

        assert!(!provider.delete_directory("docs", false).await.unwrap());
        assert!(provider.delete_file("docs/c.txt").await.unwrap());
        assert!(provider.delete_directory("docs", true).await.unwrap());
        assert!(!provider.directory_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_purges_orphaned_temp_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("depot");
        std::fs::create_dir_all(&root).unwrap();
        let orphan = root.join("report.csv.depottmp.1.1");
        std::fs::write(&orphan, b"partial").unwrap();
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        File::options().write(true).open(&orphan).unwrap().set_modified(hour_ago).unwrap();

        let fresh = root.join("notes.md.depottmp.1.2");
        std::fs::write(&fresh, b"in flight").unwrap();

        let provider = FileSystemStorageProvider::builder().root(&root).connect().await.unwrap();
        assert!(!orphan.exists());
        assert!(fresh.exists());
        assert!(provider.list_files("").await.unwrap().is_empty());
    }
}
