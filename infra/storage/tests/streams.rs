use depot_storage::stream::{IoAdapter, shared};
use depot_storage::{
    BufferedEnumerableStream, ConcatenatedStream, FileMode, FileSystemStorageProvider,
    MemoryStream, MultiStream, StorageError, StorageProvider, Stream,
};
use std::io::{Read, SeekFrom};
use std::sync::Arc;
use tempfile::TempDir;

fn provider(temp: &TempDir) -> FileSystemStorageProvider {
    FileSystemStorageProvider::builder().root(temp.path()).connect_blocking().unwrap()
}

#[test]
fn test_concatenated_provider_streams_read_as_one() {
    let temp = TempDir::new().unwrap();
    let provider = provider(&temp);
    provider.write_data("part-1", FileMode::CreateNew, b"Hello, ").unwrap();
    provider.write_data("part-2", FileMode::CreateNew, b"chunked ").unwrap();
    provider.write_data("part-3", FileMode::CreateNew, b"world").unwrap();

    let parts = ["part-1", "part-2", "part-3"]
        .iter()
        .map(|path| {
            let stream = provider.read_stream(path).unwrap();
            shared(stream)
        })
        .collect();
    let joined = ConcatenatedStream::new(parts).unwrap();
    assert!(joined.can_read());
    assert!(!joined.can_seek());

    let mut text = String::new();
    IoAdapter(joined).read_to_string(&mut text).unwrap();
    assert_eq!(text, "Hello, chunked world");
}

#[test]
fn test_concatenated_streams_fill_fixed_segments_in_order() {
    let first = shared(MemoryStream::with_fixed_capacity(4));
    let second = shared(MemoryStream::with_fixed_capacity(4));
    let mut joined = ConcatenatedStream::new(vec![Arc::clone(&first), Arc::clone(&second)]).unwrap();

    assert_eq!(joined.write(b"abcdef").unwrap(), 6);
    assert_eq!(joined.current_index(), 1);
    assert_eq!(joined.position(), 6);

    let mut head = [0u8; 4];
    first.lock().seek(SeekFrom::Start(0)).unwrap();
    first.lock().read(&mut head).unwrap();
    assert_eq!(&head, b"abcd");
}

#[test]
fn test_duplicate_backing_streams_are_rejected() {
    let stream = shared(MemoryStream::new());
    assert!(matches!(
        ConcatenatedStream::new(vec![Arc::clone(&stream), Arc::clone(&stream)]),
        Err(StorageError::InvalidArgument { .. })
    ));
    assert!(matches!(MultiStream::new(vec![]), Err(StorageError::InvalidArgument { .. })));
}

#[test]
fn test_multi_stream_mirrors_into_a_provider_file() {
    let temp = TempDir::new().unwrap();
    let provider = provider(&temp);

    let file = shared(provider.write_stream("mirror.bin", FileMode::CreateNew).unwrap());
    let memory = shared(MemoryStream::new());
    let mut fan_out = MultiStream::new(vec![Arc::clone(&file), Arc::clone(&memory)]).unwrap();

    assert_eq!(fan_out.write(b"replicated").unwrap(), 10);
    fan_out.close().unwrap();
    assert!(!fan_out.can_read());

    assert_eq!(provider.read_data("mirror.bin").unwrap(), b"replicated");
    assert_eq!(memory.lock().len(), Some(10));
}

#[test]
fn test_multi_stream_refuses_read_only_members() {
    let read_only = shared(MemoryStream::read_only(b"fixed".to_vec()));
    let writable = shared(MemoryStream::new());
    assert!(matches!(
        MultiStream::new(vec![writable, read_only]),
        Err(StorageError::InvalidArgument { .. })
    ));
}

#[test]
fn test_enumerable_stream_feeds_a_provider_write() {
    let temp = TempDir::new().unwrap();
    let provider = provider(&temp);

    let bytes = (0..10_000u32).map(|i| (i % 251) as u8);
    let mut source = BufferedEnumerableStream::with_capacity(bytes.clone(), 128);
    let written = provider.write_from("generated.bin", FileMode::Create, &mut source).unwrap();

    assert_eq!(written, 10_000);
    assert!(source.is_complete());
    assert_eq!(provider.read_data("generated.bin").unwrap(), bytes.collect::<Vec<_>>());
}

#[test]
fn test_enumerable_stream_hands_each_byte_to_one_reader() {
    let total = 64 * 1024;
    let stream = BufferedEnumerableStream::with_capacity((0..total).map(|i| (i % 256) as u8), 64);

    let counts: Vec<usize> = std::thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut buf = [0u8; 97];
                    let mut seen = 0;
                    loop {
                        let n = stream.read_shared(&mut buf);
                        if n == 0 {
                            break seen;
                        }
                        seen += n;
                    }
                })
            })
            .collect();
        readers.into_iter().map(|reader| reader.join().unwrap()).collect()
    });

    assert_eq!(counts.iter().sum::<usize>(), total);
    assert_eq!(stream.position(), total as u64);
}
