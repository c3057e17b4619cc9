use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use depot_storage::{
    FileMode, FileSystemStorageProvider, MemoryNodeBackend, Node, NodeId, NodeKind, Snapshot,
    StorageProvider, TreeStorageProvider,
};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

/// A root with `width` directories, each holding `width` files.
fn wide_tree(width: usize) -> Vec<Node> {
    let root = NodeId::new("root");
    let mut nodes = vec![Node::new(root.clone(), None, "Cloud Drive", NodeKind::Root)];
    for dir in 0..width {
        let dir_id = NodeId::new(format!("d{dir}"));
        nodes.push(Node::new(
            dir_id.clone(),
            Some(root.clone()),
            format!("dir-{dir}"),
            NodeKind::Directory,
        ));
        for file in 0..width {
            nodes.push(Node::new(
                format!("d{dir}f{file}"),
                Some(dir_id.clone()),
                format!("file-{file}.bin"),
                NodeKind::File,
            ));
        }
    }
    nodes
}

// ============================================================================
// Benchmark: Snapshot Indexing & Lookup
// ============================================================================

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let root = NodeId::new("root");

    for width in [16usize, 64, 256] {
        let nodes = wide_tree(width);

        group.bench_with_input(BenchmarkId::new("build", width), &nodes, |b, nodes| {
            b.iter(|| black_box(Snapshot::new(nodes.clone(), &root).unwrap()));
        });

        let snapshot = Snapshot::new(nodes, &root).unwrap();
        let deep = format!("dir-{}/file-{}.bin", width - 1, width - 1);

        group.bench_function(BenchmarkId::new("resolve_hit", width), |b| {
            b.iter(|| black_box(snapshot.resolve(&deep).unwrap()));
        });

        group.bench_function(BenchmarkId::new("resolve_miss", width), |b| {
            b.iter(|| black_box(snapshot.resolve("dir-0/missing.bin")));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Provider Path Resolution
// ============================================================================

fn bench_provider_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("provider_paths");

    let temp = TempDir::new().unwrap();
    let provider =
        FileSystemStorageProvider::builder().root(temp.path()).connect_blocking().unwrap();

    group.bench_function("sandbox_simple", |b| {
        b.iter(|| black_box(provider.resolve("test.dat").unwrap()));
    });

    group.bench_function("sandbox_nested", |b| {
        b.iter(|| black_box(provider.resolve(r"foo\bar/baz/test.dat").unwrap()));
    });

    group.bench_function("sandbox_traversal", |b| {
        b.iter(|| black_box(provider.resolve("foo/../../etc/passwd").is_err()));
    });

    let backend = Arc::new(MemoryNodeBackend::new());
    let tree = TreeStorageProvider::builder().backend(backend).connect_blocking().unwrap();
    tree.create_directory("docs").unwrap();
    tree.write_data("docs/readme.md", FileMode::CreateNew, b"hi").unwrap();

    group.bench_function("tree_cached_lookup", |b| {
        b.iter(|| black_box(tree.file_exists("docs/readme.md").unwrap()));
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_snapshot, bench_provider_paths);

criterion_main!(benches);
