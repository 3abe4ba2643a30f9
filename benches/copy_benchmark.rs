//! Performance benchmarks for treecopy
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;
use treecopy::fs::{FileCopier, MemFs};
use treecopy::{CopyEngine, Options};

/// Create a test file of the specified size
fn create_test_file(dir: &std::path::Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();

    let chunk_size = 64 * 1024;
    let chunk: Vec<u8> = (0..chunk_size).map(|i| (i % 256) as u8).collect();
    let mut remaining = size;

    while remaining > 0 {
        let to_write = remaining.min(chunk_size);
        file.write_all(&chunk[..to_write]).unwrap();
        remaining -= to_write;
    }

    path
}

fn bench_tree_copy(c: &mut Criterion) {
    let src_dir = TempDir::new().unwrap();

    // 10 directories of 100 small files
    for i in 0..10 {
        let subdir = src_dir.path().join(format!("subdir_{}", i));
        std::fs::create_dir_all(&subdir).unwrap();
        for j in 0..100 {
            create_test_file(&subdir, &format!("file_{}.txt", j), 4096);
        }
    }

    let mut group = c.benchmark_group("tree_copy_1000_files");
    for workers in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            let engine = CopyEngine::new(Options::new().workers(workers));
            b.iter(|| {
                let dst_dir = TempDir::new().unwrap();
                black_box(engine.execute(src_dir.path(), dst_dir.path().join("out")).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_copy_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_file_copy");
    let size = 32 * 1024 * 1024;

    let src_dir = TempDir::new().unwrap();
    let dst_dir = TempDir::new().unwrap();
    let src_file = create_test_file(src_dir.path(), "large.bin", size);
    let dst_file = dst_dir.path().join("large.bin");

    group.throughput(Throughput::Bytes(size as u64));
    for buffer_size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("buffer", humansize::format_size(buffer_size as u64, humansize::BINARY)),
            &buffer_size,
            |b, &buffer_size| {
                let copier = FileCopier::new(buffer_size, false);
                b.iter(|| {
                    let reader = File::open(&src_file).unwrap();
                    black_box(copier.write_from(reader, &src_file, &dst_file).unwrap());
                    let _ = std::fs::remove_file(&dst_file);
                });
            },
        );
    }

    group.finish();
}

fn bench_memory_source(c: &mut Criterion) {
    let mut fs = MemFs::new();
    for i in 0..200 {
        fs = fs.with_file(format!("assets/dir_{}/file_{}.txt", i % 10, i), vec![b'x'; 2048]);
    }

    c.bench_function("materialize_200_memory_files", |b| {
        let engine = CopyEngine::new(Options::new().source_fs(fs.clone()).workers(4));
        b.iter(|| {
            let dst_dir = TempDir::new().unwrap();
            black_box(engine.execute("assets", dst_dir.path().join("out")).unwrap());
        });
    });
}

criterion_group!(benches, bench_tree_copy, bench_copy_large_file, bench_memory_source);

criterion_main!(benches);
