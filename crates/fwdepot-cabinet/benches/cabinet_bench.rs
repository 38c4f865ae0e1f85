//! Benchmarks for cabinet parsing and writing
//!
//! Run with: cargo bench --bench cabinet_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fwdepot_cabinet::prelude::*;
use std::hint::black_box;

fn sample_archive(size: usize) -> CabArchive {
    let payload: Vec<u8> = (0..size).map(|i| (i % 97) as u8).collect();
    let mut archive = CabArchive::new();
    archive.add_file(CabFile::new("firmware.bin", payload));
    archive.add_file(CabFile::new(
        "firmware.metainfo.xml",
        b"<component type=\"firmware\"/>".to_vec(),
    ));
    archive
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("cab_parse");

    for size in [64 * 1024usize, 1024 * 1024] {
        for compression in [Compression::None, Compression::Mszip] {
            let bytes = sample_archive(size)
                .save(compression)
                .expect("save failed");
            group.bench_with_input(
                BenchmarkId::new(format!("{compression:?}"), size),
                &bytes,
                |b, bytes| b.iter(|| CabArchive::parse(black_box(bytes)).expect("parse failed")),
            );
        }
    }

    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let archive = sample_archive(1024 * 1024);

    c.bench_function("cab_save_mszip_1mb", |b| {
        b.iter(|| black_box(&archive).save(Compression::Mszip).expect("save failed"));
    });
}

criterion_group!(benches, bench_parse, bench_save);
criterion_main!(benches);
