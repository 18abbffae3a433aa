//! Benchmarks the cost of the reshuffle pass `add_fp`/`add_directory` run
//! after every mutation, under the two layouts most likely to regress it:
//! a flat directory with many siblings, and Rock Ridge enabled so every
//! reshuffle also walks `assign_rock_ridge_continuations`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use isofs::{Image, NewOptions};
use isofs_io::Cursor;

fn build_flat_image(file_count: usize, rock_ridge: bool) -> Image<'static> {
    let opts = NewOptions::default().with_joliet(true).with_rock_ridge(rock_ridge);
    let mut image = Image::new(opts).unwrap();
    for i in 0..file_count {
        let path = format!("/FILE{i}.TXT");
        image.add_fp(Cursor::new(vec![0u8; 16]), 16, &path, None, None).unwrap();
    }
    image
}

fn bench_add_fp(c: &mut Criterion) {
    let mut group = c.benchmark_group("reshuffle_add_fp");
    for &rock_ridge in &[false, true] {
        group.bench_function(format!("rock_ridge={rock_ridge}"), |b| {
            b.iter_batched(
                || Image::new(NewOptions::default().with_joliet(true).with_rock_ridge(rock_ridge)).unwrap(),
                |mut image| {
                    for i in 0..64 {
                        let path = format!("/FILE{i}.TXT");
                        image.add_fp(Cursor::new(vec![0u8; 16]), 16, &path, None, None).unwrap();
                    }
                    image
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("reshuffle_write");
    for &rock_ridge in &[false, true] {
        let image = build_flat_image(256, rock_ridge);
        group.bench_function(format!("rock_ridge={rock_ridge}"), |b| {
            b.iter(|| {
                let mut sink = Cursor::new(Vec::new());
                image.write(&mut sink, 2048, None).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add_fp, bench_write);
criterion_main!(benches);
