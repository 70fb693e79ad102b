use criterion::{black_box, criterion_group, criterion_main, Criterion};
use unitronics_pcom::batch::{plan_ascii_reads, plan_binary_reads};
use unitronics_pcom::pcom_a::{self, AsciiReadRequest};
use unitronics_pcom::pcom_b::{BinaryReadRequest, ReadBlock};
use unitronics_pcom::{OperandKind, ReadOperandsRequest};

fn mixed_request() -> ReadOperandsRequest {
    let mut request = ReadOperandsRequest::new();
    for address in (0..400).step_by(3) {
        request.add(OperandKind::MI, address);
    }
    for address in 0..64 {
        request.add(OperandKind::MB, address);
    }
    for address in (0..100).step_by(7) {
        request.add(OperandKind::ML, address);
        request.add(OperandKind::MF, address);
    }
    request
}

fn ascii_benchmark(c: &mut Criterion) {
    let read = AsciiReadRequest::new(OperandKind::MI, 0, 60).expect("valid read");

    c.bench_function("ascii_build_read", |b| {
        b.iter(|| black_box(read.build(black_box(1))))
    });

    c.bench_function("ascii_decode_identification", |b| {
        b.iter(|| black_box(pcom_a::decode_identification(black_box("35T2A30901"))))
    });
}

fn binary_benchmark(c: &mut Criterion) {
    let read = BinaryReadRequest::new(vec![
        ReadBlock::Vectorial {
            kind: OperandKind::MB,
            start: 0,
            count: 64,
        },
        ReadBlock::NonVectorial {
            kind: OperandKind::MI,
            addresses: (0..120).collect(),
        },
    ])
    .expect("valid read");

    c.bench_function("binary_build_read", |b| {
        b.iter(|| black_box(read.build(black_box(1))))
    });
}

fn planning_benchmark(c: &mut Criterion) {
    let request = mixed_request();

    c.bench_function("plan_binary_reads", |b| {
        b.iter(|| black_box(plan_binary_reads(black_box(&request), 1000)))
    });

    c.bench_function("plan_ascii_reads", |b| {
        b.iter(|| black_box(plan_ascii_reads(black_box(&request), 256)))
    });
}

criterion_group!(benches, ascii_benchmark, binary_benchmark, planning_benchmark);
criterion_main!(benches);
