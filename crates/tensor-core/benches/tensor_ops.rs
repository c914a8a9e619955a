// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use criterion::{criterion_group, criterion_main, Criterion};
use memory_manager::DeviceKind;
use tensor_core::{DType, Shape, Tensor};

fn bench_tensor_alloc(c: &mut Criterion) {
    c.bench_function("tensor_alloc_1mb", |b| {
        b.iter(|| Tensor::new(Shape::new(vec![256, 1024]), DType::F32, DeviceKind::Cpu).unwrap())
    });
}

fn bench_slice_view(c: &mut Criterion) {
    let t = Tensor::new(Shape::new(vec![64, 1024]), DType::F32, DeviceKind::Cpu).unwrap();
    c.bench_function("slice_leading_dim_view", |b| {
        b.iter(|| t.slice(&[8, 0], &[56, 1024], &[1, 1]).unwrap())
    });
}

fn bench_wire_roundtrip(c: &mut Criterion) {
    let t = Tensor::new(Shape::new(vec![128, 128]), DType::F32, DeviceKind::Cpu).unwrap();
    c.bench_function("wire_roundtrip_64kb", |b| {
        b.iter(|| Tensor::from_wire_bytes(&t.to_wire_bytes()).unwrap())
    });
}

criterion_group!(benches, bench_tensor_alloc, bench_slice_view, bench_wire_roundtrip);
criterion_main!(benches);
