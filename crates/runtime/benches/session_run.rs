// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use criterion::{criterion_group, criterion_main, Criterion};
use graph_ir::Graph;
use runtime::{SchedulerKind, Session, SessionOptions};
use tensor_core::{DType, Shape, Tensor};

/// A 4-layer MLP: (MatMul → Add → Gelu) × 4.
fn mlp_graph(hidden: i64) -> Graph {
    let mut g = Graph::new();
    let x = g.add_named_value("x");
    g.value_mut(x).shape = Some(Shape::matrix(1, hidden));
    g.value_mut(x).dtype = DType::F32;

    let mut prev = x;
    for layer in 0..4 {
        let w = g.add_initializer(
            format!("w{layer}"),
            Tensor::from_f32(
                Shape::matrix(hidden, hidden),
                &vec![0.01; (hidden * hidden) as usize],
            )
            .unwrap(),
        );
        let b = g.add_initializer(
            format!("b{layer}"),
            Tensor::from_f32(Shape::vector(hidden), &vec![0.1; hidden as usize]).unwrap(),
        );
        let mm_out = g.add_value();
        let mm = g.add_node("MatMul", None);
        g.connect_input(mm, prev);
        g.connect_input(mm, w);
        g.connect_output(mm, mm_out);

        let add_out = g.add_value();
        let add = g.add_node("Add", None);
        g.connect_input(add, mm_out);
        g.connect_input(add, b);
        g.connect_output(add, add_out);

        let act_out = g.add_value();
        let act = g.add_node("Gelu", None);
        g.connect_input(act, add_out);
        g.connect_output(act, act_out);
        prev = act_out;
    }
    g.add_output(prev);
    g.add_input(x);
    g
}

fn bench_mlp(c: &mut Criterion) {
    let session = Session::create(SessionOptions::default())
        .unwrap()
        .load_model_from_graph(mlp_graph(256))
        .unwrap()
        .prepare()
        .unwrap()
        .ready()
        .unwrap();

    c.bench_function("mlp_256_topological", |b| {
        b.iter(|| {
            let input = Tensor::from_f32(Shape::matrix(1, 256), &[0.5; 256]).unwrap();
            session.run(vec![input]).unwrap()
        })
    });
}

fn bench_mlp_parallel(c: &mut Criterion) {
    let options = SessionOptions {
        scheduler: SchedulerKind::Parallel,
        ..Default::default()
    };
    let session = Session::create(options)
        .unwrap()
        .load_model_from_graph(mlp_graph(256))
        .unwrap()
        .prepare()
        .unwrap()
        .ready()
        .unwrap();

    c.bench_function("mlp_256_parallel", |b| {
        b.iter(|| {
            let input = Tensor::from_f32(Shape::matrix(1, 256), &[0.5; 256]).unwrap();
            session.run(vec![input]).unwrap()
        })
    });
}

criterion_group!(benches, bench_mlp, bench_mlp_parallel);
criterion_main!(benches);
