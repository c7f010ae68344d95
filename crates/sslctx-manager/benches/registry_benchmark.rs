// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
#![allow(clippy::unwrap_used)]
//! Context registry benchmarks
//!
//! Measures the hot read paths (expiry query, slot load, iteration) and the
//! deduplicating create path against registries of increasing size.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sslctx_manager::{
    ClientContextConfig, ContextManager, ContextSlot, SharedContext, StaticSecretManager,
    StatsScope, ValidationContext,
};
use sslctx_test_utils::{unix_now, TestPki, DAY};
use std::hint::black_box;
use std::sync::Arc;

fn client_config(pki: &TestPki, index: usize) -> ClientContextConfig {
    ClientContextConfig::builder()
        .trusted_ca(ValidationContext::from_pem(pki.ca_pem().as_bytes()))
        .server_name_indication(format!("upstream-{}.example.com", index))
        .build()
        .unwrap()
}

fn populated(size: usize) -> (ContextManager, TestPki, Vec<SharedContext>) {
    let pki = TestPki::new("Bench CA", unix_now() + 365 * DAY);
    let manager = ContextManager::new(Arc::new(StaticSecretManager::new()));
    let scope = StatsScope::isolated();
    let contexts = (0..size)
        .map(|i| manager.create_client_context(&scope, &client_config(&pki, i)).unwrap())
        .collect();
    (manager, pki, contexts)
}

fn bench_expiry_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("days_until_first_cert_expires");

    for size in [10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (manager, _pki, _contexts) = populated(size);
            b.iter(|| black_box(manager.days_until_first_cert_expires()));
        });
    }

    group.finish();
}

fn bench_deduplicated_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_deduplicated");

    for size in [10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (manager, pki, _contexts) = populated(size);
            let scope = StatsScope::isolated();
            let config = client_config(&pki, 0);

            b.iter(|| {
                let context = manager.create_client_context(&scope, black_box(&config)).unwrap();
                manager.release_context(&context).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate_contexts");

    for size in [10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (manager, _pki, _contexts) = populated(size);
            b.iter(|| {
                let mut count = 0usize;
                manager.iterate_contexts(|context| {
                    black_box(context.id());
                    count += 1;
                });
                black_box(count)
            });
        });
    }

    group.finish();
}

fn bench_slot_current(c: &mut Criterion) {
    let (_manager, _pki, mut contexts) = populated(1);
    let slot = ContextSlot::new(contexts.remove(0));

    c.bench_function("slot_current", |b| {
        b.iter(|| black_box(slot.current()));
    });
}

criterion_group!(
    benches,
    bench_expiry_query,
    bench_deduplicated_create,
    bench_iterate,
    bench_slot_current
);
criterion_main!(benches);
