// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use scanwerk_core::config::EngineConfig;
use scanwerk_core::types::{AppIdentity, CapId};
use scanwerk_dsm::stub::StubManager;
use scanwerk_engine::{CapabilityTable, EngineContext, QuirkLists, Session};

fn bench_capability_cache(c: &mut Criterion) {
    let ctx = EngineContext::init(EngineConfig::default()).expect("init");
    let stub = Arc::new(StubManager::new());
    let app = AppIdentity::new("Scanwerk", "Engine", "Bench");
    let mut session = Session::open_with(ctx, stub, app).expect("session");
    let source = session.open_default().expect("source");
    // Settle the verdict once; the measured path is the cache hit.
    source
        .is_supported(CapId::XFER_COUNT, true)
        .expect("probe");

    c.bench_function("is_supported_cached", |b| {
        b.iter(|| {
            source
                .is_supported(black_box(CapId::XFER_COUNT), true)
                .expect("cached")
        })
    });
}

fn bench_captable_parse(c: &mut Criterion) {
    let text = include_str!("../src/resources/captable.txt");
    c.bench_function("captable_parse", |b| {
        b.iter(|| CapabilityTable::parse(black_box(text)).expect("parse"))
    });
}

fn bench_quirk_match(c: &mut Criterion) {
    let lists = QuirkLists::embedded();
    c.bench_function("quirk_lookup", |b| {
        b.iter(|| black_box(lists.for_product(black_box("PageMaster 1100c"))))
    });
}

criterion_group!(
    benches,
    bench_capability_cache,
    bench_captable_parse,
    bench_quirk_match
);
criterion_main!(benches);
