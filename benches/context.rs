//! Benchmarks for context assembly and query scoring.
//!
//! Benchmark targets:
//! - Rendering a 1,000 entry scope block: <5ms
//! - Combined context over 300 entries per scope: <20ms
//! - Querying 1,000 entries: <50ms

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::hint::black_box;

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use kbase::models::{EntryId, KnowledgeEntry, Scope, ScopeKind, SourceType, UsageContext};
use kbase::services::{chunk_text, render_scope_block};
use kbase::{KnowledgeBase, NewEntry, QueryRequest};

// ============================================================================
// Helper Functions
// ============================================================================

const TOPICS: &[&str] = &[
    "refund policy for damaged goods",
    "shipping times to remote regions",
    "warranty coverage on bicycle frames",
    "escalation path for billing disputes",
    "tone guidelines for support replies",
];

fn content_for(i: usize) -> String {
    let topic = TOPICS[i % TOPICS.len()];
    format!("Entry {i} covers the {topic}. ").repeat(8)
}

/// Builds entries newest first, as the store returns them.
fn entries(count: usize) -> Vec<KnowledgeEntry> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let content = content_for(i);
            let created = now - Duration::seconds(i64::try_from(i).unwrap());
            KnowledgeEntry {
                id: EntryId::generate(),
                scope: Scope::global("bench"),
                name: format!("Entry {i}"),
                description: None,
                content_tokens: Some(kbase::estimate_tokens(&content)),
                content,
                usage_context: UsageContext::Always,
                is_active: true,
                source_type: SourceType::Manual,
                source_metadata: None,
                created_at: created,
                updated_at: created,
                last_accessed_at: None,
            }
        })
        .collect()
}

fn populated(per_scope: usize) -> KnowledgeBase {
    let kb = KnowledgeBase::in_memory().expect("in-memory knowledge base");
    for i in 0..per_scope {
        for scope in [
            Scope::global("bench"),
            Scope::thread("bench", "t1"),
            Scope::agent("bench", "bot"),
        ] {
            kb.entries()
                .create(NewEntry::new(scope, format!("Entry {i}"), content_for(i)))
                .unwrap();
        }
    }
    kb
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_render_scope_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_scope_block");

    for count in [10usize, 100, 1000] {
        let entries = entries(count);
        for budget in [2_000usize, 100_000] {
            group.bench_with_input(
                BenchmarkId::new(format!("{count}_entries"), budget),
                &budget,
                |b, &budget| {
                    b.iter(|| render_scope_block(ScopeKind::Global, black_box(&entries), budget));
                },
            );
        }
    }

    group.finish();
}

fn bench_combined_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined_context");
    group.sample_size(30);

    for per_scope in [10usize, 100, 300] {
        let kb = populated(per_scope);
        group.bench_with_input(
            BenchmarkId::from_parameter(per_scope),
            &per_scope,
            |b, _| {
                b.iter(|| {
                    kb.context()
                        .combined_context("bench", "t1", Some("bot"), black_box(4000))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    group.sample_size(20);

    for per_scope in [10usize, 100, 333] {
        let kb = populated(per_scope);
        let request = QueryRequest::new("warranty on bicycle frames", "bench");
        group.bench_with_input(
            BenchmarkId::from_parameter(per_scope * 3),
            &request,
            |b, request| {
                b.iter(|| kb.query().query(black_box(request)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_chunking(c: &mut Criterion) {
    let text = (0..2000).map(content_for).collect::<String>();
    c.bench_function("chunk_text_large_document", |b| {
        b.iter(|| chunk_text(black_box(&text), 1000, 200));
    });
}

criterion_group!(
    benches,
    bench_render_scope_block,
    bench_combined_context,
    bench_query,
    bench_chunking
);
criterion_main!(benches);
