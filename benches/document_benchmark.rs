use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tapi_client::{append_query, cache_fingerprint, params, ClassMapping, Document, DocumentKind};

fn search_body(results: usize) -> String {
    let results: Vec<_> = (0..results)
        .map(|i| {
            json!({
                "id": i,
                "hotel_id": 1000 + i,
                "price": {"amount": 99.5, "currency": "EUR"},
                "resources": {"details_url": format!("http://host/results/{}", i)}
            })
        })
        .collect();

    json!({
        "search": {
            "id": "s-1",
            "status_detailed": {"state": "finished"},
            "results": results,
            "resources": {
                "search_url": "http://host/searches/s-1",
                "restart_url": "http://host/searches/s-1/restart"
            }
        }
    })
    .to_string()
}

pub fn document_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_parse");
    let mapping = ClassMapping::new().with("results", DocumentKind::new("Result"));

    for size in [10, 100, 1000].iter() {
        let body = search_body(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| {
                Document::parse(black_box(body), DocumentKind::default(), None, &mapping)
            })
        });
    }
    group.finish();
}

pub fn request_benchmark(c: &mut Criterion) {
    let query = params([
        ("key", "the key"),
        ("arrival_date", "2030-01-01"),
        ("room_configuration", "[A][A|A]"),
        ("city_id", "1"),
    ]);

    c.bench_function("append_query", |b| {
        b.iter(|| append_query(black_box("http://host/searches"), black_box(&query)))
    });

    c.bench_function("cache_fingerprint", |b| {
        b.iter(|| cache_fingerprint(black_box("http://host/searches/s-1"), black_box(&query)))
    });
}

criterion_group!(benches, document_benchmark, request_benchmark);
criterion_main!(benches);
