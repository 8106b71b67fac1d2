use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rampart::prelude::*;
use std::sync::Arc;

fn engine() -> Antiforgery {
    let protector = HmacProtector::new(HmacProtector::generate_key()).unwrap();
    Antiforgery::builder(Arc::new(protector)).build().unwrap()
}

fn bench_token_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("antiforgery_tokens");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let antiforgery = engine();
    let request = RequestContext::new("GET", "/")
        .with_principal(Principal::authenticated("alice").with_claim(Claim::new("sub", "42")));
    let set = runtime
        .block_on(antiforgery.issue_token_set(&request, None))
        .unwrap();
    let serializer = antiforgery.serializer();

    group.bench_function("serialize_form_token", |b| {
        b.iter(|| serializer.serialize(black_box(&set.form_token)).unwrap())
    });

    let serialized = serializer.serialize(&set.form_token).unwrap();

    group.bench_function("deserialize_form_token", |b| {
        b.iter(|| serializer.deserialize(black_box(&serialized)).unwrap())
    });

    group.finish();
}

fn bench_request_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("antiforgery_requests");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let antiforgery = engine();

    group.bench_function("issue_fresh_token_set", |b| {
        let request = RequestContext::new("GET", "/");
        b.to_async(&runtime).iter(|| async {
            antiforgery
                .issue_token_set(black_box(&request), None)
                .await
                .unwrap()
        })
    });

    let mut response = ResponseContext::new();
    let tokens = runtime
        .block_on(antiforgery.get_and_store_tokens(&RequestContext::new("GET", "/"), &mut response))
        .unwrap();
    let cookie = response
        .cookie(&antiforgery.config().cookie_name)
        .unwrap()
        .value()
        .to_string();
    let submit = RequestContext::new("POST", "/")
        .with_cookie(&antiforgery.config().cookie_name, &cookie)
        .with_form(&[("__RequestVerificationToken", tokens.form_token.as_str())]);

    group.bench_function("validate_request", |b| {
        b.to_async(&runtime)
            .iter(|| async { antiforgery.validate_request(black_box(&submit)).await.unwrap() })
    });

    group.finish();
}

criterion_group!(antiforgery_benches, bench_token_serialization, bench_request_cycle);

criterion_main!(antiforgery_benches);
