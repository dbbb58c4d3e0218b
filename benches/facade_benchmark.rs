// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::io::Write;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use servlet_container::{
    adapter::path_info,
    form::{decode_body, split_query},
    param::HttpEncoding,
    HttpServletResponse, Response,
};

fn split_query_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_query");

    for count in [1usize, 10, 100].iter() {
        let query = (0..*count)
            .map(|i| format!("key{}=value{}", i, i))
            .collect::<Vec<_>>()
            .join("&");
        group.bench_with_input(BenchmarkId::from_parameter(count), &query, |b, query| {
            b.iter(|| split_query(black_box(query)));
        });
    }

    group.finish();
}

fn multipart_decode_benchmark(c: &mut Criterion) {
    let mut body = b"--XX\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n\
--XX\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
        .to_vec();
    body.extend(std::iter::repeat(b'z').take(32 * 1024));
    body.extend_from_slice(b"\r\n--XX--\r\n");
    let body = Bytes::from(body);

    c.bench_function("multipart_decode", |b| {
        b.iter(|| decode_body(Some("multipart/form-data; boundary=XX"), black_box(&body)));
    });
}

fn path_info_benchmark(c: &mut Criterion) {
    c.bench_function("path_info", |b| {
        b.iter(|| path_info(black_box("/app/svc/a/b/c"), "/app", "/svc"));
    });
}

fn response_to_wire_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_to_wire");

    let cases = [
        ("plain", Vec::new()),
        ("gzip", vec![HttpEncoding::Gzip]),
        ("br", vec![HttpEncoding::Br]),
    ];

    for (name, encodings) in cases.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), encodings, |b, encodings| {
            b.iter(|| {
                let mut response = HttpServletResponse::new();
                response.set_content_type("text/plain").unwrap();
                for i in 0..200 {
                    writeln!(response, "line {}", i).unwrap();
                }
                let reply = response.into_reply();
                let wire = Response::from_servlet(
                    reply.status,
                    reply.content_type,
                    reply.headers,
                    reply.body,
                    encodings,
                    true,
                    0,
                );
                black_box(wire.as_bytes())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    split_query_benchmark,
    multipart_decode_benchmark,
    path_info_benchmark,
    response_to_wire_benchmark
);
criterion_main!(benches);
