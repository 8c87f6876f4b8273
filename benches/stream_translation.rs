//! Throughput of the stream translators and the JSON object scanner
//!
//! Bodies are fed in small reads to measure the incremental paths rather
//! than a single large parse.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tollbooth::streaming::json_objects::JsonObjectScanner;
use tollbooth::streaming::{StreamTranslator, TranslatorOptions, WireFormat};

const READ_SIZE: usize = 512;

fn openai_body(records: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..records {
        body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn gemini_body(records: usize) -> Vec<u8> {
    let objects: Vec<String> = (0..records)
        .map(|i| {
            format!(
                "{{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":\"token {{{i}}} \"}}]}}}}]}}"
            )
        })
        .collect();
    format!("[{}]", objects.join(",\n")).into_bytes()
}

fn translate(format: WireFormat, body: &[u8]) -> usize {
    let mut translator = StreamTranslator::new(
        format,
        TranslatorOptions {
            fold_reasoning: false,
            model: "bench".to_string(),
        },
    );
    let mut produced = 0;
    for read in body.chunks(READ_SIZE) {
        produced += translator.push(read).len();
    }
    produced + translator.finish().len()
}

fn bench_translators(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_translation");

    for records in [100, 1_000] {
        let openai = openai_body(records);
        group.throughput(Throughput::Bytes(openai.len() as u64));
        group.bench_with_input(BenchmarkId::new("openai_sse", records), &openai, |b, body| {
            b.iter(|| black_box(translate(WireFormat::OpenAiSse, body)));
        });

        let gemini = gemini_body(records);
        group.throughput(Throughput::Bytes(gemini.len() as u64));
        group.bench_with_input(BenchmarkId::new("gemini_json", records), &gemini, |b, body| {
            b.iter(|| black_box(translate(WireFormat::GeminiJson, body)));
        });
    }

    group.finish();
}

fn bench_object_scanner(c: &mut Criterion) {
    let body = gemini_body(1_000);
    let mut group = c.benchmark_group("json_object_scanner");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for read_size in [16, 512, 8 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(read_size), &read_size, |b, &size| {
            b.iter(|| {
                let mut scanner = JsonObjectScanner::new();
                let objects: usize = body.chunks(size).map(|read| scanner.push(read).len()).sum();
                black_box(objects)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_translators, bench_object_scanner);
criterion_main!(benches);
