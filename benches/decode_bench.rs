use std::fmt::Write;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use saft::SaftConfig;
use saft::decode::Decoder;
use saft::pipeline;

const V13: &str = include_str!("../tests/fixtures/valid_v13.xml");

/// The small fixture with its journal repeated until it holds `transactions`
/// balanced two-line transactions.
fn ledger_with(transactions: usize) -> String {
    let mut body = String::new();
    for n in 0..transactions {
        let record = n * 2;
        write!(
            body,
            "<Transaction><TransactionID>B{n}</TransactionID><Period>1</Period>\
             <PeriodYear>2025</PeriodYear><TransactionDate>2025-01-15</TransactionDate>\
             <Description>Kontantsalg</Description><SystemEntryDate>2025-01-15</SystemEntryDate>\
             <GLPostingDate>2025-01-15</GLPostingDate>\
             <Line><RecordID>B{record}</RecordID><AccountID>1920</AccountID>\
             <Description>Bank</Description><DebitAmount><Amount>125.00</Amount></DebitAmount></Line>\
             <Line><RecordID>B{}</RecordID><AccountID>3000</AccountID>\
             <Description>Salg</Description><CreditAmount><Amount>125.00</Amount></CreditAmount></Line>\
             </Transaction>",
            record + 1
        )
        .unwrap();
    }
    body.push_str("</Journal>");
    V13.replacen("</Journal>", &body, 1)
}

fn bench_decode_events(c: &mut Criterion) {
    let xml = ledger_with(1_000);
    let config = SaftConfig::default();
    c.bench_function("decode_events_1000_tx", |b| {
        b.iter(|| {
            let count = Decoder::new(black_box(xml.as_bytes()), &config)
                .filter_map(Result::ok)
                .count();
            black_box(count)
        });
    });
}

fn bench_parse(c: &mut Criterion) {
    let xml = ledger_with(1_000);
    let config = SaftConfig::default();
    c.bench_function("parse_1000_tx", |b| {
        b.iter(|| black_box(pipeline::parse_str(black_box(&xml), &config)));
    });
}

fn bench_analyze(c: &mut Criterion) {
    let xml = ledger_with(1_000);
    let config = SaftConfig {
        aging_as_of: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
        ..Default::default()
    };
    c.bench_function("analyze_1000_tx", |b| {
        b.iter(|| black_box(pipeline::analyze_str(black_box(&xml), &config)));
    });
}

fn bench_derive_findings(c: &mut Criterion) {
    let xml = ledger_with(1_000);
    let config = SaftConfig::default();
    let analysis = pipeline::analyze_str(&xml, &config).unwrap();
    c.bench_function("derive_findings_1000_tx", |b| {
        b.iter(|| black_box(pipeline::derive_findings(black_box(&analysis.file), &config)));
    });
}

criterion_group!(
    benches,
    bench_decode_events,
    bench_parse,
    bench_analyze,
    bench_derive_findings,
);
criterion_main!(benches);
