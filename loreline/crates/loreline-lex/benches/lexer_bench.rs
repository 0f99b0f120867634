//! Lexer throughput benchmark.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loreline_lex::tokenize;

fn sample_script() -> String {
    let mut source = String::from(
        "state\n  coffeeBeans: 5\n  milk: 2\n\ncharacter barista\n  name: \"Alex\"\n  friendliness: 3\n\n",
    );
    for i in 0..50 {
        source.push_str(&format!(
            "beat Scene{i}\n  \"Remaining: coffeeBeans=$coffeeBeans milk=$milk\"\n  barista: <happy>Welcome back!</happy>\n  choice\n    Cappuccino if coffeeBeans >= 2 and milk > 0\n      coffeeBeans -= 2\n      milk -= 1\n      -> Scene{i}\n    Espresso if coffeeBeans > 0\n      coffeeBeans -= 1\n      -> Scene{i}\n"
        ));
    }
    source
}

fn bench_tokenize(c: &mut Criterion) {
    let source = sample_script();
    c.bench_function("tokenize_50_beats", |b| {
        b.iter(|| tokenize(black_box(&source), None))
    });
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
