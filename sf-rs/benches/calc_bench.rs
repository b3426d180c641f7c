use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sf::script::calc::CalcScope;
use sf::script::{ScriptEngine, Value};

fn nested(depth: usize) -> String {
    let mut s = String::from("x");
    for i in 0..depth {
        s = format!("({s}+{i})*y");
    }
    s
}

fn bench_calculate(c: &mut Criterion) {
    let short = "2*3+4";
    let strings = r#"to_upper("abc" "def") + substr("hello world", 6, 5)"#;
    let deep = nested(50);

    let mut g = c.benchmark_group("calculate");

    for (name, src) in [("short", short), ("strings", strings), ("nested_50", deep.as_str())] {
        g.bench_function(name, |b| {
            let mut engine = ScriptEngine::default();
            let mut scope = CalcScope::new(1.5, 1.0001, 0.0);
            b.iter(|| {
                let mut out = Value::Undefined;
                engine.calculate(black_box(src), &mut scope, &mut out);
                out
            })
        });
    }

    g.finish();
}

criterion_group!(benches, bench_calculate);
criterion_main!(benches);
