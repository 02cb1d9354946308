use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jst::bundle::Bundle;
use jst::TemplateCompiler;

fn make_template(rows: usize) -> String {
    let row = "<tr><td><%= item.name %></td><td><%- item.note %></td></tr>\n";
    format!("<table>\n{}</table>", row.repeat(rows))
}

fn bench_compile(c: &mut Criterion) {
    let compiler = TemplateCompiler::new().expect("template compiler");
    let small = make_template(1);
    let med = make_template(50);
    let large = make_template(1000);

    let mut g = c.benchmark_group("compile");

    g.bench_function("small", |b| b.iter(|| compiler.compile(black_box(&small)).unwrap()));
    g.bench_function("med", |b| b.iter(|| compiler.compile(black_box(&med)).unwrap()));
    g.bench_function("large", |b| b.iter(|| compiler.compile(black_box(&large)).unwrap()));

    g.finish();
}

fn bench_bundle(c: &mut Criterion) {
    let compiler = TemplateCompiler::new().expect("template compiler");
    let compiled = compiler.compile(&make_template(10)).unwrap();

    c.bench_function("bundle_100", |b| {
        b.iter(|| {
            let mut bundle = Bundle::new("App.JST").unwrap();
            for i in 0..100 {
                bundle.push(&format!("t{i}"), black_box(&compiled));
            }
            bundle.finish()
        })
    });
}

fn bench_startup(c: &mut Criterion) {
    c.bench_function("compiler_startup", |b| {
        b.iter(|| TemplateCompiler::new().unwrap())
    });
}

criterion_group!(benches, bench_compile, bench_bundle, bench_startup);
criterion_main!(benches);
