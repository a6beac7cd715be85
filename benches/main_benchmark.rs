use criterion::{Criterion, criterion_group, criterion_main};
use makegen::buildable::{BuildKind, Buildable};
use makegen::makefile::{AssignOp, Makefile};
use makegen::manifest::Manifest;
use makegen::platform::{SystemType, TargetOs};
use makegen::toolchain::Compiler;
use std::hint::black_box;

const MOCK_MANIFEST: &str = r#"
[package]
name = "benchmark_project"
version = "0.1"

[binaries.app]
sources = ["src/main.c", "src/util.c"]
cflags = ["-Wall"]
ldadd = ["-lm"]

[libraries.core]
sources = ["src/core.c"]
abi_major = 1
abi_minor = 0

[probes]
headers = ["sys/epoll.h"]
funcs = ["kqueue"]
"#;

fn bench_manifest_parse(c: &mut Criterion) {
    c.bench_function("parse_project_toml", |b| {
        b.iter(|| {
            let _: Manifest = toml::from_str(black_box(MOCK_MANIFEST)).unwrap();
        })
    });
}

fn fragment(i: usize) -> Makefile {
    let mut b = Buildable::new(&format!("prog{}", i), BuildKind::Binary);
    b.sources = (0..8).map(|j| format!("src/unit{}_{}.c", i, j)).collect();
    b.output = format!("prog{}", i);
    b.expand(
        &Compiler::new("cc", TargetOs::Linux),
        &SystemType::default(),
    )
    .unwrap()
}

fn bench_graph_merge(c: &mut Criterion) {
    let fragments: Vec<Makefile> = (0..64).map(fragment).collect();
    c.bench_function("merge_64_fragments", |b| {
        b.iter(|| {
            let mut mk = Makefile::new(TargetOs::Linux);
            mk.define_variable("CC", AssignOp::Set, "cc");
            for frag in &fragments {
                mk.merge(black_box(frag.clone())).unwrap();
            }
            mk
        })
    });
}

fn bench_graph_render(c: &mut Criterion) {
    let mut mk = Makefile::new(TargetOs::Linux);
    for frag in (0..64).map(fragment) {
        mk.merge(frag).unwrap();
    }
    mk.add_dist_archive("benchmark_project", "0.1");
    c.bench_function("render_large_makefile", |b| {
        b.iter(|| black_box(&mk).render())
    });
}

criterion_group!(
    benches,
    bench_manifest_parse,
    bench_graph_merge,
    bench_graph_render
);
criterion_main!(benches);
