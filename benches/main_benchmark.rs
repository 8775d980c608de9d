use criterion::{Criterion, criterion_group, criterion_main};
use omake::cache::TypedCache;
use omake::config::Configuration;
use omake::description;
use omake::expand::MacroExpander;
use omake::mangler::ManglerRegistry;
use omake::report::Reporter;
use omake::wildcard::WildcardEvaluator;
use std::hint::black_box;

const MOCK_DESCRIPTION: &str = r#"
platforms = ["LINUX", "WIN32"]

[aliases]
linux = "LINUX"

[constants]
OUT = "build"
CFLAGS = "-O2 -Wall -I${OUT}/include"

[tools]
cc = "/usr/bin/cc"

[sources]
SRC = ["src/main.c", "src/util.c", "src/net/socket.c", "src/net/http.c", { file = "src/win.c", platform = "WIN32" }]

[platform.LINUX.constants]
CFLAGS = "-O2 -Wall -fPIC -I${OUT}/include"

[[target.all.step]]
run = "cc ${CFLAGS} -o ${OUT}/app ${${OUT}/&([SRC].no_extension).o}"
"#;

fn mock_configuration() -> Configuration {
    let mut reporter = Reporter::new("bench").quiet();
    description::parse(MOCK_DESCRIPTION, &mut reporter)
        .unwrap()
        .config
}

fn bench_description_parse(c: &mut Criterion) {
    c.bench_function("parse_omake_toml", |b| {
        b.iter(|| {
            let mut reporter = Reporter::new("bench").quiet();
            description::parse(black_box(MOCK_DESCRIPTION), &mut reporter).unwrap()
        })
    });
}

fn bench_expand(c: &mut Criterion) {
    let config = mock_configuration();
    let manglers = ManglerRegistry::new();
    let wildcards = WildcardEvaluator::new();
    let expander = MacroExpander::new(&config, &manglers, &wildcards);

    c.bench_function("expand_list_macro", |b| {
        b.iter(|| {
            expander
                .expand(
                    black_box("cc ${CFLAGS} -o ${OUT}/app ${${OUT}/&([SRC].no_extension).o}"),
                    "LINUX",
                    "all",
                )
                .unwrap()
        })
    });
}

fn bench_resolve_constant(c: &mut Criterion) {
    let mut config = mock_configuration();
    for i in 0..50 {
        config
            .settings_mut(Some("all"), None)
            .constants
            .insert(format!("K{}", i), i.to_string());
    }
    c.bench_function("resolve_constant_fallthrough", |b| {
        b.iter(|| {
            config
                .resolve_constant(black_box("LINUX"), black_box("all"), black_box("OUT"))
                .unwrap()
                .len()
        })
    });
}

fn bench_cache_roundtrip(c: &mut Criterion) {
    let mut cache = TypedCache::new();
    for i in 0..1_000 {
        cache.set_i64(format!("deps.file:src/f{}.c:all:LINUX.mtime", i), i * 1_000_003);
        cache.set_text(format!("omake.parse.3:all.5:LINUX.{}", i), format!("{{\"index\":{}}}", i));
    }
    let bytes = cache.to_bytes();

    c.bench_function("cache_to_bytes", |b| b.iter(|| black_box(&cache).to_bytes()));
    c.bench_function("cache_from_bytes", |b| {
        b.iter(|| TypedCache::from_bytes(black_box(&bytes)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_description_parse,
    bench_expand,
    bench_resolve_constant,
    bench_cache_roundtrip
);
criterion_main!(benches);
