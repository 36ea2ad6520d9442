use codspeed_criterion_compat::{criterion_group, criterion_main, Criterion};
use rwkernel::{Engine, SerializeConfig};

fn run_script(filename: &str, program: &str) {
    let mut engine = Engine::default();
    engine
        .parse_and_run_program(Some(filename.to_owned()), program)
        .unwrap();
    // serialization is part of every file run
    let _serialized = engine.serialize(SerializeConfig::default());
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for entry in glob::glob("tests/scripts/*.rw").unwrap() {
        let path = entry.unwrap();
        let name = path.file_stem().unwrap().to_string_lossy().to_string();
        let filename = path.to_string_lossy().to_string();
        let program = std::fs::read_to_string(&filename).unwrap();
        c.bench_function(&name, |b| b.iter(|| run_script(&filename, &program)));
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
