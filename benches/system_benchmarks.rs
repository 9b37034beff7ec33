use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use proc_monitor::{
    metrics::{
        cpu::{cpu_load, CPU_COLUMNS},
        CpuSample, MemorySample, NetworkSample, ProcessDescriptor,
    },
    Encode, OutputMode, Saver,
};

fn stat_content(cores: usize) -> String {
    let mut content = String::from("cpu  123456 789 45678 9876543 1234 0 567 0 0 0\n");
    for i in 0..cores {
        content.push_str(&format!("cpu{} 12345 78 4567 987654 123 0 56 0 0 0\n", i));
    }
    content.push_str("intr 123456789 0 0 0\nctxt 987654321\nbtime 1700000000\n");
    content.push_str("processes 123456\nprocs_running 3\nprocs_blocked 0\n");
    content
}

fn net_dev_content(interfaces: usize) -> String {
    let mut content = String::from(
        "Inter-|   Receive                                                |  Transmit\n \
         face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
    );
    for i in 0..interfaces {
        content.push_str(&format!(
            "  eth{}: 123456789 12345 0 0 0 0 0 0 98765432 9876 0 0 0 0 0 0\n",
            i
        ));
    }
    content
}

/// Benchmark /proc/stat parsing for growing core counts
fn bench_cpu_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_stat_parsing");
    for cores in [4usize, 16, 64] {
        let content = stat_content(cores);
        group.bench_with_input(BenchmarkId::from_parameter(cores), &content, |b, content| {
            b.iter(|| CpuSample::parse(black_box(content)).expect("Should parse"))
        });
    }
    group.finish();
}

/// Benchmark the load computation between two samples
fn bench_cpu_load(c: &mut Criterion) {
    let mut first = [0u64; CPU_COLUMNS];
    let mut second = [0u64; CPU_COLUMNS];
    first[..4].copy_from_slice(&[100, 0, 50, 800]);
    second[..4].copy_from_slice(&[110, 0, 60, 810]);

    c.bench_function("cpu_load", |b| {
        b.iter(|| cpu_load(black_box(&first), black_box(&second)))
    });
}

/// Benchmark /proc/meminfo, /proc/net/dev and pid stat parsing
fn bench_other_parsers(c: &mut Criterion) {
    let meminfo = "MemTotal:       16384000 kB\nMemFree:         8192000 kB\n\
                   MemAvailable:   12000000 kB\nBuffers:          100000 kB\n\
                   SwapTotal:       4096000 kB\nSwapFree:        1024000 kB\n\
                   VmallocTotal:   34359738367 kB\nVmallocUsed:       50000 kB\n";
    c.bench_function("meminfo_parsing", |b| {
        b.iter(|| MemorySample::parse(black_box(meminfo)).expect("Should parse"))
    });

    let net_dev = net_dev_content(8);
    c.bench_function("net_dev_parsing", |b| {
        b.iter(|| NetworkSample::parse(black_box(&net_dev)).expect("Should parse"))
    });

    let stat = "1234 (Web Content) S 1 1234 1234 0 -1 4194560 100 0 0 0 42 17 0 0 20 0 3 0 1000 1000000 200";
    c.bench_function("pid_stat_parsing", |b| {
        b.iter(|| ProcessDescriptor::parse(black_box(stat)).expect("Should parse"))
    });
}

/// Benchmark incremental JSON array appends against plain CSV appends
fn bench_saver(c: &mut Criterion) {
    let sample = MemorySample::parse("MemTotal: 1000 kB\nMemFree: 400 kB\n").expect("Should parse");
    let dir = tempfile::tempdir().expect("Should create temp dir");

    for mode in [OutputMode::Csv, OutputMode::Json] {
        let path = dir.path().join(format!("bench.{}", mode.extension()));
        let mut saver = Saver::create(path, mode).expect("Should create saver");
        c.bench_function(&format!("saver_append_{}", mode), |b| {
            b.iter(|| saver.save(black_box(&sample as &dyn Encode)).expect("Should save"))
        });
        saver.close().expect("Should close");
    }
}

criterion_group!(
    benches,
    bench_cpu_parsing,
    bench_cpu_load,
    bench_other_parsers,
    bench_saver
);
criterion_main!(benches);
