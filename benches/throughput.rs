use std::net::{TcpListener, TcpStream};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;

use checkworker::protocol::{FrameStream, Incoming, checksum};

fn frame_pair() -> (FrameStream, FrameStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    let max = 64 * 1024 * 1024;
    (FrameStream::new(client, max), FrameStream::new(server, max))
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [1usize << 10, 1 << 16, 1 << 20] {
        let payload = vec![0xA5u8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| checksum(payload));
        });
    }
    group.finish();
}

fn bench_frame_round_trip(c: &mut Criterion) {
    let (controller, worker) = frame_pair();
    let source = "key = \"value\"\n".repeat(512);
    let data = json!([source]);

    c.bench_function("frame_round_trip", |b| {
        b.iter(|| {
            controller
                .send_job("toml", "bench.toml", &data)
                .expect("send");
            match worker.recv_message().expect("recv") {
                Incoming::Job { .. } => {}
                other => panic!("expected job, got {other:?}"),
            }
        });
    });
}

criterion_group!(benches, bench_checksum, bench_frame_round_trip);
criterion_main!(benches);
