use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nice_bust4::codes::submenu;
use nice_bust4::receiver::FrameReceiver;
use nice_bust4::{
    validate_frame, BusAddress, CommandEncoder, ControlCommand, Packet, RunMode, Whose,
};

const GET_MAN: [u8; 16] = [
    0x55, 0x0D, 0x00, 0xFF, 0x00, 0x66, 0x08, 0x06, 0x97, 0x00, 0x08, 0x99, 0x00, 0x00, 0x91,
    0x0D,
];

fn bench_encode(c: &mut Criterion) {
    let encoder = CommandEncoder::new(BusAddress::CONTROLLER, BusAddress::BROADCAST);

    c.bench_function("encode_control", |b| {
        b.iter(|| encoder.control(black_box(ControlCommand::StepByStep)))
    });

    c.bench_function("encode_info_request", |b| {
        b.iter(|| {
            encoder.info(
                BusAddress::BROADCAST,
                Whose::ControlUnit,
                black_box(submenu::CUR_POS),
                RunMode::Get,
                0x00,
                &[],
            )
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("validate_frame", |b| {
        b.iter(|| validate_frame(black_box(&GET_MAN)))
    });

    c.bench_function("decode_packet", |b| {
        b.iter(|| Packet::decode(black_box(&GET_MAN)))
    });

    c.bench_function("receiver_stream", |b| {
        let stream: Vec<u8> = GET_MAN.iter().copied().cycle().take(GET_MAN.len() * 32).collect();
        b.iter(|| {
            let mut rx = FrameReceiver::new(Duration::from_millis(50));
            let now = Instant::now();
            stream
                .iter()
                .filter_map(|byte| rx.push(*byte, now))
                .count()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
