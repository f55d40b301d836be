use criterion::{criterion_group, criterion_main, Criterion};
use rand::RngExt;
use std::hint::black_box;
use ublox_stream::{encode_ubx, MessageId, RingBuffer, PARSERS};

const GSV: &[u8] = b"$GPGSV,3,1,12,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*7F\r\n";

/// About 64 KiB of UBX NAV-PVT frames interleaved with NMEA and junk
fn capture() -> Vec<u8> {
    let pvt = encode_ubx(0x01, 0x07, &[0x5a; 92]).unwrap();
    let mut data = Vec::new();
    while data.len() < 64 * 1024 {
        data.extend_from_slice(&pvt);
        data.extend_from_slice(GSV);
        data.extend_from_slice(&[0x00, 0xb5, 0xd3, 0xff]);
    }
    data
}

fn decode_all(ring: &RingBuffer, data: &[u8], chunks: &[usize]) -> usize {
    let h = ring.take_read_handle().unwrap();
    let mut count = 0;
    let mut i = 0;
    for &chunk in chunks {
        ring.force_add(&data[i..i + chunk]);
        i += chunk;
        while let Ok((len, id)) = ring.parse_handle(h, &PARSERS) {
            if id != MessageId::Unknown {
                count += 1;
            }
            ring.discard_handle(h, len);
        }
    }
    ring.give_read_handle(h);
    count
}

fn random_chunks(len: usize, max: usize) -> Vec<usize> {
    let mut rng = rand::rng();
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < len {
        let chunk: usize = rng.random_range(1..max);
        let chunk = (len - i).min(chunk);
        chunks.push(chunk);
        i += chunk;
    }
    chunks
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let data = capture();
    for max_chunk in [16, 256, 1024] {
        let chunks = random_chunks(data.len(), max_chunk);
        c.bench_function(&format!("ring_decode_chunk_{}", max_chunk), |b| {
            let ring = RingBuffer::new(2048);
            b.iter(|| black_box(decode_all(&ring, &data, &chunks)))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
