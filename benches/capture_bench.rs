// benches/capture_bench.rs
//! Write and read throughput of the capture container

use chrono::{Duration, Utc};
use continuum::{ByteChannel, CaptureReader, CaptureWriter, DecodedRecord, Result, TypeCodec, TypeRegistry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

const RECORDS: usize = 1_000;

struct NullCodec(Uuid);

impl TypeCodec for NullCodec {
    fn type_id(&self) -> Uuid {
        self.0
    }

    fn execute(&self, _: &DecodedRecord) -> Result<()> {
        Ok(())
    }
}

fn setup(payload_len: usize) -> (Arc<TypeRegistry>, Vec<DecodedRecord>) {
    let id = Uuid::new_v4();
    let registry = Arc::new(TypeRegistry::new());
    registry.add(Arc::new(NullCodec(id))).unwrap();

    let mut rng = rand::thread_rng();
    let start = Utc::now();
    let records = (0..RECORDS)
        .map(|i| {
            let mut payload = vec![0u8; payload_len];
            rng.fill_bytes(&mut payload);
            DecodedRecord::new(id, payload, start + Duration::milliseconds(i as i64))
        })
        .collect();

    (registry, records)
}

fn write_container(registry: &Arc<TypeRegistry>, records: &[DecodedRecord]) -> Arc<ByteChannel> {
    let channel = Arc::new(ByteChannel::in_memory());
    let mut writer = CaptureWriter::new(Arc::clone(&channel), Arc::clone(registry));
    for record in records {
        writer.write(record).unwrap();
    }
    channel
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for payload_len in [64usize, 1024, 16 * 1024] {
        let (registry, records) = setup(payload_len);
        group.throughput(Throughput::Bytes((payload_len * RECORDS) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &records,
            |b, records| b.iter(|| black_box(write_container(&registry, records))),
        );
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for payload_len in [64usize, 1024, 16 * 1024] {
        let (registry, records) = setup(payload_len);
        let bytes = write_container(&registry, &records).snapshot().unwrap();

        group.throughput(Throughput::Bytes((payload_len * RECORDS) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payload_len), &bytes, |b, bytes| {
            b.iter(|| {
                let channel = Arc::new(ByteChannel::from_bytes(bytes.clone()));
                let mut reader = CaptureReader::open(channel, Arc::clone(&registry)).unwrap();
                for _ in 0..RECORDS {
                    black_box(reader.read().unwrap());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
