//! Detection chain benchmarks
//!
//! Run with: cargo bench -p mmw-core --bench detection_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mmw_accel::{LocalMemory, SimulatedAccelerator, SimulatedTransfer};
use mmw_core::antenna::AntennaGeometry;
use mmw_core::aoa::{AngleEstimator, AoaConfig};
use mmw_core::cfar::{CfarConfig, CfarDetector, CfarSecondPassConfig};
use mmw_core::config::MmwConfig;
use mmw_core::pipeline::{PipelineScheduler, ResourcePolicy};
use mmw_core::radar_cube::AdcFrame;
use mmw_core::types::{DetectionMatrix, IQSample};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

// ============================================================================
// CFAR
// ============================================================================

fn noisy_matrix(range_bins: usize, angle_bins: usize) -> DetectionMatrix {
    let mut rng = StdRng::seed_from_u64(7);
    let floor = Normal::new(2000.0, 40.0).unwrap();
    let mut matrix = DetectionMatrix::new(range_bins, angle_bins, 1, 8).unwrap();
    for r in 0..range_bins {
        for a in 0..angle_bins {
            let mut v = floor.sample(&mut rng);
            if r % 17 == 5 && a % 11 == 3 {
                v += 1200.0;
            }
            matrix.set(0, r, a, v.clamp(0.0, u16::MAX as f64) as u16);
        }
    }
    matrix
}

fn bench_cfar(c: &mut Criterion) {
    let mut group = c.benchmark_group("cfar");

    for &range_bins in &[64usize, 256] {
        let angle_bins = 64;
        let matrix = noisy_matrix(range_bins, angle_bins);
        group.throughput(Throughput::Elements((range_bins * angle_bins) as u64));

        let range_only = CfarDetector::new(CfarConfig::default(), None, range_bins, angle_bins).unwrap();
        group.bench_with_input(BenchmarkId::new("range_pass", range_bins), &matrix, |b, m| {
            b.iter(|| range_only.detect(black_box(m)))
        });

        let two_pass = CfarDetector::new(
            CfarConfig::default(),
            Some(CfarSecondPassConfig::default()),
            range_bins,
            angle_bins,
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("two_pass", range_bins), &matrix, |b, m| {
            b.iter(|| two_pass.detect(black_box(m)))
        });
    }

    group.finish();
}

// ============================================================================
// Capon angle estimation
// ============================================================================

fn snapshots(geometry: &AntennaGeometry, count: usize) -> Vec<Vec<Complex64>> {
    let mut rng = StdRng::seed_from_u64(11);
    let noise = Normal::new(0.0, 0.1).unwrap();
    let a = geometry.steering_vector(20.0, 0.0);
    let b = geometry.steering_vector(-35.0, 0.0);
    (0..count)
        .map(|k| {
            let s1 = Complex64::from_polar(10.0, 0.7 * k as f64);
            let s2 = Complex64::from_polar(6.0, 1.9 * k as f64);
            a.iter()
                .zip(&b)
                .map(|(x, y)| x * s1 + y * s2 + Complex64::new(noise.sample(&mut rng), noise.sample(&mut rng)))
                .collect()
        })
        .collect()
}

fn bench_capon(c: &mut Criterion) {
    let mut group = c.benchmark_group("capon");

    for &antennas in &[4usize, 8, 12] {
        let geometry = AntennaGeometry::ula(antennas, 0.5);
        let estimator = AngleEstimator::new(AoaConfig::azimuth_only(), geometry.clone()).unwrap();
        let data = snapshots(&geometry, 32);

        group.bench_with_input(BenchmarkId::new("estimate", antennas), &data, |b, d| {
            b.iter(|| estimator.estimate(black_box(d)))
        });
    }

    group.finish();
}

// ============================================================================
// Full frame through the simulated engines
// ============================================================================

fn bench_frame(c: &mut Criterion) {
    let mut config = MmwConfig::default();
    config.pipeline.resource_policy = ResourcePolicy::Refuse;
    let memory = LocalMemory::shared();
    let mut scheduler = PipelineScheduler::new(
        &config,
        SimulatedAccelerator::new(memory.clone()),
        SimulatedTransfer::new(memory.clone()),
        memory,
    )
    .unwrap();
    scheduler.start();

    let g = &config.geometry;
    let frame = AdcFrame::from_fn(g.num_chirps, g.num_antennas(), g.samples_per_chirp, |c, a, s| {
        IQSample::from_polar(100.0, 0.3 * s as f64 + 0.4 * c as f64 + 0.9 * a as f64)
    })
    .unwrap();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));
    group.bench_function("process_frame", |b| {
        b.iter(|| scheduler.process_frame(black_box(&frame)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_cfar, bench_capon, bench_frame);
criterion_main!(benches);
