//! Benchmarks for symbios-fognet.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_fognet::{
    ConnectionMode, EvolverConfig, FitnessConfig, GridConfig, Heuristic, Sda, SdaConfig,
    SteadyState, Topology, TrafficConfig,
};

fn default_topology(rng: &mut ChaCha8Rng) -> Topology {
    Topology::random(&GridConfig::default(), &TrafficConfig::default(), rng).unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let config = SdaConfig::default();
    let sda = Sda::random(&config, &mut rng);

    c.bench_function("sda_decode_1000", |b| {
        b.iter(|| {
            black_box(sda.decode(1000).unwrap());
        });
    });
}

fn bench_mutation(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let sda = Sda::random(&SdaConfig::default(), &mut rng);

    c.bench_function("sda_mutation", |b| {
        let mut s = sda.clone();
        b.iter(|| {
            s.mutate_n(1, &mut rng).unwrap();
            black_box(&s);
        });
    });
}

fn bench_set_connections(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut topology = default_topology(&mut rng);
    let sda = Sda::random(&SdaConfig::binary(10, topology.phenotype_len()), &mut rng);
    let phenotype = sda.output().unwrap();

    c.bench_function("set_connections_32_nodes", |b| {
        b.iter(|| {
            black_box(
                topology
                    .set_connections(&phenotype, ConnectionMode::Enforced)
                    .unwrap(),
            );
        });
    });
}

fn bench_traffic(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut topology = default_topology(&mut rng);
    let all = vec![1; topology.phenotype_len()];
    topology
        .set_connections(&all, ConnectionMode::Enforced)
        .unwrap();

    c.bench_function("distribute_traffic_complete_32", |b| {
        b.iter(|| {
            topology.distribute_traffic();
            topology.compute_energy_consumption();
            black_box(topology.energy_consumption());
        });
    });
}

fn bench_mating_event(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let grid = GridConfig::new(6, 6, 2, 1, 6);
    let topology = Topology::random(&grid, &TrafficConfig::default(), &mut rng).unwrap();
    let sda = SdaConfig::binary(10, topology.phenotype_len());
    let config = EvolverConfig {
        pop_size: 30,
        tournament_size: 5,
        fitness: FitnessConfig {
            heuristic: Heuristic::All,
            ..FitnessConfig::default()
        },
        ..EvolverConfig::default()
    };
    let mut engine = SteadyState::new(config, sda, topology, 42).unwrap();

    c.bench_function("steady_mating_event", |b| {
        b.iter(|| {
            black_box(engine.mating_event().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_decode,
    bench_mutation,
    bench_set_connections,
    bench_traffic,
    bench_mating_event,
);
criterion_main!(benches);
