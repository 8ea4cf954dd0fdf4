//! Evolving a small fog network two ways: with the built-in steady-state
//! engine, and with a generic `symbios-genetics` algorithm.
//!
//! Run with: `cargo run --example fog_network`

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_fognet::{
    EvolutionEngine, EvolverConfig, FitnessConfig, FitnessEvaluator, GridConfig, Heuristic,
    NecroticFilter, NetworkEvaluator, Sda, SdaConfig, SteadyState, Topology, TrafficConfig,
};
use symbios_genetics::{algorithms::simple::SimpleGA, Evolver};

fn main() {
    println!("Fog Network Example");
    println!("===================\n");

    let seed = 42;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let grid = GridConfig::new(6, 6, 2, 1, 6);
    let topology = Topology::random(&grid, &TrafficConfig::default(), &mut rng)
        .expect("grid fits the node counts");

    println!("Layout:");
    print!("{}", topology.layout());
    println!(
        "\nNodes: {} edge, {} mid, {} cloud ({} candidate links)\n",
        topology.num_edge_nodes(),
        topology.num_mid_nodes(),
        topology.num_cloud_nodes(),
        topology.phenotype_len()
    );

    let sda = SdaConfig::binary(12, topology.phenotype_len());
    let config = EvolverConfig {
        pop_size: 50,
        tournament_size: 5,
        mutation_rate: 0.5,
        fitness: FitnessConfig {
            heuristic: Heuristic::DistanceEnergy,
            ..FitnessConfig::default()
        },
        ..EvolverConfig::default()
    };

    // Built-in steady-state engine
    let mut engine = SteadyState::new(config.clone(), sda.clone(), topology.clone(), seed)
        .expect("a viable population exists");
    let events = 2000;
    for event in 0..events {
        engine.step().expect("mating event");
        if event % 250 == 0 || event == events - 1 {
            let population = engine.population();
            let best = population
                .best()
                .and_then(|m| m.vitality.fitness())
                .unwrap_or(f64::NAN);
            let avg = population.average_live_fitness().unwrap_or(f64::NAN);
            println!(
                "Event {:4}: best={:.4}, avg={:.4}, live={}",
                event,
                best,
                avg,
                population.live_count()
            );
        }
    }

    let report = engine.report().expect("report");
    println!("\nSteady-state result:\n{}", report);

    // Generic algorithm on the same network
    let evaluator = NetworkEvaluator::new(
        topology,
        FitnessEvaluator::new(config.fitness),
        NecroticFilter::default(),
    );
    let initial: Vec<Sda> = (0..50).map(|_| Sda::random(&sda, &mut rng)).collect();
    let mut ga = SimpleGA::new(initial, 1.0, 2, seed);

    for _ in 0..100 {
        ga.step(&evaluator);
    }

    let champion = ga
        .population()
        .iter()
        .filter(|p| p.fitness.is_finite())
        .max_by(|a, b| a.fitness.total_cmp(&b.fitness));
    match champion {
        Some(best) => println!("SimpleGA best score: {:.4}", -best.fitness),
        None => println!("SimpleGA found no viable network"),
    }
}
