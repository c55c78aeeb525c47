//! Strategy Evolution CLI - Inspect persisted evolution runs.

use std::fs;
use std::path::PathBuf;

use strategy_evolution::{
    evolution::{EvolutionState, StateStore},
    schema::EvolutionConfig,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <state.json> | --list <state_dir> | --check <config.json> | --example",
            args[0]
        );
        eprintln!();
        eprintln!("Inspect a persisted strategy evolution run.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  state.json        Path to a saved evolution state");
        eprintln!("  --list state_dir  List evolution ids saved in a directory");
        eprintln!("  --check config    Validate an evolution configuration file");
        eprintln!("  --example         Print the default evolution configuration");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--example" => print_example_config(),
        "--check" => {
            let Some(path) = args.get(2) else {
                eprintln!("--check requires a config path");
                std::process::exit(1);
            };
            check_config(path);
        }
        "--list" => {
            let dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| {
                EvolutionConfig::default().state_dir
            });
            list_runs(StateStore::new(dir));
        }
        path => {
            let state = StateStore::load_path(path).unwrap_or_else(|e| {
                eprintln!("Error loading state: {}", e);
                std::process::exit(1);
            });
            print_summary(&state);
        }
    }
}

fn check_config(path: &str) {
    let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    println!(
        "OK: {} generations x {} variants, elite pool {}, state in {}",
        config.max_generations,
        config.variants_per_generation,
        config.elite_pool_size,
        config.state_dir.display()
    );
}

fn list_runs(store: StateStore) {
    let ids = store.list().unwrap_or_else(|e| {
        eprintln!("Error listing {}: {}", store.dir().display(), e);
        std::process::exit(1);
    });

    if ids.is_empty() {
        println!("No evolution runs in {}", store.dir().display());
        return;
    }

    for id in ids {
        match store.load(&id) {
            Ok(state) => println!(
                "{}  {:<11} generation {:>3}  best {}",
                id,
                state.status.to_string(),
                state.current_generation,
                format_fitness(state.elite_pool.get_best().and_then(|v| v.fitness))
            ),
            Err(e) => println!("{}  unreadable: {}", id, e),
        }
    }
}

fn print_summary(state: &EvolutionState) {
    println!("Strategy Evolution");
    println!("==================");
    println!("Id: {}", state.evolution_id);
    println!("Status: {}", state.status);
    if let Some(reference) = &state.source_reference {
        println!("Source: {}", reference);
    }
    println!("Generation: {}", state.current_generation);
    println!(
        "Without improvement: {}",
        state.generations_without_improvement
    );
    if let Some(rate) = state.current_mutation_rate {
        println!("Mutation rate: {:.2}", rate);
    }
    if let Some(reason) = &state.stop_reason {
        println!("Stopped: {}", reason);
    }
    println!(
        "Variants: {} ({} evaluated, {} failed)",
        state.all_variants.len(),
        state.evaluated_count(),
        state.failed_variants().len()
    );
    println!();

    println!("Generations:");
    for record in &state.generation_history {
        println!(
            "  {:>3}: {} variants, best {:.4} ({})",
            record.generation_num,
            record.variant_ids.len(),
            record.best_fitness,
            record.best_variant_id.as_deref().unwrap_or("-")
        );
    }
    println!();

    println!(
        "Elite pool ({}/{}):",
        state.elite_pool.len(),
        state.elite_pool.max_size()
    );
    for variant in state.elite_pool.variants() {
        println!(
            "  {}  fitness {}  sharpe {}  {}",
            variant.id,
            format_fitness(variant.fitness),
            format_fitness(variant.metric("sharpe_ratio")),
            variant.description
        );
    }

    if let Some(best) = state.elite_pool.get_best() {
        let lineage: Vec<&str> = state
            .lineage(&best.id)
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        println!();
        println!("Best lineage: {}", lineage.join(" <- "));
    }
}

fn format_fitness(value: Option<f64>) -> String {
    value
        .map(|f| format!("{:.4}", f))
        .unwrap_or_else(|| "-".to_string())
}

fn print_example_config() {
    let config = EvolutionConfig::default();

    println!("Example configuration (evolution.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}
