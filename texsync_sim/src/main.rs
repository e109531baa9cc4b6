//! texsync Simulator CLI
//!
//! Run deterministic replication scenarios under injected network faults.

use clap::Parser;
use texsync_core::Dimensions;
use texsync_sim::scenarios::ScenarioId;
use texsync_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// texsync Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "texsync-sim")]
#[command(about = "Run deterministic replication scenarios for texsync", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,
    
    /// Number of follower nodes
    #[arg(short, long, default_value = "3")]
    followers: usize,
    
    /// Scenario to run (steady, lossy, duplicates, reorder, partition, reset_midrun, forced_regen, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,
    
    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,
    
    /// Simulation duration in seconds, before quiescence
    #[arg(short, long, default_value = "10")]
    duration: f64,
    
    /// Texture side length in pixels
    #[arg(long, default_value = "64")]
    size: usize,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
    
    /// Export per-tick frames to a JSON file
    #[arg(long)]
    export: Option<String>,
    
    /// Write follower 0's final texture to an image file (.ppm or .png)
    #[arg(long)]
    export_image: Option<String>,
}

fn main() {
    let args = Args::parse();
    
    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
    
    if !args.json {
        info!("texsync Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            );
            std::process::exit(1);
        })]
    };
    
    let dims = Dimensions::square(args.size).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    
    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };
    
    // Handle export mode
    if args.export.is_some() || args.export_image.is_some() {
        if scenarios.len() > 1 || args.seeds > 1 {
            eprintln!("Error: --export and --export-image only support a single scenario and seed");
            std::process::exit(1);
        }
        
        let runner = ScenarioRunner::new(base_seed, args.followers)
            .with_duration(args.duration)
            .with_dimensions(dims);
        let run = runner.run_recorded(scenarios[0]);
        
        if let Some(path) = &args.export {
            match run.export.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", run.export.frames.len(), path),
                Err(e) => error!("Failed to write export: {:?}", e),
            }
        }
        if let Some(path) = &args.export_image {
            match run.texture.write_image(path) {
                Ok(()) => info!("Wrote {} texture to {}", dims, path),
                Err(e) => error!("Failed to write image: {:?}", e),
            }
        }
        
        report(&[run.result], args.json);
        return;
    }
    
    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        
        let runner = ScenarioRunner::new(seed, args.followers)
            .with_duration(args.duration)
            .with_dimensions(dims);
        
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            
            all_results.push(result);
        }
    }
    
    report(&all_results, args.json);
}

/// Prints the summary and exits non-zero if any run failed.
fn report(results: &[ScenarioResult], json: bool) {
    let total = results.len();
    let failed_count = results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;
    
    if json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize results: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            
            // List failed seeds
            for result in results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
    
    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
