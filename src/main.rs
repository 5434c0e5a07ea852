use std::path::PathBuf;

use capsule_design::*;
use clap::Parser;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Optimizes the spring and damper of a drop capsule"
)]
struct Cli {
    /// TOML design configuration (reference design when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also search the descent thrust
    #[arg(long)]
    optimize_thrust: bool,

    /// Seed for the optimizer restarts
    #[arg(long)]
    seed: Option<u64>,

    /// Print a peak-acceleration grid with this many points per axis
    #[arg(long)]
    sweep: Option<usize>,
}

fn print_sweep(study: &DesignStudy, points: usize) -> Result<(), Box<dyn std::error::Error>> {
    let impact_velocity = study
        .descent
        .model
        .impact_velocity(study.descent.initial, &study.descent.settings)?;
    let (k_min, k_max) = study.bounds.spring_constant;
    let (c_min, c_max) = study.bounds.damping_coefficient;
    let spring_constants = linspace(k_min, k_max, points);
    let damping_coefficients = linspace(c_min, c_max, points);

    let grid = sweep_peak_acceleration(
        study.constants,
        study.capsule_mass,
        impact_velocity,
        &spring_constants,
        &damping_coefficients,
        &study.impact_settings,
    )?;

    println!("\n--- Peak Acceleration (m/s²) ---");
    let header: Vec<String> = damping_coefficients
        .iter()
        .map(|c| format!("{:>10.3}", c))
        .collect();
    println!("{:>10} {}", "k \\ c", header.join(" "));
    for (k, row) in spring_constants.iter().zip(&grid) {
        let cells: Vec<String> = row.iter().map(|a| format!("{:>10.2}", a)).collect();
        println!("{:>10.3} {}", k, cells.join(" "));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DesignConfig::load(path)?,
        None => DesignConfig::default(),
    };
    if cli.optimize_thrust {
        config.optimizer.optimize_thrust = true;
    }
    if let Some(seed) = cli.seed {
        config.optimizer.seed = seed;
    }

    let study = config.to_study()?;
    let report = study.run()?;
    report.display_data();

    if let Some(points) = cli.sweep {
        print_sweep(&study, points)?;
    }

    Ok(())
}
