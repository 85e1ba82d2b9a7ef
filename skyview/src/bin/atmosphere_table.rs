//! Refraction and extinction table for given observing conditions
//!
//! Prints, for a range of geometric altitudes, the apparent altitude after
//! refraction, the size of the refraction, how far the inverse model misses
//! the starting altitude, the airmass, and the extincted magnitude of a
//! reference star.
//!
//! Usage:
//! ```bash
//! RUST_LOG=debug cargo run --bin atmosphere_table -- --pressure 850 --temperature -5 --step 1
//! ```

use std::path::PathBuf;

use clap::Parser;
use nalgebra::Vector3;
use skyview::atmosphere::{AltitudeFrame, UndergroundExtinctionMode};
use skyview::transform::altitude_deg;
use skyview::{RefractionMode, SkyConfig};

#[derive(Parser, Debug)]
#[command(
    name = "Atmosphere Table",
    about = "Tabulates atmospheric refraction and extinction versus altitude",
    long_about = None
)]
struct Args {
    /// JSON sky config to start from (flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Atmospheric pressure in millibars
    #[arg(long)]
    pressure: Option<f64>,

    /// Air temperature in degrees Celsius
    #[arg(long)]
    temperature: Option<f64>,

    /// Extinction coefficient in magnitudes per airmass
    #[arg(long)]
    coefficient: Option<f64>,

    /// Airmass policy below the horizon
    #[arg(long, value_enum)]
    underground: Option<UndergroundExtinctionMode>,

    /// Lowest geometric altitude in degrees
    #[arg(long, default_value_t = -5.0, allow_negative_numbers = true)]
    min_alt: f64,

    /// Highest geometric altitude in degrees
    #[arg(long, default_value_t = 90.0, allow_negative_numbers = true)]
    max_alt: f64,

    /// Altitude step in degrees
    #[arg(long, default_value_t = 5.0)]
    step: f64,

    /// Magnitude of the reference star above the atmosphere
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    magnitude: f64,
}

fn alt_az(alt_deg: f64) -> Vector3<f64> {
    let alt = alt_deg.to_radians();
    Vector3::new(alt.cos(), 0.0, alt.sin())
}

/// Number of rows after the first, or why the altitude range is unusable
fn altitude_steps(min_alt: f64, max_alt: f64, step: f64) -> Result<usize, String> {
    let in_sky = |alt: f64| (-90.0..=90.0).contains(&alt);
    if !in_sky(min_alt) || !in_sky(max_alt) {
        return Err(format!("altitudes {min_alt}..{max_alt} outside [-90, 90]"));
    }
    if min_alt > max_alt {
        return Err(format!("min-alt {min_alt} exceeds max-alt {max_alt}"));
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(format!("step {step} must be positive and finite"));
    }
    Ok(((max_alt - min_alt) / step).floor() as usize)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SkyConfig::load_from_file(path)?,
        None => SkyConfig::default(),
    };
    if let Some(pressure) = args.pressure {
        config.pressure_mbar = pressure;
    }
    if let Some(temperature) = args.temperature {
        config.temperature_celsius = temperature;
    }
    if let Some(coefficient) = args.coefficient {
        config.extinction_coefficient = coefficient;
    }
    if let Some(mode) = args.underground {
        config.underground_extinction = mode;
    }
    config.validate()?;
    let steps = altitude_steps(args.min_alt, args.max_alt, args.step)?;

    let sky = config.build_context();
    log::info!(
        "Conditions: {:.1} mbar, {:.1} C, k = {:.3} mag/airmass",
        config.pressure_mbar,
        config.temperature_celsius,
        config.extinction_coefficient
    );

    println!("Atmosphere Table");
    println!("================");
    println!();
    println!(
        "{:>10} {:>10} {:>12} {:>14} {:>10} {:>10}",
        "Geo (deg)", "App (deg)", "Refr (')", "Residual (\")", "Airmass", "Mag"
    );

    for i in 0..=steps {
        let geometric_alt = args.min_alt + i as f64 * args.step;
        let geometric = alt_az(geometric_alt);

        let mut apparent = geometric;
        sky.geometric_to_apparent(&mut apparent, RefractionMode::On);
        let apparent_alt = altitude_deg(&apparent);

        let mut recovered = apparent;
        sky.apparent_to_geometric(&mut recovered, RefractionMode::On);
        let residual_arcsec = (altitude_deg(&recovered) - geometric_alt) * 3600.0;

        let airmass = sky
            .extinction()
            .airmass(apparent.z / apparent.norm(), AltitudeFrame::Apparent);
        let observed = sky.observe(&geometric, args.magnitude, RefractionMode::On);

        println!(
            "{:>10.2} {:>10.4} {:>12.3} {:>14.3} {:>10.3} {:>10.3}",
            geometric_alt,
            apparent_alt,
            (apparent_alt - geometric_alt) * 60.0,
            residual_arcsec,
            airmass,
            observed.magnitude
        );
    }

    Ok(())
}
