//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `grooplist_core` linkage.
//! - Print store distances for an optional `<lat> <lng>` pair.
//! - Keep output deterministic for quick local sanity checks.

use grooplist_core::{distance, CoreConfig, Location, ProximityNotifier};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("grooplist_core ping={}", grooplist_core::ping());
    println!("grooplist_core version={}", grooplist_core::core_version());

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return ExitCode::SUCCESS;
    }
    match parse_location(&args) {
        Ok(location) => {
            print_stores(&location);
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("usage: grooplist_cli [<latitude> <longitude>]");
            ExitCode::FAILURE
        }
    }
}

fn parse_location(args: &[String]) -> Result<Location, String> {
    let [lat, lng] = args else {
        return Err(format!("expected 2 arguments, got {}", args.len()));
    };
    let latitude = lat
        .parse::<f64>()
        .map_err(|err| format!("latitude `{lat}`: {err}"))?;
    let longitude = lng
        .parse::<f64>()
        .map_err(|err| format!("longitude `{lng}`: {err}"))?;
    Location::new(latitude, longitude, 0).map_err(|err| err.to_string())
}

fn print_stores(location: &Location) {
    let config = CoreConfig::default();
    let unit = config.distance_unit;
    for store in &config.stores {
        println!(
            "store id={} distance={:.2}{} name={}",
            store.id,
            distance(location, store, unit),
            unit.label(),
            store.name
        );
    }
    let notifier = ProximityNotifier::new(config.proximity().unwrap_or_default());
    let nearby = notifier.nearby(location, &config.stores);
    println!("nearby count={}", nearby.len());
    for entry in nearby {
        println!("nearby id={} distance={:.2}", entry.poi.id, entry.distance);
    }
}
