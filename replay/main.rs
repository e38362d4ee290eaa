use merge_planner::models::{Stream, VehicleId};
use merge_planner::simulation::memory::{two_stream_simulation, MAINLINE_ROUTE, RAMP_ROUTE};
use merge_planner::simulation::VehicleParams;
use merge_planner::{drive_tick, MergeScheduler, SchedulerConfig, Simulation};
use serde::Deserialize;
use std::env;
use std::error::Error;
use std::fs;
use std::process::ExitCode;

/// One vehicle entering the network
#[derive(Debug, Deserialize)]
struct Arrival {
    vehicle: String,
    time: f64,
    speed: f64,
    #[serde(default)]
    params: VehicleParams,
}

fn load_arrivals(path: &str) -> Result<Vec<Arrival>, Box<dyn Error>> {
    let json = fs::read_to_string(path)?;
    let mut arrivals: Vec<Arrival> = serde_json::from_str(&json)?;
    arrivals.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(arrivals)
}

fn run(arrivals_path: &str, config_path: Option<&str>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => SchedulerConfig::from_path(path)?,
        None => SchedulerConfig::default(),
    };
    let arrivals = load_arrivals(arrivals_path)?;

    // Step length from environment or default to 0.1 s
    let step = env::var("REPLAY_STEP")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| *s > 0.0)
        .unwrap_or(0.1);

    let scheduler = MergeScheduler::new(config)?;
    let mut simulation = two_stream_simulation(step);
    let mut pending = arrivals.into_iter().peekable();
    let (mut admitted, mut rejected, mut deviations) = (0usize, 0usize, 0usize);

    log::info!("Replaying {} arrivals at {step} s steps", pending.len());

    loop {
        let now = simulation.time();
        while let Some(arrival) = pending.next_if(|arrival| arrival.time <= now + 1e-9) {
            let vehicle = VehicleId::from(arrival.vehicle.as_str());
            let route = match scheduler.config().classify(&vehicle) {
                Some(Stream::Mainline) => MAINLINE_ROUTE,
                Some(Stream::Ramp) => RAMP_ROUTE,
                None => {
                    log::warn!("Skipping {vehicle}: no stream matches its id");
                    rejected += 1;
                    continue;
                }
            };
            simulation.spawn_at_depart(vehicle.clone(), route, arrival.params, arrival.speed)?;

            match scheduler.admit(&mut simulation, &vehicle) {
                Ok(outcome) => {
                    admitted += 1;
                    log::info!(
                        "{vehicle} arrives at {now:.1}s, merges at {:.1}s ({:.1} m/s)",
                        outcome.commitment.time,
                        outcome.commitment.speed
                    );
                    for other in &outcome.cascaded {
                        log::info!("  {other} re-planned behind {vehicle}");
                    }
                }
                Err(error) => {
                    rejected += 1;
                    log::warn!("{vehicle} rejected: {error}");
                }
            }
        }

        let report = drive_tick(&scheduler, &mut simulation);
        deviations += report.deviations.len();
        for vehicle in &report.withdrawn {
            log::info!("{vehicle} left the network at {now:.1}s");
        }

        if pending.peek().is_none() && simulation.vehicle_ids().is_empty() {
            break;
        }
        simulation.step();
    }

    for record in scheduler.commitments() {
        log::info!(
            "merge order: {} at {:.1}s, {:.1} m/s",
            record.vehicle_id,
            record.time,
            record.speed
        );
    }
    let report = scheduler.check_consistency();
    report.log_anomalies();
    log::info!(
        "{admitted} admitted, {rejected} rejected, {deviations} deviations, schedule {}",
        if report.is_clean() { "consistent" } else { "INCONSISTENT" }
    );
    scheduler.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(arrivals_path) = args.first() else {
        eprintln!("usage: merge-replay <arrivals.json> [scheduler.json]");
        return ExitCode::FAILURE;
    };

    match run(arrivals_path, args.get(1).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("Replay failed: {error}");
            ExitCode::FAILURE
        }
    }
}
