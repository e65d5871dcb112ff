use std::path::Path;

use anyhow::Result;
use netscene::{
    scenario::{Scenario, ScenarioConfig},
    Config,
};

pub(super) fn run(
    config: Option<&Path>,
    shared: Option<usize>,
    stations: Option<usize>,
    seed: Option<u64>,
    tracing: bool,
    verbose: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(shared) = shared {
        config.n_shared = shared;
        // Keep the server on the last segment member unless a config file
        // pinned it elsewhere on purpose.
        config.server.endpoint = shared;
    }
    if let Some(stations) = stations {
        config.n_stations = stations;
        config.client.endpoint = stations.saturating_sub(1);
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    config.tracing |= tracing;

    let scenario = Scenario::build(&config, verbose)?;
    let report = scenario.run();

    println!("events dispatched: {}", report.events_dispatched);
    println!(
        "echo requests sent: {}, replies received: {}",
        report.requests_sent, report.replies_received
    );
    if tracing {
        for record in &report.trace {
            println!(
                "{} {:?} {:?} {} bytes",
                record.time,
                record.iface,
                record.direction,
                record.payload.len()
            );
        }
    }
    Ok(())
}
