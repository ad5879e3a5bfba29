use std::{env, error::Error, fs, io};

use epifit::{config::Config, ode::sweep, prelude::*};
use log::*;
use serde::Serialize;
use simple_logger::SimpleLogger;

/// One line of the sweep summary.
#[derive(Serialize, Debug)]
struct SweepRow {
    beta: Real,
    gamma: Real,
    r0: Real,
    peak_time: Option<Time>,
    peak_infected: Option<Real>,
    error: Option<String>,
}

fn output(cfg: &Config) -> io::Result<Box<dyn io::Write>> {
    let out: Box<dyn io::Write> = match &cfg.output {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(io::stdout()),
    };
    Ok(out)
}

pub fn main() -> std::result::Result<(), Box<dyn Error>> {
    let path = env::args().nth(1);
    let cfg = Config::load(path.as_deref())?;
    let level = if cfg.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    SimpleLogger::new().with_level(level).init()?;
    if cfg.verbose {
        eprintln!("{:#?}", cfg);
    }

    let grid = cfg.time_grid()?;
    let model = &cfg.model;

    match &cfg.sweep {
        None => {
            let tr = simulate(model, &cfg.initial, &cfg.rates, &grid, &cfg.solver)?;
            if let Some((t, i)) = tr.peak() {
                info!("{}: infected peak of {:.4} at t = {}", model.name(), i, t);
            }
            tr.write_csv(output(&cfg)?)?;
        }
        Some(sw) => {
            let points = sweep(
                model,
                &cfg.initial,
                &cfg.rates,
                &sw.betas,
                &sw.gammas,
                &grid,
                &cfg.solver,
            )?;
            let mut wtr = csv::Writer::from_writer(output(&cfg)?);
            for point in points {
                let params = model.rates_to_vec(&point.rates)?;
                let peak = point.trajectory.as_ref().ok().and_then(|tr| tr.peak());
                wtr.serialize(SweepRow {
                    beta: point.rates.beta,
                    gamma: point.rates.gamma,
                    r0: model.basic_reproduction_number(&params),
                    peak_time: peak.map(|p| p.0),
                    peak_infected: peak.map(|p| p.1),
                    error: point.trajectory.err().map(|e| e.to_string()),
                })?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}
