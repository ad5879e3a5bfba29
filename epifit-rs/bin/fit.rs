use std::{env, error::Error, fs};

use epifit::{config::Config, prelude::*};
use log::*;
use rand::{rngs::SmallRng, SeedableRng};
use serde::Serialize;
use simple_logger::SimpleLogger;

/// Observed and fitted case counts at each observation time.
#[derive(Serialize, Debug)]
struct FitRow {
    day: Time,
    observed: Real,
    fitted: Real,
}

pub fn main() -> std::result::Result<(), Box<dyn Error>> {
    let path = env::args().nth(1);
    let cfg = Config::load(path.as_deref())?;
    let level = if cfg.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    SimpleLogger::new().with_level(level).init()?;

    let obs = cfg
        .observations()?
        .ok_or("no case series configured (set `data` in the configuration file)")?;
    let initial = cfg.fit_initial_fractions(&obs);
    let y0 = cfg.model.initial_state(&initial)?;
    let est = cfg.estimator();

    let res = if cfg.starts > 1 {
        let mut rng = match cfg.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        est.fit_multistart(&cfg.model, &y0, &obs, &cfg.rates, cfg.starts, cfg.spread, &mut rng)?
    } else {
        est.fit(&cfg.model, &y0, &obs, &cfg.rates)?
    };

    println!("model:       {}", cfg.model.name());
    println!("{}", res);
    if res.residual().is_finite() {
        match est.residual_sum_of_squares(&cfg.model, &y0, &obs, res.params()) {
            Ok(rss) => println!("RSS check:   {:.6e}", rss),
            Err(err) => warn!("could not recompute residual: {}", err),
        }
    }

    if let (Some(path), Some(tr)) = (&cfg.output, res.trajectory()) {
        let mut wtr = csv::Writer::from_writer(fs::File::create(path)?);
        let rows = obs.times().iter().zip(obs.infected()).zip(tr.infected());
        for ((&day, &observed), &fitted) in rows {
            wtr.serialize(FitRow {
                day,
                observed: observed * cfg.population,
                fitted: fitted * cfg.population,
            })?;
        }
        wtr.flush()?;
        info!("wrote fitted curve to {}", path.display());
    }
    Ok(())
}
