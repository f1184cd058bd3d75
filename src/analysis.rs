use crate::config::Config;
use crate::grid::{Cell, Neighborhood};
use crate::model::Record;
use crate::stats::{Accumulator, TimeSeries};
use anyhow::{Context, Result, bail};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Observable computed from a sequence of simulation records.
pub trait Obs {
    fn update(&mut self, record: &Record) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Fractions of vacant, type A and type B cells.
pub struct CellFracs {
    n_cells: usize,
    acc_vec: [Accumulator; 3],
}

impl CellFracs {
    const CELLS: [Cell; 3] = [Cell::Vacant, Cell::TypeA, Cell::TypeB];

    pub fn new(cfg: &Config) -> Self {
        Self {
            n_cells: cfg.grid.n_rows * cfg.grid.n_cols,
            acc_vec: Default::default(),
        }
    }
}

impl Obs for CellFracs {
    fn update(&mut self, record: &Record) -> Result<()> {
        let grid = &record.grid;
        if grid.n_cells() != self.n_cells {
            bail!(
                "grid must have {} cells, but has {}",
                self.n_cells,
                grid.n_cells()
            );
        }

        let counts = Self::CELLS.map(|cell| grid.count(cell));
        let total: usize = counts.iter().sum();
        if total != self.n_cells {
            bail!("cell counts sum to {total}, but grid has {} cells", self.n_cells);
        }

        for (acc, count) in self.acc_vec.iter_mut().zip(counts) {
            acc.add(count as f64 / self.n_cells as f64);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let [vacant, type_a, type_b] = &self.acc_vec;
        serde_json::json!({
            "cell_fracs": {
                "vacant": vacant.report(),
                "type_a": type_a.report(),
                "type_b": type_b.report(),
            }
        })
    }
}

pub struct SatisfiedPct {
    time_series: TimeSeries,
}

impl SatisfiedPct {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for SatisfiedPct {
    fn update(&mut self, record: &Record) -> Result<()> {
        self.time_series.push(record.satisfied_pct);
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "satisfied_pct": self.time_series.report() })
    }
}

/// Number of unsatisfied agents, and how often the grid was stable.
pub struct NUnsatisfied {
    time_series: TimeSeries,
    prob_stable: Accumulator,
}

impl NUnsatisfied {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
            prob_stable: Accumulator::new(),
        }
    }
}

impl Obs for NUnsatisfied {
    fn update(&mut self, record: &Record) -> Result<()> {
        self.time_series.push(record.n_unsatisfied as f64);
        self.prob_stable
            .add(if record.n_unsatisfied == 0 { 1.0 } else { 0.0 });
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "n_unsatisfied": self.time_series.report(),
            "prob_stable": self.prob_stable.report(),
        })
    }
}

/// Mean share of like neighbors, a measure of segregation.
pub struct SameTypeFrac {
    neighborhood: Neighborhood,
    time_series: TimeSeries,
}

impl SameTypeFrac {
    pub fn new(cfg: &Config) -> Self {
        Self {
            neighborhood: cfg.model.neighborhood,
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for SameTypeFrac {
    fn update(&mut self, record: &Record) -> Result<()> {
        let frac = record.grid.same_type_fraction(self.neighborhood);
        // No agent has an occupied neighbor.
        if !frac.is_nan() {
            self.time_series.push(frac);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "same_type_frac": self.time_series.report() })
    }
}

pub struct Analyzer {
    cfg: Config,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: Config) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(CellFracs::new(&cfg)),
            Box::new(SatisfiedPct::new()),
            Box::new(NUnsatisfied::new()),
            Box::new(SameTypeFrac::new(&cfg)),
        ];
        Self { cfg, obs_ptr_vec }
    }

    /// Read every record of a trajectory file and update all observables.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        for _ in 0..self.cfg.output.saves_per_file {
            let record = decode::from_read(&mut reader).context("failed to read record")?;
            self.add_record(&record)?;
        }
        Ok(())
    }

    pub fn add_record(&mut self, record: &Record) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(record).context("failed to update observable")?;
        }
        Ok(())
    }

    pub fn reports(&self) -> Vec<serde_json::Value> {
        self.obs_ptr_vec.iter().map(|obs| obs.report()).collect()
    }

    /// Write the reports of all observables to a JSON file.
    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, &self.reports())
            .context("failed to serialize results")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: usize, n_unsatisfied: usize, text: &str) -> Record {
        let grid: crate::grid::Grid = text.parse().unwrap();
        let n_cells = grid.n_cells();
        Record {
            step,
            n_unsatisfied,
            satisfied_pct: (n_cells - n_unsatisfied) as f64 / n_cells as f64 * 100.0,
            grid,
        }
    }

    #[test]
    fn reports_all_observables() {
        let mut analyzer = Analyzer::new(Config::with_dims(2, 2));
        analyzer.add_record(&record(1, 2, "AB\n.A")).unwrap();
        analyzer.add_record(&record(2, 0, "AA\n.B")).unwrap();

        let reports = analyzer.reports();
        assert_eq!(reports.len(), 4);

        let cell_fracs = &reports[0]["cell_fracs"];
        assert_eq!(cell_fracs["vacant"]["mean"], 0.25);
        assert_eq!(cell_fracs["type_a"]["n_vals"], 2);

        let prob_stable = &reports[2]["prob_stable"];
        assert_eq!(prob_stable["mean"], 0.5);

        assert!(reports[3]["same_type_frac"].is_object());
    }

    #[test]
    fn rejects_mismatched_grid() {
        let mut analyzer = Analyzer::new(Config::with_dims(3, 3));
        assert!(analyzer.add_record(&record(1, 0, "AB\n.A")).is_err());
    }
}
