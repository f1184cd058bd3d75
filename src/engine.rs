use crate::config::{Config, GridConfig, MetricUpdate};
use crate::error::{SimError, SimResult};
use crate::grid::{Cell, Grid, Location};
use crate::model::Record;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Random probes made by [`Engine::find_vacant_location`] before it falls back
/// to sampling from the list of vacant locations.
const MAX_VACANT_PROBES: usize = 1024;

/// Decide whether an agent is satisfied with its neighborhood.
///
/// `n_same` of the `n_occupied` occupied neighbors share the agent's type.
/// An agent without occupied neighbors is never satisfied. Otherwise the share
/// of like neighbors must be strictly above `threshold`.
pub fn is_content(n_same: usize, n_occupied: usize, threshold: f64) -> bool {
    if n_occupied == 0 {
        return false;
    }
    n_same as f64 / n_occupied as f64 > threshold
}

fn satisfied_pct(n_cells: usize, n_unsatisfied: usize) -> f64 {
    (n_cells - n_unsatisfied) as f64 / n_cells as f64 * 100.0
}

/// Simulation engine.
///
/// Owns the configuration, the grid, the cached satisfied percentage and the
/// random number generator, and provides methods to initialize, step, reset,
/// run, save, and load simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    grid: Grid,
    satisfied_pct: f64,
    step: usize,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial grid.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;
        let grid = Grid::new(cfg.grid.n_rows, cfg.grid.n_cols)?;
        let mut engine = Self::with_grid(cfg, grid)?;
        engine
            .initialize()
            .context("failed to initialize grid")?;
        Ok(engine)
    }

    /// Create a new `Engine` over a caller-provided grid.
    ///
    /// The grid dimensions replace those in `cfg`.
    pub fn from_grid(mut cfg: Config, grid: Grid) -> Result<Self> {
        cfg.grid = GridConfig {
            n_rows: grid.n_rows(),
            n_cols: grid.n_cols(),
        };
        let mut engine = Self::with_grid(cfg, grid)?;
        engine.refresh_satisfied_pct()?;
        Ok(engine)
    }

    fn with_grid(cfg: Config, grid: Grid) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        Ok(Self {
            cfg,
            grid,
            satisfied_pct: 100.0,
            step: 0,
            rng,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Read-only view of the grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// State of the cell at `(row, col)`.
    pub fn cell(&self, row: usize, col: usize) -> SimResult<Cell> {
        self.grid.get(Location::new(row, col))
    }

    /// Satisfied percentage as of the last initialization, step or reset.
    pub fn satisfied_percent(&self) -> f64 {
        self.satisfied_pct
    }

    /// Number of steps performed since the last initialization.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Fill the grid with a new random configuration.
    ///
    /// Each cell is independently vacant with probability `prob_vacant`;
    /// occupied cells are type A with probability `prob_type_a` and type B otherwise.
    pub fn initialize(&mut self) -> Result<()> {
        let vacant_dist = Bernoulli::new(self.cfg.model.prob_vacant)?;
        let type_a_dist = Bernoulli::new(self.cfg.model.prob_type_a)?;

        for row in 0..self.grid.n_rows() {
            for col in 0..self.grid.n_cols() {
                let cell = if vacant_dist.sample(&mut self.rng) {
                    Cell::Vacant
                } else if type_a_dist.sample(&mut self.rng) {
                    Cell::TypeA
                } else {
                    Cell::TypeB
                };
                self.grid.set(Location::new(row, col), cell)?;
            }
        }
        self.step = 0;

        self.refresh_satisfied_pct()?;
        log::debug!("initialized grid with {:.2}% satisfied", self.satisfied_pct);

        Ok(())
    }

    /// Discard the current configuration and generate a new random one.
    pub fn reset(&mut self) -> Result<()> {
        self.initialize().context("failed to reinitialize grid")
    }

    /// Check whether the agent at `loc` is satisfied.
    ///
    /// Vacant cells are never satisfied.
    pub fn is_satisfied(&self, loc: Location) -> SimResult<bool> {
        let cell = self.grid.get(loc)?;
        if cell.is_vacant() {
            return Ok(false);
        }

        let (n_same, n_occupied) = self
            .grid
            .neighbor_counts(loc, self.cfg.model.neighborhood)?;
        Ok(is_content(n_same, n_occupied, self.cfg.model.threshold))
    }

    /// List the locations of all unsatisfied agents in row-major order.
    pub fn find_unsatisfied(&self) -> SimResult<Vec<Location>> {
        let mut unsatisfied = Vec::new();
        for (loc, cell) in self.grid.iter() {
            if !cell.is_vacant() && !self.is_satisfied(loc)? {
                unsatisfied.push(loc);
            }
        }
        Ok(unsatisfied)
    }

    /// Pick a vacant location uniformly at random.
    ///
    /// # Errors
    /// Returns [`SimError::NoVacancyAvailable`] if the grid has no vacant cell.
    pub fn find_vacant_location(&mut self) -> SimResult<Location> {
        if self.grid.count(Cell::Vacant) == 0 {
            return Err(SimError::NoVacancyAvailable);
        }

        for _ in 0..MAX_VACANT_PROBES {
            let loc = Location::new(
                self.rng.random_range(0..self.grid.n_rows()),
                self.rng.random_range(0..self.grid.n_cols()),
            );
            if self.grid.get(loc)?.is_vacant() {
                return Ok(loc);
            }
        }

        self.grid
            .locations_of(Cell::Vacant)
            .choose(&mut self.rng)
            .copied()
            .ok_or(SimError::NoVacancyAvailable)
    }

    /// Advance the simulation by one step.
    ///
    /// Every agent that is unsatisfied at the start of the step moves to a
    /// vacant cell chosen uniformly among the cells vacant at the time of the
    /// move, so a cell vacated earlier in the step can be reused.
    ///
    /// Returns the number of agents that were unsatisfied at the start of the step.
    ///
    /// # Errors
    /// Returns [`SimError::NoVacancyAvailable`] if some agent must move but the
    /// grid has no vacant cell. The grid is left unchanged in that case.
    pub fn perform_step(&mut self) -> SimResult<usize> {
        let unsatisfied = self.find_unsatisfied()?;

        if !unsatisfied.is_empty() {
            // Each move consumes one vacancy and frees another,
            // so the pool never shrinks during the step.
            let mut vacant = self.grid.locations_of(Cell::Vacant);
            if vacant.is_empty() {
                return Err(SimError::NoVacancyAvailable);
            }

            for &loc in &unsatisfied {
                let i_dest = self.rng.random_range(0..vacant.len());
                let dest = vacant.swap_remove(i_dest);
                let cell = self.grid.get(loc)?;
                self.grid.set(dest, cell)?;
                self.grid.set(loc, Cell::Vacant)?;
                vacant.push(loc);
            }
        }

        self.step += 1;

        let n_unsatisfied = match self.cfg.model.metric_update {
            MetricUpdate::PreStep => unsatisfied.len(),
            MetricUpdate::Rescan => self.find_unsatisfied()?.len(),
        };
        self.satisfied_pct = satisfied_pct(self.grid.n_cells(), n_unsatisfied);

        Ok(unsatisfied.len())
    }

    fn refresh_satisfied_pct(&mut self) -> SimResult<()> {
        let n_unsatisfied = self.find_unsatisfied()?.len();
        self.satisfied_pct = satisfied_pct(self.grid.n_cells(), n_unsatisfied);
        Ok(())
    }

    /// Perform the simulation and save the resulting records to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let saves_per_file = self.cfg.output.saves_per_file;
        let mut was_stable = false;

        for i_save in 0..saves_per_file {
            let mut n_unsatisfied = 0;
            for _ in 0..self.cfg.output.steps_per_save {
                n_unsatisfied = self.perform_step().context("failed to perform step")?;

                let is_stable = n_unsatisfied == 0;
                if is_stable && !was_stable {
                    log::info!("stable configuration at step {}", self.step);
                }
                was_stable = is_stable;
            }

            let record = Record {
                step: self.step,
                n_unsatisfied,
                satisfied_pct: self.satisfied_pct,
                grid: self.grid.clone(),
            };
            encode::write(&mut writer, &record).context("failed to serialize record")?;

            let progress = 100.0 * (i_save + 1) as f64 / saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        log::debug!("final grid:\n{}", self.grid);

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine: Self =
            decode::from_read(&mut reader).context("failed to deserialize engine")?;

        let &GridConfig { n_rows, n_cols } = &engine.cfg.grid;
        if (engine.grid.n_rows(), engine.grid.n_cols()) != (n_rows, n_cols) {
            bail!("checkpoint grid does not match the configured {n_rows}x{n_cols} grid");
        }
        engine.cfg.validate().context("invalid checkpoint config")?;

        Ok(engine)
    }
}
