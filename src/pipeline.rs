use crate::config::Config;
use crate::error::PipelineError;
use crate::graph;
use crate::loader::extract;
use crate::series::{self, DerivedSeries, YearSeries};
use chrono::{DateTime, Utc};
use log::info;
use std::path::PathBuf;

/// Everything the chart renderer draws from
#[derive(Debug, Clone)]
pub struct SeriesSet {
    /// Population movement table, with the derived columns appended
    pub population: YearSeries,

    /// Fertility table
    pub maternity: YearSeries,

    pub natural_increase: DerivedSeries,
    pub migration_balance: DerivedSeries,
}

/// Outcome of one regeneration run
#[derive(Debug, Clone)]
pub struct ChartRun {
    pub files: Vec<PathBuf>,
    pub generated_at: DateTime<Utc>,
}

impl SeriesSet {
    /// Derive natural increase and migration balance from the two tables.
    pub fn derive(
        mut population: YearSeries,
        maternity: YearSeries,
    ) -> Result<Self, PipelineError> {
        let natural_increase = series::natural_increase(&population)?;
        let migration_balance = series::migration_balance(&population)?;
        population.push_derived(&natural_increase)?;
        population.push_derived(&migration_balance)?;

        Ok(Self {
            population,
            maternity,
            natural_increase,
            migration_balance,
        })
    }
}

/// Read both tables and compute the derived series.
pub fn build_series(config: &Config) -> Result<SeriesSet, PipelineError> {
    let population_path = config.input_path(&config.population);
    let population = extract(&population_path, &config.population)?;
    info!(
        "read {} years x {} columns from {}",
        population.years().len(),
        population.columns().len(),
        population_path.display()
    );

    let maternity_path = config.input_path(&config.maternity);
    let maternity = extract(&maternity_path, &config.maternity)?;
    info!(
        "read {} years x {} columns from {}",
        maternity.years().len(),
        maternity.columns().len(),
        maternity_path.display()
    );

    SeriesSet::derive(population, maternity)
}

/// Extract, derive and render all charts into the configured chart directory
///
/// Runs synchronously; two concurrent runs simply overwrite each other's
/// files.
pub fn regenerate_charts(config: &Config) -> Result<ChartRun, PipelineError> {
    info!("generating charts...");
    let set = build_series(config)?;
    let files = graph::render(&set, &config.chart_dir)?;
    info!(
        "{} charts written to {}",
        files.len(),
        config.chart_dir.display()
    );

    Ok(ChartRun {
        files,
        generated_at: Utc::now(),
    })
}
