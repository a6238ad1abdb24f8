use demografia::{Config, build_series, graph};
use std::process::ExitCode;

/// Regenerate the dashboard charts without starting the web server
///
/// Prints the files written and a per-year table of the derived series.
fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let set = match build_series(&config) {
        Ok(set) => set,
        Err(e) => {
            log::error!("cannot build series: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match graph::render(&set, &config.chart_dir) {
        Ok(files) => {
            for file in files {
                println!("Created {}", file.display());
            }
        }
        Err(e) => {
            log::error!("cannot render charts: {}", e);
            return ExitCode::FAILURE;
        }
    }

    println!();
    println!(
        "{:>6} {:>18} {:>18}",
        "Year", set.natural_increase.name, set.migration_balance.name
    );
    for ((year, increase), balance) in set
        .natural_increase
        .points()
        .into_iter()
        .zip(set.migration_balance.values.iter())
    {
        println!("{:>6} {:>18.0} {:>18.0}", year, increase, balance);
    }

    ExitCode::SUCCESS
}
