use crate::error::ConfigError;
use crate::loader::TableSpec;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file, read from the working directory if present.
pub const CONFIG_FILE: &str = "demografia.toml";
/// Overrides [`CONFIG_FILE`].
pub const CONFIG_FILE_ENV: &str = "DEMOGRAFIA_CONFIG";
/// Prefix for environment overrides, e.g. `DEMOGRAFIA_BIND_ADDR`.
pub const ENV_PREFIX: &str = "DEMOGRAFIA_";

/// Application configuration
///
/// Every field has a default, so an empty environment yields a working setup
/// that reads `dane/`, writes `static/wykresy/` and keeps users in
/// `database/users.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the web server binds to
    pub bind_addr: String,

    /// Directory holding the input spreadsheets
    pub data_dir: PathBuf,

    /// Directory the charts are written to and served from
    pub chart_dir: PathBuf,

    /// JSON file backing the credential store
    pub users_file: PathBuf,

    /// Password for the bootstrap `admin` account
    pub admin_password: Option<String>,

    /// Regenerate the charts after every successful login
    pub regenerate_on_login: bool,

    /// Session lifetime in hours
    pub session_hours: u64,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Population movement table (births, deaths, migration, ...)
    pub population: TableSpec,

    /// Fertility table (age-specific birth rates, mean age of mothers)
    pub maternity: TableSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            data_dir: PathBuf::from("dane"),
            chart_dir: PathBuf::from("static/wykresy"),
            users_file: PathBuf::from("database/users.json"),
            admin_password: None,
            regenerate_on_login: true,
            session_hours: 24,
            log_level: "info".to_string(),
            population: TableSpec::population(),
            maternity: TableSpec::maternity(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, the TOML file and the environment.
    ///
    /// A `.env` file is honoured before the environment is read.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::figment(Path::new(&file)).extract().map_err(ConfigError::from)
    }

    /// The provider stack, lowest precedence first.
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Full path of a table's source spreadsheet.
    pub fn input_path(&self, table: &TableSpec) -> PathBuf {
        self.data_dir.join(&table.file)
    }

    pub fn session_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_hours * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:3000");
        assert!(cfg.regenerate_on_login);
        assert_eq!(cfg.admin_password, None);
        assert_eq!(
            cfg.input_path(&cfg.population),
            PathBuf::from("dane/tablica_2.xls")
        );
        assert_eq!(cfg.session_duration().as_secs(), 24 * 3600);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demografia.toml");
        std::fs::write(
            &path,
            "bind_addr = \"0.0.0.0:8080\"\nregenerate_on_login = false\n\n[population]\nfirst_row = 3\n",
        )
        .unwrap();

        let cfg: Config = Config::figment(&path).extract().unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert!(!cfg.regenerate_on_login);
        assert_eq!(cfg.population.first_row, 3);
        // untouched keys of a partially overridden table keep their defaults
        assert_eq!(cfg.population.sheet, TableSpec::population().sheet);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg: Config = Config::figment(Path::new("/nonexistent/demografia.toml"))
            .extract()
            .unwrap();
        assert_eq!(cfg.chart_dir, PathBuf::from("static/wykresy"));
    }
}
