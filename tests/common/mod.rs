#![allow(dead_code)]

use demografia::Config;
use demografia::loader::TableSpec;
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Value written for year index `y` of output column `c` of the population table.
pub fn population_value(y: usize, c: usize) -> f64 {
    match c {
        0 => 38_500_000.0 - 40_000.0 * y as f64, // Population
        1 => 228_000.0 - 5_000.0 * y as f64,     // Marriages
        2 => 413_000.0 - 7_500.0 * y as f64,     // Births
        3 => 378_000.0 + 9_000.0 * y as f64,     // Deaths
        4 => 15_000.0 + 200.0 * y as f64,        // Immigration
        _ => 17_000.0 - 500.0 * y as f64,        // Emigration
    }
}

/// Unrounded value for the maternity table; extraction rounds it to 0.1.
pub fn maternity_value(y: usize, c: usize) -> f64 {
    match c {
        0..=5 => 10.0 + 15.0 * c as f64 + 0.26 * y as f64,
        6 => 29.04 + 0.12 * y as f64,
        _ => 26.51 + 0.15 * y as f64,
    }
}

/// Write a workbook laid out the way `spec` expects: a header row, the year
/// in column 0, filler text in every unused column and `value(year_idx,
/// column_idx)` in the picked columns.
pub fn write_table(path: &Path, spec: &TableSpec, value: impl Fn(usize, usize) -> f64) {
    let last_col = *spec.columns.iter().max().unwrap();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(&spec.sheet).unwrap();
    sheet.write_string(0, 0, "Wyszczególnienie").unwrap();

    for y in 0..spec.years as usize {
        let row = spec.first_row + y as u32;
        sheet
            .write_number(row, 0, (spec.first_year + y as i32) as f64)
            .unwrap();
        for col in 1..=last_col {
            match spec.columns.iter().position(|c| *c == col) {
                Some(c) => sheet.write_number(row, col as u16, value(y, c)).unwrap(),
                None => sheet.write_string(row, col as u16, "x").unwrap(),
            };
        }
    }

    workbook.save(path).unwrap();
}

/// A workbook with one sheet called `sheet_name` and a single cell.
pub fn write_other_sheet(path: &Path, sheet_name: &str) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name).unwrap();
    sheet.write_number(0, 0, 1.0).unwrap();
    workbook.save(path).unwrap();
}

/// Configuration rooted in `root`, with xlsx versions of both input tables
/// written to `root/dane`.
pub fn config_with_inputs(root: &Path) -> Config {
    let mut config = Config {
        data_dir: root.join("dane"),
        chart_dir: root.join("static").join("wykresy"),
        users_file: root.join("database").join("users.json"),
        ..Config::default()
    };
    config.population.file = "tablica_2.xlsx".into();
    config.maternity.file = "tablica_4.xlsx".into();

    std::fs::create_dir_all(&config.data_dir).unwrap();
    write_table(
        &config.input_path(&config.population),
        &config.population,
        population_value,
    );
    write_table(
        &config.input_path(&config.maternity),
        &config.maternity,
        maternity_value,
    );
    config
}
