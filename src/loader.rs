use crate::error::ExtractError;
use crate::series::YearSeries;
use calamine::{Data, Range, Reader, open_workbook_auto};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fixed positional window of a statistical table
///
/// Rows and columns are 0-based absolute sheet positions. The window is not
/// derived from the headers: a source that shifts its layout yields wrong
/// numbers rather than an error, unless the window leaves the sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Spreadsheet file name, relative to the data directory
    pub file: PathBuf,

    /// Name of the sheet holding the table
    pub sheet: String,

    /// Sheet row of the first year
    pub first_row: u32,

    /// Year of the first row
    pub first_year: i32,

    /// Number of consecutive yearly rows
    pub years: u32,

    /// Sheet columns to pick, in output order
    pub columns: Vec<u32>,

    /// Names given to the picked columns
    pub names: Vec<String>,

    /// Round values to this many decimal places
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl TableSpec {
    /// Vital statistics table (GUS "tablica 2"): population, marriages,
    /// births, deaths, immigration and emigration by year.
    pub fn population() -> Self {
        Self {
            file: PathBuf::from("tablica_2.xls"),
            sheet: "tabl.2_ogółem".to_string(),
            first_row: 67,
            first_year: 2010,
            years: 14,
            columns: vec![1, 2, 4, 5, 11, 12],
            names: [
                "Population",
                "Marriages",
                "Births",
                "Deaths",
                "Immigration",
                "Emigration",
            ]
            .map(String::from)
            .to_vec(),
            decimals: None,
        }
    }

    /// Fertility table: births per 1000 women in six 5-year age groups and
    /// the mean age of mothers.
    pub fn maternity() -> Self {
        Self {
            file: PathBuf::from("tablica_4.xls"),
            sheet: "tabl.4".to_string(),
            first_row: 67,
            first_year: 2010,
            years: 14,
            columns: vec![1, 2, 3, 4, 5, 6, 8, 9],
            names: AGE_BUCKETS
                .iter()
                .copied()
                .chain([MOTHER_AGE_OVERALL, MOTHER_AGE_FIRST_CHILD])
                .map(String::from)
                .collect(),
            decimals: Some(1),
        }
    }

    fn last_row(&self) -> u32 {
        self.first_row + self.years.saturating_sub(1)
    }
}

/// Column names of the age-specific birth rates.
pub const AGE_BUCKETS: [&str; 6] = [
    "Rate 15-19",
    "Rate 20-24",
    "Rate 25-29",
    "Rate 30-34",
    "Rate 35-39",
    "Rate 40-44",
];
pub const MOTHER_AGE_OVERALL: &str = "Mother age overall";
pub const MOTHER_AGE_FIRST_CHILD: &str = "Mother age first child";

/// Read the window described by `spec` out of the spreadsheet at `path`
///
/// The format (xls, xlsx, ods) is picked from the file extension.
///
/// # Errors
/// * `SourceFileMissing` if `path` does not exist
/// * `Workbook` if the file cannot be opened as a spreadsheet
/// * `SheetNotFound` if `spec.sheet` is not one of the workbook's sheets
/// * `SliceOutOfRange` / `TypeCoercion` from [`slice_range`]
pub fn extract(path: &Path, spec: &TableSpec) -> Result<YearSeries, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::SourceFileMissing(path.to_path_buf()));
    }

    let mut workbook = open_workbook_auto(path).map_err(|e| ExtractError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let available = workbook.sheet_names();
    if !available.iter().any(|name| name == &spec.sheet) {
        return Err(ExtractError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: spec.sheet.clone(),
            available,
        });
    }

    let range = workbook
        .worksheet_range(&spec.sheet)
        .map_err(|e| ExtractError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    debug!(
        "{}: sheet {:?} spans {:?}..{:?}",
        path.display(),
        spec.sheet,
        range.start(),
        range.end()
    );

    slice_range(&range, spec)
}

/// Cut the window out of an already loaded sheet.
pub fn slice_range(range: &Range<Data>, spec: &TableSpec) -> Result<YearSeries, ExtractError> {
    let out_of_range = |detail: String| ExtractError::SliceOutOfRange {
        sheet: spec.sheet.clone(),
        detail,
    };

    if spec.columns.len() != spec.names.len() {
        return Err(out_of_range(format!(
            "{} columns but {} names",
            spec.columns.len(),
            spec.names.len()
        )));
    }
    if spec.years == 0 || spec.columns.is_empty() {
        return Err(out_of_range("empty window".to_string()));
    }

    let (end_row, end_col) = range
        .end()
        .ok_or_else(|| out_of_range("sheet is empty".to_string()))?;

    if spec.last_row() > end_row {
        return Err(out_of_range(format!(
            "rows {}..={} requested, sheet ends at row {}",
            spec.first_row,
            spec.last_row(),
            end_row
        )));
    }
    if let Some(col) = spec.columns.iter().find(|c| **c > end_col) {
        return Err(out_of_range(format!(
            "column {} requested, sheet ends at column {}",
            col, end_col
        )));
    }

    let mut series = YearSeries::with_year_range(spec.first_year, spec.years as usize);
    for (col, name) in spec.columns.iter().zip(&spec.names) {
        let values = (spec.first_row..=spec.last_row())
            .map(|row| {
                let value = cell_number(range.get_value((row, *col)), &spec.sheet, row, *col)?;
                Ok(match spec.decimals {
                    Some(places) => round_to(value, places),
                    None => value,
                })
            })
            .collect::<Result<Vec<f64>, ExtractError>>()?;

        // lengths match the year range by construction
        series
            .insert_column(name.clone(), values)
            .map_err(|e| out_of_range(e.to_string()))?;
    }

    Ok(series)
}

fn cell_number(cell: Option<&Data>, sheet: &str, row: u32, col: u32) -> Result<f64, ExtractError> {
    let not_a_number = |value: String| ExtractError::TypeCoercion {
        sheet: sheet.to_string(),
        row,
        col,
        value,
    };

    match cell {
        Some(Data::Float(f)) => Ok(*f),
        Some(Data::Int(i)) => Ok(*i as f64),
        Some(Data::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| not_a_number(format!("{:?}", s))),
        Some(Data::Empty) | None => Err(not_a_number("<empty>".to_string())),
        Some(other) => Err(not_a_number(format!("{:?}", other))),
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_spec() -> TableSpec {
        TableSpec {
            file: PathBuf::from("t.xlsx"),
            sheet: "data".to_string(),
            first_row: 1,
            first_year: 2010,
            years: 3,
            columns: vec![0, 2],
            names: vec!["Births".to_string(), "Deaths".to_string()],
            decimals: None,
        }
    }

    fn sheet(rows: u32, cols: u32) -> Range<Data> {
        let mut range = Range::new((0, 0), (rows - 1, cols - 1));
        range.set_value((0, 0), Data::String("header".to_string()));
        for r in 1..rows {
            for c in 0..cols {
                range.set_value((r, c), Data::Float((r * 10 + c) as f64 + 0.25));
            }
        }
        range
    }

    #[test]
    fn picks_the_configured_window() {
        let series = slice_range(&sheet(5, 3), &small_spec()).unwrap();
        assert_eq!(series.years(), &[2010, 2011, 2012]);
        assert_eq!(series.column("Births").unwrap(), &[10.25, 20.25, 30.25]);
        assert_eq!(series.column("Deaths").unwrap(), &[12.25, 22.25, 32.25]);
    }

    #[test]
    fn rounds_when_asked() {
        let mut spec = small_spec();
        spec.decimals = Some(1);
        let series = slice_range(&sheet(5, 3), &spec).unwrap();
        assert_eq!(series.column("Births").unwrap(), &[10.3, 20.3, 30.3]);
    }

    #[test]
    fn accepts_ints_and_numeric_text() {
        let mut range = sheet(4, 3);
        range.set_value((1, 0), Data::Int(7));
        range.set_value((2, 0), Data::String(" 8.5 ".to_string()));
        let series = slice_range(&range, &small_spec()).unwrap();
        assert_eq!(&series.column("Births").unwrap()[..2], &[7.0, 8.5]);
    }

    #[test]
    fn rejects_non_numeric_cells() {
        let mut range = sheet(4, 3);
        range.set_value((2, 2), Data::String("b.d.".to_string()));
        match slice_range(&range, &small_spec()) {
            Err(ExtractError::TypeCoercion { row, col, .. }) => assert_eq!((row, col), (2, 2)),
            other => panic!("expected TypeCoercion, got {:?}", other),
        }

        let mut range = sheet(4, 3);
        range.set_value((3, 0), Data::Empty);
        assert!(matches!(
            slice_range(&range, &small_spec()),
            Err(ExtractError::TypeCoercion { .. })
        ));
    }

    #[test]
    fn window_past_the_sheet_is_out_of_range() {
        // three data rows are needed, only two exist
        assert!(matches!(
            slice_range(&sheet(3, 3), &small_spec()),
            Err(ExtractError::SliceOutOfRange { .. })
        ));
        // column 2 is needed, sheet has columns 0..=1
        assert!(matches!(
            slice_range(&sheet(5, 2), &small_spec()),
            Err(ExtractError::SliceOutOfRange { .. })
        ));

        let mut spec = small_spec();
        spec.names.pop();
        assert!(matches!(
            slice_range(&sheet(5, 3), &spec),
            Err(ExtractError::SliceOutOfRange { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported_before_opening() {
        let err = extract(Path::new("/nonexistent/tablica_2.xls"), &small_spec()).unwrap_err();
        assert!(matches!(err, ExtractError::SourceFileMissing(_)));
    }

    #[test]
    fn default_tables_are_consistent() {
        for spec in [TableSpec::population(), TableSpec::maternity()] {
            assert_eq!(spec.columns.len(), spec.names.len());
            assert_eq!(spec.years, 14);
            assert_eq!(spec.first_year + spec.years as i32 - 1, 2023);
        }
    }

    #[test]
    fn round_to_goes_half_away_from_zero() {
        assert_eq!(round_to(1.25, 1), 1.3);
        assert_eq!(round_to(-1.25, 1), -1.3);
        assert_eq!(round_to(28.94, 1), 28.9);
    }
}
