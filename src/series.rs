use crate::error::SeriesError;
use serde::Serialize;

/// A named column of a [`YearSeries`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Year-indexed table of named numeric columns
///
/// Every column holds exactly one value per year, in the order of `years`.
/// Column order is insertion order, which is also the order charts use for
/// their legends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSeries {
    years: Vec<i32>,
    columns: Vec<Column>,
}

/// Values computed from two columns of a [`YearSeries`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSeries {
    pub name: String,
    pub years: Vec<i32>,
    pub values: Vec<f64>,
}

impl YearSeries {
    pub fn new(years: Vec<i32>) -> Self {
        Self {
            years,
            columns: Vec::new(),
        }
    }

    /// Consecutive years starting at `first_year`.
    pub fn with_year_range(first_year: i32, count: usize) -> Self {
        Self::new((first_year..).take(count).collect())
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Append a column, replacing any existing column of the same name.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), SeriesError> {
        let name = name.into();
        if values.len() != self.years.len() {
            return Err(SeriesError::LengthMismatch {
                name,
                expected: self.years.len(),
                got: values.len(),
            });
        }

        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&[f64], SeriesError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| SeriesError::ColumnNotFound(name.to_string()))
    }

    /// Value of `name` in `year`, if both exist.
    pub fn value(&self, name: &str, year: i32) -> Option<f64> {
        let idx = self.years.iter().position(|y| *y == year)?;
        self.column(name).ok().map(|values| values[idx])
    }

    /// `(year, value)` pairs of one column, ready for plotting.
    pub fn points(&self, name: &str) -> Result<Vec<(i32, f64)>, SeriesError> {
        let values = self.column(name)?;
        Ok(self.years.iter().copied().zip(values.iter().copied()).collect())
    }

    /// Add a derived series as a regular column.
    pub fn push_derived(&mut self, derived: &DerivedSeries) -> Result<(), SeriesError> {
        self.insert_column(derived.name.clone(), derived.values.clone())
    }
}

impl DerivedSeries {
    pub fn points(&self) -> Vec<(i32, f64)> {
        self.years
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect()
    }
}

/// `col_a - col_b` for every year of `series`
///
/// # Errors
/// * `SeriesError::ColumnNotFound` if either column is absent
pub fn difference(
    series: &YearSeries,
    col_a: &str,
    col_b: &str,
    name: &str,
) -> Result<DerivedSeries, SeriesError> {
    let a = series.column(col_a)?;
    let b = series.column(col_b)?;

    Ok(DerivedSeries {
        name: name.to_string(),
        years: series.years().to_vec(),
        values: a.iter().zip(b).map(|(a, b)| a - b).collect(),
    })
}

pub const NATURAL_INCREASE: &str = "Natural increase";
pub const MIGRATION_BALANCE: &str = "Migration balance";

/// Births minus deaths.
pub fn natural_increase(series: &YearSeries) -> Result<DerivedSeries, SeriesError> {
    difference(series, "Births", "Deaths", NATURAL_INCREASE)
}

/// Immigration minus emigration.
pub fn migration_balance(series: &YearSeries) -> Result<DerivedSeries, SeriesError> {
    difference(series, "Immigration", "Emigration", MIGRATION_BALANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vital_stats() -> YearSeries {
        let mut series = YearSeries::with_year_range(2010, 14);
        let births: Vec<f64> = (0..14).map(|i| 413_000.0 - 7_500.0 * i as f64).collect();
        let deaths: Vec<f64> = (0..14).map(|i| 378_000.0 + 9_000.0 * i as f64).collect();
        series.insert_column("Births", births).unwrap();
        series.insert_column("Deaths", deaths).unwrap();
        series
    }

    #[test]
    fn difference_is_exact_for_every_year() {
        let series = vital_stats();
        let increase = natural_increase(&series).unwrap();

        assert_eq!(increase.years, (2010..=2023).collect::<Vec<_>>());
        for year in 2010..=2023 {
            let idx = (year - 2010) as usize;
            let expected =
                series.value("Births", year).unwrap() - series.value("Deaths", year).unwrap();
            assert_eq!(increase.values[idx], expected, "year {}", year);
        }
        // growth turns negative in the later years
        assert!(increase.values[0] > 0.0);
        assert!(increase.values[13] < 0.0);
    }

    #[test]
    fn difference_reports_the_missing_column() {
        let series = vital_stats();
        assert_eq!(
            migration_balance(&series),
            Err(SeriesError::ColumnNotFound("Immigration".to_string()))
        );
        assert_eq!(
            difference(&series, "Births", "Marriages", "x"),
            Err(SeriesError::ColumnNotFound("Marriages".to_string()))
        );
    }

    #[test]
    fn insert_rejects_misaligned_columns() {
        let mut series = YearSeries::with_year_range(2010, 3);
        let err = series.insert_column("Births", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SeriesError::LengthMismatch { expected: 3, got: 2, .. }));
    }

    #[test]
    fn derived_series_can_be_appended() {
        let mut series = vital_stats();
        let increase = natural_increase(&series).unwrap();
        series.push_derived(&increase).unwrap();

        let names: Vec<&str> = series.column_names().collect();
        assert_eq!(names, vec!["Births", "Deaths", NATURAL_INCREASE]);
        assert_eq!(series.points(NATURAL_INCREASE).unwrap(), increase.points());
    }
}
