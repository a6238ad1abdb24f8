use crate::error::{RenderError, SeriesError};
use crate::loader::{AGE_BUCKETS, MOTHER_AGE_FIRST_CHILD, MOTHER_AGE_OVERALL};
use crate::pipeline::SeriesSet;
use crate::series::YearSeries;
use log::debug;
use plotters::coord::{Shift, cartesian::Cartesian2d, types::RangedCoordf64};
use plotters::prelude::*;
use plotters::style::FontTransform;
use std::error::Error;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

/// Chart kinds used by the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphType {
    /// One line per series, with a marker on every year
    Line,

    /// One bar per year, growing up or down from zero
    Bar,
}

/// Where the series legend goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendPlacement {
    /// No legend (single-series charts)
    Hidden,

    /// Upper right corner of the plotting area
    Inside,

    /// Separate panel to the right of the plotting area
    Outside,
}

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,

    /// Type of chart to generate
    pub graph_type: GraphType,

    pub legend: LegendPlacement,

    /// Draw grid lines (the bar chart only ever draws horizontal ones)
    pub grid: bool,

    /// Decimal places of the Y tick labels
    pub y_decimals: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            x_label: "Year".to_string(),
            y_label: "Value".to_string(),
            width: 1000,
            height: 600,
            graph_type: GraphType::Line,
            legend: LegendPlacement::Inside,
            grid: true,
            y_decimals: 0,
        }
    }
}

/// One labelled series of a chart
#[derive(Clone, Debug, PartialEq)]
pub struct Plot {
    pub label: String,
    pub points: Vec<(i32, f64)>,
}

/// Everything needed to draw one chart file
#[derive(Clone, Debug)]
pub struct ChartSpec {
    pub file_name: &'static str,
    pub options: GraphOptions,
    pub plots: Vec<Plot>,
}

pub const BIRTHS_DEATHS: &str = "births_deaths.svg";
pub const NATURAL_INCREASE: &str = "natural_increase.svg";
pub const BIRTH_RATE_BY_AGE: &str = "birth_rate_by_age.svg";
pub const MOTHER_AGE: &str = "mother_age.svg";
pub const MARRIAGES_BIRTHS: &str = "marriages_births.svg";

/// The dashboard's charts as `(file name, title)`, in display order.
pub const CHART_FILES: [(&str, &str); 5] = [
    (BIRTHS_DEATHS, "Births and deaths"),
    (NATURAL_INCREASE, "Natural increase"),
    (BIRTH_RATE_BY_AGE, "Births per 1000 women by age of mother"),
    (MOTHER_AGE, "Mean age of mother at birth"),
    (MARRIAGES_BIRTHS, "Marriages and births"),
];

const SERIES_COLORS: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(214, 39, 40),
    RGBColor(44, 160, 44),
    RGBColor(255, 127, 14),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];
const BAR_NEGATIVE: RGBColor = RGBColor(214, 39, 40);
const LEGEND_PANEL_WIDTH: u32 = 160;
const FONT: &str = "sans-serif";

fn title_of(file_name: &str) -> String {
    CHART_FILES
        .iter()
        .find(|(file, _)| *file == file_name)
        .map(|(_, title)| title.to_string())
        .unwrap_or_default()
}

fn plot(series: &YearSeries, column: &str, label: &str) -> Result<Plot, SeriesError> {
    series.points(column).map(|points| Plot {
        label: label.to_string(),
        points,
    })
}

/// Describe the five dashboard charts from a set of series
///
/// # Errors
/// * `SeriesError::ColumnNotFound` if a charted column is missing
pub fn chart_specs(set: &SeriesSet) -> Result<Vec<ChartSpec>, SeriesError> {
    let population = &set.population;
    let maternity = &set.maternity;

    let age_plots = AGE_BUCKETS
        .iter()
        .map(|bucket| plot(maternity, bucket, bucket.trim_start_matches("Rate ")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(vec![
        ChartSpec {
            file_name: BIRTHS_DEATHS,
            options: GraphOptions {
                title: title_of(BIRTHS_DEATHS),
                y_label: "Persons".to_string(),
                ..GraphOptions::default()
            },
            plots: vec![
                plot(population, "Births", "Births")?,
                plot(population, "Deaths", "Deaths")?,
            ],
        },
        ChartSpec {
            file_name: NATURAL_INCREASE,
            options: GraphOptions {
                title: title_of(NATURAL_INCREASE),
                y_label: "Births - deaths".to_string(),
                graph_type: GraphType::Bar,
                legend: LegendPlacement::Hidden,
                ..GraphOptions::default()
            },
            plots: vec![Plot {
                label: set.natural_increase.name.clone(),
                points: set.natural_increase.points(),
            }],
        },
        ChartSpec {
            file_name: BIRTH_RATE_BY_AGE,
            options: GraphOptions {
                title: title_of(BIRTH_RATE_BY_AGE),
                y_label: "Births per 1000 women".to_string(),
                legend: LegendPlacement::Outside,
                y_decimals: 1,
                ..GraphOptions::default()
            },
            plots: age_plots,
        },
        ChartSpec {
            file_name: MOTHER_AGE,
            options: GraphOptions {
                title: title_of(MOTHER_AGE),
                y_label: "Age (years)".to_string(),
                y_decimals: 1,
                ..GraphOptions::default()
            },
            plots: vec![
                plot(maternity, MOTHER_AGE_OVERALL, "Overall")?,
                plot(maternity, MOTHER_AGE_FIRST_CHILD, "First child")?,
            ],
        },
        ChartSpec {
            file_name: MARRIAGES_BIRTHS,
            options: GraphOptions {
                title: title_of(MARRIAGES_BIRTHS),
                y_label: "Count".to_string(),
                ..GraphOptions::default()
            },
            plots: vec![
                plot(population, "Marriages", "Marriages")?,
                plot(population, "Births", "Births")?,
            ],
        },
    ])
}

/// Render the five dashboard charts into `out_dir`
///
/// The directory is created if needed; existing files are overwritten.
///
/// # Returns
/// * The paths written, in [`CHART_FILES`] order
///
/// # Errors
/// * `OutputDirUnavailable` if `out_dir` cannot be created or is read-only
/// * `Series` if a charted column is missing
/// * `EmptySeries` / `Draw` from [`save_chart`]
pub fn render(set: &SeriesSet, out_dir: &Path) -> Result<Vec<PathBuf>, RenderError> {
    prepare_output_dir(out_dir)?;

    chart_specs(set)?
        .iter()
        .map(|spec| {
            let path = out_dir.join(spec.file_name);
            save_chart(spec, &path)?;
            debug!("wrote {}", path.display());
            Ok(path)
        })
        .collect()
}

fn prepare_output_dir(out_dir: &Path) -> Result<(), RenderError> {
    let unavailable = |source| RenderError::OutputDirUnavailable {
        path: out_dir.to_path_buf(),
        source,
    };

    create_dir_all(out_dir).map_err(unavailable)?;
    let metadata = fs::metadata(out_dir).map_err(unavailable)?;
    if !metadata.is_dir() {
        return Err(unavailable(std::io::Error::other("not a directory")));
    }
    if metadata.permissions().readonly() {
        return Err(unavailable(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "directory is read-only",
        )));
    }
    Ok(())
}

/// Draw one chart to an SVG file at `path`
pub fn save_chart(spec: &ChartSpec, path: &Path) -> Result<(), RenderError> {
    if spec.plots.iter().all(|p| p.points.is_empty()) {
        return Err(RenderError::EmptySeries {
            file: spec.file_name.to_string(),
        });
    }

    draw_chart(spec, path).map_err(|e| RenderError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn draw_chart(spec: &ChartSpec, path: &Path) -> Result<(), Box<dyn Error>> {
    let options = &spec.options;
    let root = SVGBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    match options.legend {
        LegendPlacement::Outside => {
            let split_at = options.width.saturating_sub(LEGEND_PANEL_WIDTH) as i32;
            let (plot_area, legend_area) = root.split_horizontally(split_at);
            draw_plot(&plot_area, spec)?;
            draw_side_legend(&legend_area, &spec.plots)?;
        }
        _ => draw_plot(&root, spec)?,
    }

    root.present()?;
    Ok(())
}

type Chart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_plot(area: &DrawingArea<SVGBackend<'_>, Shift>, spec: &ChartSpec) -> Result<(), Box<dyn Error>> {
    let options = &spec.options;
    let is_bar = options.graph_type == GraphType::Bar;
    let (x_range, y_range) = axis_ranges(&spec.plots, is_bar);
    let ticks = spec.plots.iter().map(|p| p.points.len()).max().unwrap_or(0);

    let mut chart = ChartBuilder::on(area)
        .caption(&options.title, (FONT, 26).into_font())
        .margin(15)
        .x_label_area_size(70)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), y_range)?;

    draw_mesh(&mut chart, options, ticks)?;

    match options.graph_type {
        GraphType::Line => draw_lines(&mut chart, &spec.plots)?,
        GraphType::Bar => draw_bars(&mut chart, &spec.plots, x_range)?,
    }

    if options.legend == LegendPlacement::Inside {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .label_font((FONT, 14))
            .draw()?;
    }

    Ok(())
}

fn draw_mesh(chart: &mut Chart<'_, '_>, options: &GraphOptions, ticks: usize) -> Result<(), Box<dyn Error>> {
    let year_label = |x: &f64| format!("{:.0}", x);
    let value_label = |y: &f64| format!("{:.*}", options.y_decimals, y);

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(options.x_label.as_str())
        .y_desc(options.y_label.as_str())
        .x_labels(ticks)
        .x_label_formatter(&year_label)
        .y_label_formatter(&value_label)
        // 14 yearly ticks do not fit side by side; plotters only turns text
        // in quarter steps, so 90 degrees stands in for a 45 degree slant
        .x_label_style((FONT, 13).into_font().transform(FontTransform::Rotate90))
        .axis_desc_style((FONT, 15))
        .light_line_style(BLACK.mix(0.05))
        .bold_line_style(BLACK.mix(0.15));

    if !options.grid {
        mesh.disable_mesh();
    } else if options.graph_type == GraphType::Bar {
        mesh.disable_x_mesh();
    }

    mesh.draw()?;
    Ok(())
}

fn draw_lines(chart: &mut Chart<'_, '_>, plots: &[Plot]) -> Result<(), Box<dyn Error>> {
    for (i, plot) in plots.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        let points: Vec<(f64, f64)> = plot.points.iter().map(|&(x, y)| (x as f64, y)).collect();

        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(plot.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 3, color.filled())),
        )?;
    }
    Ok(())
}

fn draw_bars(
    chart: &mut Chart<'_, '_>,
    plots: &[Plot],
    x_range: std::ops::Range<f64>,
) -> Result<(), Box<dyn Error>> {
    for plot in plots {
        chart.draw_series(plot.points.iter().map(|&(x, y)| {
            let style = if y >= 0.0 {
                SERIES_COLORS[0].filled()
            } else {
                BAR_NEGATIVE.filled()
            };
            let x = x as f64;
            Rectangle::new([(x - 0.35, 0.0), (x + 0.35, y)], style)
        }))?;
    }

    chart.draw_series(LineSeries::new(
        vec![(x_range.start, 0.0), (x_range.end, 0.0)],
        BLACK.stroke_width(1),
    ))?;
    Ok(())
}

fn draw_side_legend(area: &DrawingArea<SVGBackend<'_>, Shift>, plots: &[Plot]) -> Result<(), Box<dyn Error>> {
    let font = (FONT, 14).into_font();
    for (i, plot) in plots.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        let y = 70 + i as i32 * 24;
        area.draw(&PathElement::new(vec![(8, y), (34, y)], color.stroke_width(2)))?;
        area.draw(&Text::new(plot.label.clone(), (42, y - 7), font.clone()))?;
    }
    Ok(())
}

/// X spans every year with half a year of slack on both sides; Y spans all
/// values with a margin, and always includes zero for bars.
fn axis_ranges(plots: &[Plot], include_zero: bool) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let points = plots.iter().flat_map(|p| p.points.iter());

    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        x_min = x_min.min(x as f64);
        x_max = x_max.max(x as f64);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if include_zero {
        y_min = y_min.min(0.0);
        y_max = y_max.max(0.0);
    }

    let pad = match (y_max - y_min) * 0.08 {
        p if p > 0.0 => p,
        _ => 1.0,
    };
    (x_min - 0.5..x_max + 0.5, y_min - pad..y_max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::synthetic_set;

    #[test]
    fn five_charts_with_the_expected_legends() {
        let specs = chart_specs(&synthetic_set()).unwrap();
        let files: Vec<&str> = specs.iter().map(|s| s.file_name).collect();
        assert_eq!(files, CHART_FILES.iter().map(|(f, _)| *f).collect::<Vec<_>>());

        let age = &specs[2];
        assert_eq!(age.options.legend, LegendPlacement::Outside);
        assert_eq!(age.plots.len(), 6);
        assert_eq!(age.plots[0].label, "15-19");

        let mother = &specs[3];
        let labels: Vec<&str> = mother.plots.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Overall", "First child"]);

        assert_eq!(specs[1].options.graph_type, GraphType::Bar);
        assert!(specs.iter().all(|s| s.plots.iter().all(|p| p.points.len() == 14)));
    }

    #[test]
    fn missing_column_is_reported() {
        let mut set = synthetic_set();
        set.maternity = YearSeries::with_year_range(2010, 14);
        assert!(matches!(
            chart_specs(&set),
            Err(SeriesError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn render_writes_and_overwrites_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("static").join("wykresy");
        let set = synthetic_set();

        // stale content from an earlier run
        create_dir_all(&out).unwrap();
        fs::write(out.join(BIRTHS_DEATHS), "stale").unwrap();

        for _ in 0..2 {
            let written = render(&set, &out).unwrap();
            assert_eq!(written.len(), 5);
            for (path, (file, title)) in written.iter().zip(CHART_FILES) {
                assert_eq!(path, &out.join(file));
                let svg = fs::read_to_string(path).unwrap();
                assert!(svg.contains("<svg"), "{} is not an svg", file);
                assert!(svg.contains(title), "{} lacks its title", file);
            }
        }
        assert!(!fs::read_to_string(out.join(BIRTHS_DEATHS)).unwrap().contains("stale"));

        let mother = fs::read_to_string(out.join(MOTHER_AGE)).unwrap();
        assert!(mother.contains("First child"));
        let ages = fs::read_to_string(out.join(BIRTH_RATE_BY_AGE)).unwrap();
        assert!(ages.contains("40-44"));
    }

    /// The `<text>` element whose content is exactly `content`.
    fn text_element<'a>(svg: &'a str, content: &str) -> &'a str {
        let close = format!(">{}</text>", content);
        let end = svg.find(&close).unwrap_or_else(|| panic!("no text {:?}", content));
        let start = svg[..end].rfind("<text").unwrap();
        &svg[start..end]
    }

    #[test]
    fn year_ticks_rotate_but_axis_title_does_not() {
        let dir = tempfile::tempdir().unwrap();
        render(&synthetic_set(), dir.path()).unwrap();
        let svg = fs::read_to_string(dir.path().join(BIRTHS_DEATHS)).unwrap();

        assert!(text_element(&svg, "2010").contains("rotate(90"));
        assert!(!text_element(&svg, "Year").contains("rotate"));
    }

    #[test]
    fn output_dir_that_is_a_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("wykresy");
        fs::write(&blocker, "not a directory").unwrap();

        assert!(matches!(
            render(&synthetic_set(), &blocker),
            Err(RenderError::OutputDirUnavailable { .. })
        ));
    }

    #[test]
    fn empty_chart_is_rejected() {
        let spec = ChartSpec {
            file_name: "empty.svg",
            options: GraphOptions::default(),
            plots: vec![Plot {
                label: "nothing".to_string(),
                points: Vec::new(),
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save_chart(&spec, &dir.path().join("empty.svg")),
            Err(RenderError::EmptySeries { .. })
        ));
    }

    #[test]
    fn bar_axis_includes_zero() {
        let plots = vec![Plot {
            label: "x".to_string(),
            points: vec![(2010, 5.0), (2011, 10.0)],
        }];
        let (x, y) = axis_ranges(&plots, true);
        assert_eq!(x, 2009.5..2011.5);
        assert!(y.start < 0.0 && y.end > 10.0);

        let (_, flat) = axis_ranges(
            &[Plot {
                label: "flat".to_string(),
                points: vec![(2010, 3.0)],
            }],
            false,
        );
        assert_eq!(flat, 2.0..4.0);
    }
}
