//! Chart rendering with Plotters for the RFM dashboard

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use tracing::info;

use crate::report::{self, BoxStats, ChartKind, Dashboard, Histogram};
use crate::scoring::ScoredTable;

/// Pixel size of every chart
const CHART_SIZE: (u32, u32) = (600, 400);

const SKYBLUE: RGBColor = RGBColor(135, 206, 235);
const STEELBLUE: RGBColor = RGBColor(70, 130, 180);
const LIGHTGREEN: RGBColor = RGBColor(144, 238, 144);
const SALMON: RGBColor = RGBColor(250, 128, 114);
const SCATTER_BLUE: RGBColor = RGBColor(31, 119, 180);

/// Qualitative palette for segment bars
const SET2: [RGBColor; 8] = [
    RGBColor(102, 194, 165),
    RGBColor(252, 141, 98),
    RGBColor(141, 160, 203),
    RGBColor(231, 138, 195),
    RGBColor(166, 216, 84),
    RGBColor(255, 217, 47),
    RGBColor(229, 196, 148),
    RGBColor(179, 179, 179),
];

/// Render all five dashboard charts into `output_dir`
///
/// # Arguments
/// * `table` - Full scored table
/// * `output_dir` - Directory for the PNG files; created if missing
///
/// # Returns
/// * Paths of the written images, in dashboard order
pub fn render_dashboard_charts(table: &ScoredTable, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("cannot create chart directory {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(ChartKind::ALL.len());
    for chart in ChartKind::ALL {
        let path = output_dir.join(chart.file_name());
        render_chart(chart, table, &path)
            .with_context(|| format!("failed to render '{}'", chart.title()))?;
        written.push(path);
    }

    info!("Rendered {} charts into {}", written.len(), output_dir.display());
    Ok(written)
}

/// Render one chart to `output_path`
pub fn render_chart(chart: ChartKind, table: &ScoredTable, output_path: &Path) -> Result<()> {
    match chart {
        ChartKind::RecencyDistribution => {
            draw_histogram(&report::recency_histogram(table), chart.title(), "Recency", output_path)
        }
        ChartKind::FrequencyVsMonetary => draw_scatter(
            &report::frequency_vs_monetary(table),
            chart.title(),
            ("Frequency", "Monetary"),
            SCATTER_BLUE.mix(0.7),
            output_path,
        ),
        ChartKind::MonetaryBoxplot => match report::monetary_box(table) {
            Some(stats) => draw_boxplot(&stats, chart.title(), "Monetary", output_path),
            None => anyhow::bail!("no Monetary values to plot"),
        },
        ChartKind::RecencyVsFrequency => draw_scatter(
            &report::recency_vs_frequency(table),
            chart.title(),
            ("Recency", "Frequency"),
            SALMON.mix(0.6),
            output_path,
        ),
        ChartKind::SegmentDistribution => {
            let counts: Vec<(String, usize)> = report::segment_counts(table)
                .into_iter()
                .map(|(segment, count)| (segment.label().to_string(), count))
                .collect();
            draw_count_bars(&counts, chart.title(), output_path)
        }
    }
}

fn draw_histogram(hist: &Histogram, title: &str, x_desc: &str, output_path: &Path) -> Result<()> {
    let y_max = (hist.max_count().max(1) as f64) * 1.1;

    let root = BitMapBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(hist.start..hist.end(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(x_desc)
        .y_desc("Count")
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(hist.counts.iter().enumerate().map(|(i, &count)| {
        let left = hist.start + i as f64 * hist.bin_width;
        Rectangle::new(
            [(left, 0.0), (left + hist.bin_width, count as f64)],
            SKYBLUE.filled(),
        )
    }))?;

    if let Some(density) = &hist.density {
        chart.draw_series(LineSeries::new(
            density.iter().copied(),
            STEELBLUE.stroke_width(2),
        ))?;
    }

    root.present()?;
    Ok(())
}

fn draw_scatter(
    points: &[(f64, f64)],
    title: &str,
    (x_desc, y_desc): (&str, &str),
    color: RGBAColor,
    output_path: &Path,
) -> Result<()> {
    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));

    let root = BitMapBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
    )?;

    root.present()?;
    Ok(())
}

fn draw_boxplot(stats: &BoxStats, title: &str, y_desc: &str, output_path: &Path) -> Result<()> {
    let extremes = [stats.lower_whisker, stats.upper_whisker]
        .into_iter()
        .chain(stats.outliers.iter().copied());
    let y_range = padded_range(extremes);
    let (left, center, right) = (0.6, 1.0, 1.4);

    let root = BitMapBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(10)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..2f64, y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_x_axis()
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(std::iter::once(Rectangle::new(
        [(left, stats.q1), (right, stats.q3)],
        LIGHTGREEN.filled(),
    )))?;
    chart.draw_series(std::iter::once(Rectangle::new(
        [(left, stats.q1), (right, stats.q3)],
        BLACK.stroke_width(1),
    )))?;

    let segments = [
        // median
        vec![(left, stats.median), (right, stats.median)],
        // whiskers
        vec![(center, stats.q3), (center, stats.upper_whisker)],
        vec![(center, stats.q1), (center, stats.lower_whisker)],
        // caps
        vec![(0.8, stats.upper_whisker), (1.2, stats.upper_whisker)],
        vec![(0.8, stats.lower_whisker), (1.2, stats.lower_whisker)],
    ];
    chart.draw_series(
        segments
            .into_iter()
            .map(|points| PathElement::new(points, BLACK.stroke_width(1))),
    )?;

    chart.draw_series(
        stats
            .outliers
            .iter()
            .map(|&y| Circle::new((center, y), 3, BLACK.stroke_width(1))),
    )?;

    root.present()?;
    Ok(())
}

fn draw_count_bars(counts: &[(String, usize)], title: &str, output_path: &Path) -> Result<()> {
    let max_count = counts.iter().map(|(_, count)| *count).max().unwrap_or(1).max(1) as f64;
    let rows = counts.len().max(1) as f64;

    let root = BitMapBackend::new(output_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    // Room on the right of each bar for its label
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(10)
        .build_cartesian_2d(0f64..max_count * 1.6, 0f64..rows)?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .disable_y_axis()
        .x_desc("Count")
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    // Most common segment on top
    for (i, (label, count)) in counts.iter().enumerate() {
        let top = rows - i as f64;
        let color = SET2[i % SET2.len()];

        chart.draw_series(std::iter::once(Rectangle::new(
            [(0.0, top - 0.9), (*count as f64, top - 0.1)],
            color.filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{} ({})", label, count),
            (*count as f64 + max_count * 0.02, top - 0.4),
            ("sans-serif", 13).into_font(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Data range widened by 5% on each side; a single value gets a unit window
fn padded_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (low, high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), v| {
        (low.min(v), high.max(v))
    });
    if !low.is_finite() || !high.is_finite() {
        return 0.0..1.0;
    }
    if low == high {
        return (low - 0.5)..(high + 0.5);
    }
    let pad = (high - low) * 0.05;
    (low - pad)..(high + pad)
}

/// Print the dashboard table to the console
pub fn print_summary_table(dashboard: &Dashboard) {
    println!("\n=== RFM Summary (first {} customers) ===", dashboard.table_data.len());
    println!(
        "{:>10} | {:>7} | {:>9} | {:>12} | {:>9} | {}",
        "CustomerID", "Recency", "Frequency", "Monetary", "RFM_Score", "Segment"
    );
    println!("-----------+---------+-----------+--------------+-----------+------------------");
    for row in &dashboard.table_data {
        let text = |column: &str| match row.get(column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        };
        let monetary = row
            .get("Monetary")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_default();
        println!(
            "{:>10} | {:>7} | {:>9} | {:>12.2} | {:>9} | {}",
            text("CustomerID"),
            text("Recency"),
            text("Frequency"),
            monetary,
            text("RFM_Score"),
            text("Segment")
        );
    }
}

/// Print segment sizes to the console
pub fn print_segment_statistics(table: &ScoredTable) {
    println!("\n=== Segment Statistics ===");
    println!("Total customers: {}", table.len());
    println!("Recency anchor date: {}", table.anchor_date);
    for (segment, count) in report::segment_counts(table) {
        let percentage = (count as f64 / table.len() as f64) * 100.0;
        println!("  {:<17} {:>6} customers ({:.1}%)", segment.label(), count, percentage);
    }
}

/// Render the charts and print the console summary
pub fn generate_dashboard(table: &ScoredTable, output_dir: Option<&Path>) -> Result<Dashboard> {
    let dashboard = report::summarize(table);

    if let Some(dir) = output_dir {
        let written = render_dashboard_charts(table, dir)?;
        for path in &written {
            println!("Chart saved to: {}", path.display());
        }
    }

    print_summary_table(&dashboard);
    print_segment_statistics(table);

    Ok(dashboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CustomerId;
    use crate::rfm::CustomerRfm;
    use crate::scoring::ScoredCustomer;
    use crate::segment::{Scores, Segment};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn create_test_table() -> ScoredTable {
        let rows = (0..12)
            .map(|i| {
                let scores = Scores::new((i % 4) as u8 + 1, ((i + 1) % 4) as u8 + 1, (i % 4) as u8 + 1);
                ScoredCustomer {
                    rfm: CustomerRfm {
                        customer_id: CustomerId::new(format!("{}", 13000 + i)),
                        recency: (i * 17 % 90) as i64,
                        frequency: i % 6 + 1,
                        monetary: if i == 11 { 25_000.0 } else { 150.0 * i as f64 - 100.0 },
                    },
                    scores,
                    rfm_score: scores.rfm_score(),
                    segment: Segment::classify(scores),
                }
            })
            .collect();

        ScoredTable {
            anchor_date: NaiveDate::from_ymd_opt(2011, 12, 9)
                .unwrap()
                .and_hms_opt(12, 50, 0)
                .unwrap(),
            rows,
        }
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([0.0, 10.0].into_iter()), -0.5..10.5);
        assert_eq!(padded_range([3.0].into_iter()), 2.5..3.5);
        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);
    }

    #[test]
    #[ignore = "plotters needs system fonts to draw captions"]
    fn test_render_dashboard_charts() {
        let table = create_test_table();
        let temp_dir = tempdir().unwrap();
        let output_dir = temp_dir.path().join("static").join("images");

        let written = render_dashboard_charts(&table, &output_dir).unwrap();

        assert_eq!(written.len(), 5);
        for (path, chart) in written.iter().zip(ChartKind::ALL) {
            assert_eq!(path.file_name().unwrap(), chart.file_name());
            assert!(path.exists());
        }
    }

    #[test]
    #[ignore = "plotters needs system fonts to draw captions"]
    fn test_generate_dashboard() {
        let table = create_test_table();
        let temp_dir = tempdir().unwrap();

        let dashboard = generate_dashboard(&table, Some(temp_dir.path())).unwrap();
        assert_eq!(dashboard.table_data.len(), 10);
        assert!(temp_dir.path().join("segment_distribution.png").exists());
    }

    #[test]
    fn test_generate_dashboard_without_charts() {
        let dashboard = generate_dashboard(&create_test_table(), None).unwrap();
        assert_eq!(dashboard.charts.len(), 5);
        assert_eq!(dashboard.table_data.len(), 10);
    }
}
