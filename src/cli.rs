//! Command-line interface definitions and argument parsing

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::data::InputEncoding;

/// Customer segmentation CLI using quartile RFM scoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "customer_segment.csv")]
    pub input: String,

    /// Directory the chart images are written to
    #[arg(short, long, default_value = "static/images")]
    pub output_dir: String,

    /// Character set of the input file
    #[arg(short, long, value_enum, default_value_t = InputEncoding::Latin1)]
    pub encoding: InputEncoding,

    /// Write the full scored table to this CSV file
    #[arg(long)]
    pub export_csv: Option<String>,

    /// Write the dashboard payload (summary table and chart list) to this JSON file
    #[arg(long)]
    pub json: Option<String>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Directory for chart images, or `None` when charts are disabled
    pub fn chart_dir(&self) -> Option<&Path> {
        if self.no_charts {
            None
        } else {
            Some(Path::new(&self.output_dir))
        }
    }

    /// Reject output paths that would overwrite the input file
    pub fn validate(&self) -> anyhow::Result<()> {
        let input = PathBuf::from(&self.input);
        for (flag, output) in [("--export-csv", &self.export_csv), ("--json", &self.json)] {
            if let Some(output) = output {
                if PathBuf::from(output) == input {
                    anyhow::bail!("{} would overwrite the input file {}", flag, self.input);
                }
            }
        }
        Ok(())
    }

    /// Default tracing filter directive
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "rfmseg=debug"
        } else {
            "rfmseg=info"
        }
    }
}
