pub mod csv;
pub mod plots;
mod prompt;
pub mod prompts;

pub use self::csv::{ColumnType, CsvDataset, DatasetInfo, NumericSummary};
pub use plots::{extract_plots, has_executable_code, plots_from_parts};
pub use prompt::{requires_plot, KeywordPlotDetector, PlotIntent};
