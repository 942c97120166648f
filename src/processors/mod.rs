pub mod metrics;
pub mod preparer;
pub mod selector;
pub mod splitter;

pub use metrics::{station_metrics, Metric};
pub use preparer::{DataPreparer, ModeSummary, PreparedSplits, SplitData, Standardization};
pub use selector::{SelectedStations, SelectionReport, SkipReason, SkippedCell, StratifiedSelector};
pub use splitter::{check_strategy_combination, SplitContext, Splitter};
