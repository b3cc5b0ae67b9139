//! Charts module - Static chart rendering

mod renderer;

pub use renderer::{Bar, ChartError, ChartLabels, StaticChartRenderer};
