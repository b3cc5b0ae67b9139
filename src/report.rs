//! Report generation for the incident analysis.
//!
//! Collects every aggregate, summary and model into one serializable
//! `IncidentReport` and renders it as Markdown, JSON and plain-text tables.

use crate::charts::{Bar, ChartError, ChartLabels, StaticChartRenderer};
use crate::config::ReportConfig;
use crate::data::schema::{
    BORO, HOUR, LATITUDE, LOCATION_DESC, LONGITUDE, MONTH, PERP_AGE_GROUP,
    STATISTICAL_MURDER_FLAG, VIC_AGE_GROUP, YEAR,
};
use crate::data::{reject_columns, AgeGroup, DataSource, NormalizedTable};
use crate::stats::{
    borough_rates, count_by, count_by_age_group, fit_categorical, flag_rate_by, AggregateError,
    BoroughRate, DummyEncoding, FlagRate, GroupCount, GroupCounts, OlsFit, StatsCalculator,
    SummaryStats,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MARKDOWN_FILE: &str = "report.md";
pub const JSON_FILE: &str = "report.json";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Number of rejected rows per offending column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionCount {
    pub column: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeGroupCount {
    pub age_group: AgeGroup,
    pub label: String,
    pub count: usize,
}

/// Result of one regression. A failed model does not fail the report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Fitted(OlsFit),
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub response: String,
    pub predictor: String,
    pub reference_level: i32,
    pub outcome: ModelOutcome,
}

impl ModelReport {
    pub fn formula(&self) -> String {
        format!("{} ~ {}", self.response, self.predictor)
    }
}

/// One chart: the written file, or why it could not be drawn.
#[derive(Debug, Clone, Serialize)]
pub struct ChartOutput {
    pub name: String,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Complete analysis report.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentReport {
    pub generated_at: String,
    pub source: String,
    pub rows_loaded: usize,
    pub rows_kept: usize,
    pub rows_rejected: usize,
    /// Columns whose conversion failure drops a row
    pub reject_columns: Vec<String>,
    pub rejections: Vec<RejectionCount>,
    pub by_borough: GroupCounts,
    pub by_year: Vec<GroupCount>,
    pub by_month: Vec<GroupCount>,
    pub by_hour: Vec<GroupCount>,
    pub top_locations: Vec<GroupCount>,
    pub borough_rates: Vec<BoroughRate>,
    pub murder_share_by_borough: Vec<FlagRate>,
    pub victim_age_groups: Vec<AgeGroupCount>,
    pub perpetrator_age_groups: Vec<AgeGroupCount>,
    pub latitude_by_borough: Vec<SummaryStats>,
    pub longitude_by_borough: Vec<SummaryStats>,
    pub models: Vec<ModelReport>,
    pub charts: Vec<ChartOutput>,
}

impl IncidentReport {
    /// Compute every section from the normalized table.
    ///
    /// `rows_loaded` is the height of the raw table before rejected rows were dropped.
    pub fn build(
        source: &DataSource,
        rows_loaded: usize,
        table: &NormalizedTable,
        config: &ReportConfig,
    ) -> Result<Self, ReportError> {
        let df = table.frame();

        let by_borough = count_by(df, BORO)?;
        let by_year = count_by(df, YEAR)?.sorted_numeric();
        let by_month = count_by(df, MONTH)?.sorted_numeric();
        let by_hour = count_by(df, HOUR)?.sorted_numeric();
        let top_locations = count_by(df, LOCATION_DESC)?
            .without_nulls()
            .top(config.top_n);
        let rates = borough_rates(&by_borough, &config.populations)?;
        let murder_share_by_borough = flag_rate_by(df, BORO, STATISTICAL_MURDER_FLAG)?;

        let victim_age_groups = age_group_counts(count_by_age_group(df, VIC_AGE_GROUP)?);
        let perpetrator_age_groups = age_group_counts(count_by_age_group(df, PERP_AGE_GROUP)?);

        let latitude_by_borough = StatsCalculator::describe_by_group(df, BORO, LATITUDE)?;
        let longitude_by_borough = StatsCalculator::describe_by_group(df, BORO, LONGITUDE)?;

        let encoding = DummyEncoding::hours();
        let models = [LATITUDE, LONGITUDE]
            .into_iter()
            .map(|response| {
                let outcome = match fit_categorical(df, response, HOUR, &encoding) {
                    Ok(fit) => ModelOutcome::Fitted(fit),
                    Err(e) => {
                        tracing::warn!(response, predictor = HOUR, error = %e, "Model fit failed");
                        ModelOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                ModelReport {
                    response: response.to_string(),
                    predictor: HOUR.to_string(),
                    reference_level: encoding.reference(),
                    outcome,
                }
            })
            .collect();

        let mut rejections: Vec<RejectionCount> = Vec::new();
        for rejected in table.rejected() {
            match rejections
                .iter_mut()
                .find(|r| r.column == rejected.error.column)
            {
                Some(entry) => entry.rows += 1,
                None => rejections.push(RejectionCount {
                    column: rejected.error.column.to_string(),
                    rows: 1,
                }),
            }
        }

        tracing::info!(
            rows = df.height(),
            boroughs = by_borough.len(),
            years = by_year.len(),
            "Built incident report"
        );

        Ok(Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source: source.to_string(),
            rows_loaded,
            rows_kept: table.height(),
            rows_rejected: table.rejected().len(),
            reject_columns: reject_columns().map(str::to_string).collect(),
            rejections,
            by_borough,
            by_year,
            by_month,
            by_hour,
            top_locations,
            borough_rates: rates,
            murder_share_by_borough,
            victim_age_groups,
            perpetrator_age_groups,
            latitude_by_borough,
            longitude_by_borough,
            models,
            charts: Vec::new(),
        })
    }

    pub fn model(&self, response: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.response == response)
    }

    /// Draw every chart into `dir`. Failures are logged and recorded, never returned.
    pub fn render_charts(&mut self, dir: &Path) {
        let count_bars = |groups: &[GroupCount]| -> Vec<Bar> {
            groups
                .iter()
                .map(|g| Bar::new(g.key.clone(), g.count as f64))
                .collect()
        };

        let year_points: Vec<(i32, f64)> = self
            .by_year
            .iter()
            .filter_map(|g| g.key.parse::<i32>().ok().map(|y| (y, g.count as f64)))
            .collect();
        let rate_bars: Vec<Bar> = self
            .borough_rates
            .iter()
            .map(|r| Bar::new(r.borough.label(), r.rate_per_100k))
            .collect();

        let jobs: Vec<(&str, ChartLabels<'_>, ChartData)> = vec![
            (
                "incidents_by_borough",
                ChartLabels {
                    title: "Incidents by borough",
                    x_desc: "Borough",
                    y_desc: "Incidents",
                },
                ChartData::Bars(count_bars(&self.by_borough.ranked())),
            ),
            (
                "incidents_by_year",
                ChartLabels {
                    title: "Incidents per year",
                    x_desc: "Year",
                    y_desc: "Incidents",
                },
                ChartData::Line(year_points),
            ),
            (
                "incidents_by_month",
                ChartLabels {
                    title: "Incidents by month",
                    x_desc: "Month",
                    y_desc: "Incidents",
                },
                ChartData::Bars(count_bars(&self.by_month)),
            ),
            (
                "incidents_by_hour",
                ChartLabels {
                    title: "Incidents by hour of day",
                    x_desc: "Hour",
                    y_desc: "Incidents",
                },
                ChartData::Bars(count_bars(&self.by_hour)),
            ),
            (
                "top_locations",
                ChartLabels {
                    title: "Most frequent location descriptions",
                    x_desc: "Location",
                    y_desc: "Incidents",
                },
                ChartData::Bars(count_bars(&self.top_locations)),
            ),
            (
                "rate_by_borough",
                ChartLabels {
                    title: "Incidents per 100,000 residents",
                    x_desc: "Borough",
                    y_desc: "Rate per 100k",
                },
                ChartData::Bars(rate_bars),
            ),
        ];

        let mut outputs = Vec::with_capacity(jobs.len());
        for (name, labels, data) in jobs {
            let path = dir.join(format!("{}.png", name));
            let result = match &data {
                ChartData::Bars(bars) => StaticChartRenderer::bar_chart(&path, labels, bars),
                ChartData::Line(points) => StaticChartRenderer::line_chart(&path, labels, points),
            };
            outputs.push(chart_output(name, path, result));
        }

        let failed = outputs.iter().filter(|c| c.error.is_some()).count();
        tracing::info!(rendered = outputs.len() - failed, failed, "Rendered charts");
        self.charts = outputs;
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# NYPD Shooting Incident Report\n\n");
        md.push_str(&format!("**Generated:** {}\n\n", self.generated_at));
        md.push_str(&format!("**Source:** {}\n\n", self.source));

        md.push_str("## Data\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Rows loaded | {} |\n", self.rows_loaded));
        md.push_str(&format!("| Rows kept | {} |\n", self.rows_kept));
        md.push_str(&format!("| Rows rejected | {} |\n", self.rows_rejected));
        md.push_str(&format!(
            "| Rejected on invalid | {} |\n",
            self.reject_columns.join(", ")
        ));
        for rejection in &self.rejections {
            md.push_str(&format!(
                "| Rejected on {} | {} |\n",
                rejection.column, rejection.rows
            ));
        }
        md.push('\n');

        push_count_table(&mut md, "Incidents by Borough", "Borough", &self.by_borough.ranked());
        push_count_table(&mut md, "Incidents by Year", "Year", &self.by_year);
        push_count_table(&mut md, "Incidents by Month", "Month", &self.by_month);
        push_count_table(&mut md, "Incidents by Hour", "Hour", &self.by_hour);

        if !self.top_locations.is_empty() {
            md.push_str("## Top Location Descriptions\n\n");
            md.push_str("| Rank | Location | Incidents |\n");
            md.push_str("|------|----------|-----------|\n");
            for (i, group) in self.top_locations.iter().enumerate() {
                md.push_str(&format!("| {} | {} | {} |\n", i + 1, group.key, group.count));
            }
            md.push('\n');
        }

        if !self.borough_rates.is_empty() {
            md.push_str("## Incidents per 100,000 Residents\n\n");
            md.push_str("| Borough | Incidents | Population | Rate |\n");
            md.push_str("|---------|-----------|------------|------|\n");
            for rate in &self.borough_rates {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.1} |\n",
                    rate.borough, rate.count, rate.population, rate.rate_per_100k
                ));
            }
            md.push('\n');
        }

        if !self.murder_share_by_borough.is_empty() {
            md.push_str("## Statistical Murders by Borough\n\n");
            md.push_str("| Borough | Incidents | Murders | Share |\n");
            md.push_str("|---------|-----------|---------|-------|\n");
            for rate in &self.murder_share_by_borough {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.1}% |\n",
                    rate.key,
                    rate.total,
                    rate.flagged,
                    rate.share * 100.0
                ));
            }
            md.push('\n');
        }

        md.push_str("## Age Groups\n\n");
        md.push_str("| Age Group | Victims | Perpetrators |\n");
        md.push_str("|-----------|---------|--------------|\n");
        for (vic, perp) in self
            .victim_age_groups
            .iter()
            .zip(self.perpetrator_age_groups.iter())
        {
            md.push_str(&format!("| {} | {} | {} |\n", vic.label, vic.count, perp.count));
        }
        md.push('\n');

        push_summary_table(&mut md, "Latitude by Borough", &self.latitude_by_borough);
        push_summary_table(&mut md, "Longitude by Borough", &self.longitude_by_borough);

        for model in &self.models {
            md.push_str(&format!("## Model: {}\n\n", model.formula()));
            match &model.outcome {
                ModelOutcome::Fitted(fit) => {
                    md.push_str(&format!(
                        "Reference level: {} = {}\n\n",
                        model.predictor, model.reference_level
                    ));
                    md.push_str("| Term | Estimate | Std. Error | t value | p value |\n");
                    md.push_str("|------|----------|------------|---------|---------|\n");
                    for c in &fit.coefficients {
                        md.push_str(&format!(
                            "| {} | {:.6} | {:.6} | {:.3} | {:.4} |\n",
                            c.name, c.estimate, c.std_error, c.t_value, c.p_value
                        ));
                    }
                    md.push('\n');
                    md.push_str(&format!(
                        "Observations: {}, residual df: {}, residual std. error: {:.6}\n\n",
                        fit.observations, fit.df_residual, fit.residual_std_error
                    ));
                    md.push_str(&format!(
                        "R²: {:.4}, adjusted R²: {:.4}",
                        fit.r_squared, fit.adj_r_squared
                    ));
                    if let (Some(f), Some(p)) = (fit.f_statistic, fit.f_p_value) {
                        md.push_str(&format!(", F: {:.3} (p = {:.4})", f, p));
                    }
                    md.push_str("\n\n");
                }
                ModelOutcome::Failed { reason } => {
                    md.push_str(&format!("*Not fitted:* {}\n\n", reason));
                }
            }
        }

        if !self.charts.is_empty() {
            md.push_str("## Charts\n\n");
            for chart in &self.charts {
                match (&chart.path, &chart.error) {
                    (_, Some(error)) => {
                        md.push_str(&format!("- {}: not rendered ({})\n", chart.name, error))
                    }
                    (Some(path), None) => {
                        let file = path
                            .file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string());
                        md.push_str(&format!("![{}]({})\n", chart.name, file));
                    }
                    (None, None) => {}
                }
            }
            md.push('\n');
        }

        md
    }

    /// Fixed-width tables of the main counts, for the terminal.
    pub fn text_tables(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Incidents: {} kept, {} rejected, {} loaded\n\n",
            self.rows_kept, self.rows_rejected, self.rows_loaded
        ));

        push_text_counts(&mut out, "By borough", &self.by_borough.ranked());
        push_text_counts(&mut out, "By year", &self.by_year);
        push_text_counts(&mut out, "Top locations", &self.top_locations);

        if !self.borough_rates.is_empty() {
            out.push_str("Rate per 100k\n");
            for rate in &self.borough_rates {
                out.push_str(&format!(
                    "  {:<20} {:>10.1}\n",
                    rate.borough.label(),
                    rate.rate_per_100k
                ));
            }
            out.push('\n');
        }

        for model in &self.models {
            match &model.outcome {
                ModelOutcome::Fitted(fit) => out.push_str(&format!(
                    "{:<20} R² {:.4}  n = {}\n",
                    model.formula(),
                    fit.r_squared,
                    fit.observations
                )),
                ModelOutcome::Failed { reason } => {
                    out.push_str(&format!("{:<20} failed: {}\n", model.formula(), reason))
                }
            }
        }
        out
    }

    pub fn print_tables(&self) {
        println!("{}", self.text_tables());
    }

    /// Write `report.md` and `report.json` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(dir)?;

        let md_path = dir.join(MARKDOWN_FILE);
        fs::write(&md_path, self.to_markdown())?;

        let json_path = dir.join(JSON_FILE);
        fs::write(&json_path, self.to_json()?)?;

        tracing::info!(dir = %dir.display(), "Report written");
        Ok(vec![md_path, json_path])
    }
}

enum ChartData {
    Bars(Vec<Bar>),
    Line(Vec<(i32, f64)>),
}

fn chart_output(name: &str, path: PathBuf, result: Result<(), ChartError>) -> ChartOutput {
    match result {
        Ok(()) => ChartOutput {
            name: name.to_string(),
            path: Some(path),
            error: None,
        },
        Err(e) => {
            tracing::warn!(chart = name, error = %e, "Chart not rendered");
            ChartOutput {
                name: name.to_string(),
                path: None,
                error: Some(e.to_string()),
            }
        }
    }
}

fn age_group_counts(counts: Vec<(AgeGroup, usize)>) -> Vec<AgeGroupCount> {
    counts
        .into_iter()
        .map(|(age_group, count)| AgeGroupCount {
            age_group,
            label: age_group.label().to_string(),
            count,
        })
        .collect()
}

fn push_count_table(md: &mut String, title: &str, key_header: &str, groups: &[GroupCount]) {
    if groups.is_empty() {
        return;
    }
    md.push_str(&format!("## {}\n\n", title));
    md.push_str(&format!("| {} | Incidents |\n", key_header));
    md.push_str("|---|---|\n");
    for group in groups {
        md.push_str(&format!("| {} | {} |\n", group.key, group.count));
    }
    md.push('\n');
}

fn push_summary_table(md: &mut String, title: &str, stats: &[SummaryStats]) {
    if stats.is_empty() {
        return;
    }
    md.push_str(&format!("## {}\n\n", title));
    md.push_str("| Borough | Count | Mean | Median | Std | Min | Max | P05 | P95 |\n");
    md.push_str("|---------|-------|------|--------|-----|-----|-----|-----|-----|\n");
    for s in stats {
        md.push_str(&format!(
            "| {} | {} | {:.5} | {:.5} | {:.5} | {:.5} | {:.5} | {:.5} | {:.5} |\n",
            s.group_name, s.count, s.mean, s.median, s.std, s.min, s.max, s.p05, s.p95
        ));
    }
    md.push('\n');
}

fn push_text_counts(out: &mut String, title: &str, groups: &[GroupCount]) {
    if groups.is_empty() {
        return;
    }
    out.push_str(title);
    out.push('\n');
    for group in groups {
        out.push_str(&format!("  {:<40} {:>8}\n", group.key, group.count));
    }
    out.push('\n');
}
