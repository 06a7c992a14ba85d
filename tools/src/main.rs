//! dashboard-runner: headless driver for the retail analytics core.
//!
//! Usage:
//!   dashboard-runner --input clean.csv overview
//!   dashboard-runner --input clean.csv cohorts --continent Europe --focus 2010-01
//!   dashboard-runner --input clean.csv segments --exclude-returns --xlsx rfm.xlsx
//!   dashboard-runner --input clean.csv scenario --margin 10 --discount 5 --retention -10
//!   dashboard-runner --input clean.csv serve     (line-delimited JSON on stdin)

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use retail_analytics_core::{
    cache::DatasetCache,
    config::AnalyticsConfig,
    dashboard::{CohortQuery, Dashboard, SegmentQuery},
    export::{
        activation_table, scenario_lines_table, series_table, write_csv_file, write_xlsx, Table,
        ToTable,
    },
    filter::{Geography, TransactionFilter},
    scenario_simulator::ScenarioParams,
    types::cohort_key,
};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cohort, RFM and scenario analytics over a cleaned invoice log")]
struct Cli {
    /// Cleaned transaction CSV
    #[arg(short, long, default_value = "data/online_retail_II_clean_scenario.csv")]
    input: PathBuf,

    /// Directory holding segments/ and geo/ reference tables; built-in tables when absent
    #[arg(long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Report(ReportCommand),
    /// Answer JSON commands from stdin, one per line
    Serve,
}

/// One-shot pages: compute, print, optionally export.
#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Headline KPIs and monthly revenue
    Overview {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Retention matrix, revenue by cohort age and cohort KPIs
    Cohorts {
        #[command(flatten)]
        filter: FilterArgs,
        /// Cohort (YYYY-MM) to break down on its own
        #[arg(long, value_parser = parse_cohort)]
        focus: Option<NaiveDate>,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// RFM scores, segments and segment metrics
    Segments {
        #[command(flatten)]
        filter: FilterArgs,
        /// Leave credit notes out of the RFM computation
        #[arg(long)]
        exclude_returns: bool,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Baseline vs scenario KPIs
    Scenario {
        /// Margin change in percent, [-50, 50]
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        margin: f64,
        /// Average discount in percent, [0, 50]
        #[arg(long, default_value_t = 0.0)]
        discount: f64,
        /// Retention change in percent, [-50, 20]
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        retention: f64,
        /// Restrict to one acquisition cohort (YYYY-MM)
        #[arg(long, value_parser = parse_cohort)]
        cohort: Option<NaiveDate>,
        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    continent: Option<String>,
    /// Repeatable
    #[arg(long = "country")]
    countries: Vec<String>,
    /// Earliest acquisition month (YYYY-MM)
    #[arg(long, value_parser = parse_cohort)]
    from_cohort: Option<NaiveDate>,
    /// Latest acquisition month (YYYY-MM)
    #[arg(long, value_parser = parse_cohort)]
    to_cohort: Option<NaiveDate>,
    /// Explicit cohort inclusion (YYYY-MM), repeatable
    #[arg(long = "cohort", value_parser = parse_cohort)]
    cohorts: Vec<NaiveDate>,
    /// First invoice date kept (YYYY-MM-DD)
    #[arg(long)]
    from_date: Option<NaiveDate>,
    /// Last invoice date kept (YYYY-MM-DD)
    #[arg(long)]
    to_date: Option<NaiveDate>,
}

impl FilterArgs {
    fn to_filter(&self) -> TransactionFilter {
        let geography = match (&self.continent, self.countries.is_empty()) {
            (Some(name), _) => Geography::Continent { name: name.clone() },
            (None, false) => Geography::Countries { names: self.countries.clone() },
            (None, true) => Geography::All,
        };
        TransactionFilter {
            geography,
            acquisition_from: self.from_cohort,
            acquisition_to: self.to_cohort,
            cohorts: (!self.cohorts.is_empty())
                .then(|| self.cohorts.iter().copied().collect::<BTreeSet<_>>()),
            invoice_from: self.from_date,
            invoice_to: self.to_date,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct ExportArgs {
    /// Write the main table as delimited text
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Write every table to a workbook
    #[arg(long)]
    xlsx: Option<PathBuf>,
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

impl ExportArgs {
    fn write(&self, tables: &[Table]) -> Result<()> {
        if let (Some(path), Some(main)) = (&self.csv, tables.first()) {
            let delimiter = u8::try_from(self.delimiter)
                .map_err(|_| anyhow::anyhow!("delimiter must be a single-byte character"))?;
            write_csv_file(main, path, delimiter)?;
        }
        if let Some(path) = &self.xlsx {
            write_xlsx(tables, path)?;
        }
        Ok(())
    }
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Overview {
        #[serde(default)]
        filter: TransactionFilter,
    },
    Cohorts(CohortQuery),
    Segments(SegmentQuery),
    Scenario(ScenarioParams),
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.data_dir {
        Some(dir) => AnalyticsConfig::load(dir)?,
        None => AnalyticsConfig::default(),
    };
    let mut cache = DatasetCache::new(config.continents.clone());

    match &cli.command {
        Command::Serve => run_ipc_loop(&mut cache, &cli.input, &config)?,
        Command::Report(report) => {
            let dashboard = Dashboard::new(cache.get_or_load(&cli.input)?, config);
            run_once(&dashboard, report)?;
        }
    }
    Ok(())
}

fn run_once(dashboard: &Dashboard, command: &ReportCommand) -> Result<()> {
    match command {
        ReportCommand::Overview { filter, export } => {
            let report = dashboard.overview(&filter.to_filter())?;
            print_json(&report)?;
            export.write(&[
                report.kpis.to_table(),
                series_table(
                    "monthly_revenue",
                    "InvoiceMonth",
                    "AmountNet",
                    report.monthly_revenue.iter().map(|(m, v)| (*m, *v)),
                ),
            ])?;
        }
        ReportCommand::Cohorts { filter, focus, export } => {
            let report = dashboard.cohorts(&CohortQuery {
                filter: filter.to_filter(),
                focus: *focus,
            })?;
            print_json(&report)?;
            let mut tables = vec![
                report.retention.to_table(),
                series_table(
                    "revenue_by_age",
                    "CohortAge",
                    "AmountNet",
                    report.revenue_by_age.iter().map(|(a, v)| (*a, *v)),
                ),
                report.kpis.to_table(),
            ];
            if let Some(f) = &report.focus {
                tables.push(series_table(
                    &format!("cohort_{}", cohort_key(f.cohort)),
                    "CohortAge",
                    "AmountNet",
                    f.revenue_by_age.iter().map(|(a, v)| (*a, *v)),
                ));
            }
            export.write(&tables)?;
        }
        ReportCommand::Segments { filter, exclude_returns, export } => {
            let report = dashboard.segments(&SegmentQuery {
                filter: filter.to_filter(),
                include_returns: !exclude_returns,
            })?;
            print_summary_line(&format!(
                "{} customers in {} segments",
                report.overview.total_clients, report.overview.active_segments
            ));
            print_json(&report.metrics)?;
            export.write(&[
                report.metrics.to_table(),
                report.customers.to_table(),
                activation_table(&report.customers),
            ])?;
        }
        ReportCommand::Scenario { margin, discount, retention, cohort, export } => {
            let params = ScenarioParams {
                margin_pct: *margin,
                discount_pct: *discount,
                retention_pct: *retention,
                cohort: *cohort,
            };
            let outcome = dashboard.scenario(&params)?;
            print_json(&outcome)?;
            export.write(&[
                outcome.to_table(),
                outcome.monthly_table(),
                scenario_lines_table(dashboard.dataset(), &params)?,
            ])?;
        }
    }
    Ok(())
}

fn run_ipc_loop(cache: &mut DatasetCache, input: &Path, config: &AnalyticsConfig) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    log::info!("Serving dashboard commands for {}", input.display());

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        // Reloads only when the source file changed since the last command.
        let dataset = match cache.get_or_load(input) {
            Ok(d) => d,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };
        let dashboard = Dashboard::new(dataset, config.clone());
        let response = match cmd {
            IpcCommand::Overview { filter } => dashboard.overview(&filter).map(to_value),
            IpcCommand::Cohorts(query) => dashboard.cohorts(&query).map(to_value),
            IpcCommand::Segments(query) => dashboard.segments(&query).map(to_value),
            IpcCommand::Scenario(params) => dashboard.scenario(&params).map(to_value),
            IpcCommand::Quit => break,
        };

        match response {
            Ok(Ok(value)) => writeln!(stdout, "{value}")?,
            Ok(Err(e)) => write_error(&mut stdout, &e.to_string())?,
            Err(e) => write_error(&mut stdout, &e.to_string())?,
        }
        stdout.flush()?;
    }
    Ok(())
}

fn to_value<T: Serialize>(v: T) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(v)
}

fn write_error(out: &mut impl Write, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(out, "{err_json}")?;
    out.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary_line(line: &str) {
    eprintln!("{line}");
}

fn parse_cohort(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM, got '{raw}': {e}"))
}
