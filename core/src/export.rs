//! Tabular exports: delimited text and spreadsheet.
//!
//! Every output type renders itself as a `Table`; writers only format.

use crate::{
    cohort_engine::RetentionMatrix,
    dataset::Dataset,
    error::AnalyticsResult,
    kpi_summary::{CohortKpis, OverviewKpis},
    rfm_engine::{Segment, SegmentedCustomer},
    scenario_simulator::{adjusted_amount, scenario_subset, ScenarioOutcome, ScenarioParams},
    segment_metrics::SegmentMetrics,
    types::cohort_key,
};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::{fs::File, io::Write, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Empty    => String::new(),
            Cell::Text(s)  => s.clone(),
            Cell::Int(i)   => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Date(d)  => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Int(v as i64)
    }
}

impl From<u32> for Cell {
    fn from(v: u32) -> Self {
        Cell::Int(i64::from(v))
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name:    String,
    pub headers: Vec<String>,
    pub rows:    Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name:    name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows:    Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }
}

pub trait ToTable {
    fn to_table(&self) -> Table;
}

// ── Renderers ────────────────────────────────────────────────────────────────

impl ToTable for RetentionMatrix {
    fn to_table(&self) -> Table {
        let max_age = self.max_age().unwrap_or(0);
        let mut headers = vec!["AcquisitionMonth".to_string(), "CohortSize".to_string()];
        headers.extend((0..=max_age).map(|a| a.to_string()));

        let mut table = Table {
            name: "retention".into(),
            headers,
            rows: Vec::new(),
        };
        for (cohort, row) in &self.rates {
            let mut cells = vec![
                Cell::Text(cohort_key(*cohort)),
                Cell::from(self.cohort_sizes.get(cohort).copied()),
            ];
            cells.extend((0..=max_age).map(|age| Cell::from(row.get(&age).copied())));
            table.push(cells);
        }
        table
    }
}

impl ToTable for [SegmentedCustomer] {
    fn to_table(&self) -> Table {
        let mut table = Table::new("rfm", &[
            "CustomerID", "Recency", "Frequency", "Monetary",
            "R_Score", "F_Score", "M_Score", "RFM_Score", "RFM_Total", "Segment",
        ]);
        for c in self {
            table.push(vec![
                Cell::Int(c.rfm.customer_id),
                Cell::Int(c.rfm.recency),
                Cell::Int(i64::from(c.rfm.frequency)),
                Cell::Float(c.rfm.monetary),
                Cell::Int(i64::from(c.rfm.r_score)),
                Cell::Int(i64::from(c.rfm.f_score)),
                Cell::Int(i64::from(c.rfm.m_score)),
                Cell::from(c.rfm.rfm_score.as_str()),
                Cell::Int(i64::from(c.rfm.rfm_total)),
                Cell::from(c.segment.label()),
            ]);
        }
        table
    }
}

/// Customers in the activation segments, for campaign targeting.
pub fn activation_table(customers: &[SegmentedCustomer]) -> Table {
    let mut table = Table::new("activation_list", &[
        "CustomerID", "Segment", "Recency", "Frequency", "Monetary", "RFM_Score",
    ]);
    for c in customers.iter().filter(|c| Segment::ACTIVATION.contains(&c.segment)) {
        table.push(vec![
            Cell::Int(c.rfm.customer_id),
            Cell::from(c.segment.label()),
            Cell::Int(c.rfm.recency),
            Cell::Int(i64::from(c.rfm.frequency)),
            Cell::Float(c.rfm.monetary),
            Cell::from(c.rfm.rfm_score.as_str()),
        ]);
    }
    table
}

impl ToTable for [SegmentMetrics] {
    fn to_table(&self) -> Table {
        let mut table = Table::new("segments", &[
            "Priorité", "Segment", "Clients", "CA_Total",
            "Part_CA", "Panier_Moyen", "Transactions", "Action",
        ]);
        for m in self {
            table.push(vec![
                Cell::Int(i64::from(m.priority)),
                Cell::from(m.segment.label()),
                Cell::from(m.clients),
                Cell::Float(m.ca_total),
                Cell::Float(m.part_ca),
                Cell::Float(m.panier_moyen),
                Cell::from(m.transactions),
                Cell::from(m.action.as_str()),
            ]);
        }
        table
    }
}

impl ToTable for ScenarioOutcome {
    fn to_table(&self) -> Table {
        let mut table = Table::new("scenario", &["KPI", "Baseline", "Scenario", "Delta"]);
        let rows = [
            ("CLV", self.baseline.clv, self.scenario.clv, self.delta.clv),
            ("CA", self.baseline.ca, self.scenario.ca, self.delta.ca),
            ("Retention", self.baseline.retention, self.scenario.retention, self.delta.retention),
        ];
        for (kpi, base, scen, delta) in rows {
            table.push(vec![kpi.into(), base.into(), scen.into(), delta.into()]);
        }
        table
    }
}

impl ScenarioOutcome {
    pub fn monthly_table(&self) -> Table {
        let mut table = Table::new("scenario_monthly", &[
            "InvoiceMonth", "CA_baseline", "CA_scenario", "CLV_baseline", "CLV_scenario",
        ]);
        for p in &self.monthly {
            table.push(vec![
                Cell::Date(p.month),
                p.ca_baseline.into(),
                p.ca_scenario.into(),
                p.clv_baseline.into(),
                p.clv_scenario.into(),
            ]);
        }
        table
    }
}

/// Every line of the scenario subset with its adjusted net amount.
pub fn scenario_lines_table(dataset: &Dataset, params: &ScenarioParams) -> AnalyticsResult<Table> {
    params.validate()?;
    let subset = scenario_subset(dataset, params);
    let mut table = Table::new("scenario_lines", &[
        "InvoiceNo", "CustomerID", "InvoiceDate", "Country",
        "AcquisitionMonth", "AmountNet", "AmountNet_adj",
    ]);
    for txn in subset.iter() {
        table.push(vec![
            Cell::from(txn.invoice_no.as_str()),
            Cell::Int(txn.customer_id),
            Cell::Text(txn.invoice_date.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::from(txn.country.as_str()),
            Cell::Text(cohort_key(txn.acquisition_month)),
            Cell::Float(txn.amount_net),
            Cell::Float(adjusted_amount(txn.amount_net, params)),
        ]);
    }
    Ok(table)
}

impl ToTable for OverviewKpis {
    fn to_table(&self) -> Table {
        let mut table = Table::new("overview", &["Metric", "Value"]);
        table.push(vec!["active_clients".into(), self.active_clients.into()]);
        table.push(vec!["rfm_count".into(), self.rfm_count.into()]);
        table.push(vec!["clv_baseline".into(), self.clv_baseline.into()]);
        table.push(vec!["avg_rev_per_age".into(), self.avg_rev_per_age.into()]);
        table.push(vec!["north_star".into(), self.north_star.into()]);
        table.push(vec!["period_start".into(), Cell::Date(self.period_start.date())]);
        table.push(vec!["period_end".into(), Cell::Date(self.period_end.date())]);
        table
    }
}

impl ToTable for CohortKpis {
    fn to_table(&self) -> Table {
        let mut table = Table::new("cohort_kpis", &["Metric", "Value"]);
        table.push(vec!["clv_mean".into(), self.clv_mean.into()]);
        table.push(vec!["early_revenue_per_customer".into(), self.early_revenue_per_customer.into()]);
        table.push(vec!["retention_checkpoint_pct".into(), self.retention_checkpoint_pct.into()]);
        table.push(vec!["clv_formula".into(), self.clv_formula.into()]);
        table
    }
}

/// Two-column table from any keyed series.
pub fn series_table<K, I>(name: &str, key_header: &str, value_header: &str, series: I) -> Table
where
    K: Into<Cell>,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut table = Table::new(name, &[key_header, value_header]);
    for (k, v) in series {
        table.push(vec![k.into(), v.into()]);
    }
    table
}

// ── Writers ──────────────────────────────────────────────────────────────────

pub fn write_csv<W: Write>(table: &Table, writer: W, delimiter: u8) -> AnalyticsResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    csv_writer.write_record(&table.headers)?;
    for row in &table.rows {
        csv_writer.write_record(row.iter().map(Cell::render))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file(table: &Table, path: &Path, delimiter: u8) -> AnalyticsResult<()> {
    let file = File::create(path)?;
    write_csv(table, file, delimiter)?;
    log::info!("Exported table '{}' to {}", table.name, path.display());
    Ok(())
}

fn build_workbook(tables: &[Table]) -> AnalyticsResult<Workbook> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for table in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(&table.name))?;

        for (col, h) in table.headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, h, &header)?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let row_idx = (r + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Empty    => {}
                    Cell::Text(s)  => { sheet.write_string(row_idx, col, s)?; }
                    Cell::Int(i)   => { sheet.write_number(row_idx, col, *i as f64)?; }
                    Cell::Float(f) => { sheet.write_number(row_idx, col, *f)?; }
                    Cell::Date(_)  => { sheet.write_string(row_idx, col, cell.render())?; }
                }
            }
        }
    }
    Ok(workbook)
}

/// One worksheet per table.
pub fn write_xlsx(tables: &[Table], path: &Path) -> AnalyticsResult<()> {
    let mut workbook = build_workbook(tables)?;
    workbook.save(path)?;
    log::info!("Exported {} tables to {}", tables.len(), path.display());
    Ok(())
}

pub fn xlsx_bytes(tables: &[Table]) -> AnalyticsResult<Vec<u8>> {
    let mut workbook = build_workbook(tables)?;
    Ok(workbook.save_to_buffer()?)
}

/// Worksheet names: at most 31 characters, none of `[]:*?/\`.
fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(31)
        .collect();
    if cleaned.is_empty() { "Sheet".to_string() } else { cleaned }
}
