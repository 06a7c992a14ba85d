//! Transaction file loader and schema normalization.
//!
//! RULE: column presence is checked here, once. Downstream engines only
//! ever see canonical `Transaction` records and never re-check columns.
//!
//! Expected columns (written by the external cleaning step):
//!   InvoiceNo, CustomerID, InvoiceDate, Quantity, UnitPrice, Country,
//!   InvoiceMonth, AcquisitionMonth
//! Optional, with fallbacks:
//!   AmountNet  ← Amount ← Quantity × UnitPrice
//!   Amount     ← Quantity × UnitPrice
//!   IsReturn   ← InvoiceNo starts with "C"
//! Optional, carried through:
//!   StockCode, Description

use crate::{
    config::ContinentMap,
    dataset::{acquisition_months, is_credit_note, Dataset, Transaction},
    error::{AnalyticsError, AnalyticsResult},
    types::{first_of_month, month_start},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::{fs::File, io::Read, path::Path};

pub const REQUIRED_COLUMNS: [&str; 8] = [
    "InvoiceNo",
    "CustomerID",
    "InvoiceDate",
    "Quantity",
    "UnitPrice",
    "Country",
    "InvoiceMonth",
    "AcquisitionMonth",
];

/// Where the net amount comes from, resolved once from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetSource {
    AmountNet(usize),
    Amount(usize),
    QuantityTimesPrice,
}

#[derive(Debug, Clone)]
struct Schema {
    invoice_no:        usize,
    customer_id:       usize,
    invoice_date:      usize,
    quantity:          usize,
    unit_price:        usize,
    country:           usize,
    invoice_month:     usize,
    acquisition_month: usize,
    amount:            Option<usize>,
    net:               NetSource,
    is_return:         Option<usize>,
    stock_code:        Option<usize>,
    description:       Option<usize>,
}

impl Schema {
    fn resolve(headers: &StringRecord) -> AnalyticsResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| AnalyticsError::MissingColumn { column: name.to_string() })
        };

        let amount = find("Amount");
        let net = match (find("AmountNet"), amount) {
            (Some(i), _) => NetSource::AmountNet(i),
            (None, Some(i)) => NetSource::Amount(i),
            (None, None) => NetSource::QuantityTimesPrice,
        };
        if !matches!(net, NetSource::AmountNet(_)) {
            log::info!("AmountNet column absent; deriving it via {net:?}");
        }

        Ok(Self {
            invoice_no:        require("InvoiceNo")?,
            customer_id:       require("CustomerID")?,
            invoice_date:      require("InvoiceDate")?,
            quantity:          require("Quantity")?,
            unit_price:        require("UnitPrice")?,
            country:           require("Country")?,
            invoice_month:     require("InvoiceMonth")?,
            acquisition_month: require("AcquisitionMonth")?,
            amount,
            net,
            is_return:         find("IsReturn"),
            stock_code:        find("StockCode"),
            description:       find("Description"),
        })
    }
}

/// Load and normalize transactions from any CSV reader.
pub fn load_transactions<R: Read>(reader: R, continents: &ContinentMap) -> AnalyticsResult<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let schema = Schema::resolve(&headers)?;

    let mut transactions = Vec::new();
    let mut month_mismatches = 0usize;
    for (row_num, result) in csv_reader.records().enumerate() {
        let record = result?;
        // Header is line 1.
        let line = row_num as u64 + 2;
        let (txn, invoice_month_matches) = parse_record(&record, &schema, line)?;
        if !invoice_month_matches {
            month_mismatches += 1;
        }
        transactions.push(txn);
    }

    if month_mismatches > 0 {
        log::warn!("{month_mismatches} rows had an InvoiceMonth not matching InvoiceDate; using InvoiceDate");
    }

    let acquisition = acquisition_months(&transactions);
    let acquisition_mismatches = transactions
        .iter()
        .filter(|t| acquisition.get(&t.customer_id) != Some(&t.acquisition_month))
        .count();
    if acquisition_mismatches > 0 {
        log::warn!(
            "{acquisition_mismatches} rows had an AcquisitionMonth differing from the customer's first invoice month; recomputed"
        );
    }

    if transactions.is_empty() {
        log::warn!("Transaction file contains a header but no rows");
    }

    let dataset = Dataset::from_transactions_with(transactions, continents);
    log::info!(
        "Loaded {} transactions for {} customers",
        dataset.len(),
        dataset.customer_count()
    );
    Ok(dataset)
}

/// Load and normalize transactions from a CSV file on disk.
pub fn load_dataset_file(path: &Path, continents: &ContinentMap) -> AnalyticsResult<Dataset> {
    let file = File::open(path)?;
    log::debug!("Reading transactions from {}", path.display());
    load_transactions(file, continents)
}

fn parse_record(
    record: &StringRecord,
    schema: &Schema,
    line: u64,
) -> AnalyticsResult<(Transaction, bool)> {
    let field = |idx: usize| record.get(idx).unwrap_or("");
    let invalid = |column: &str, value: &str, reason: &str| AnalyticsError::InvalidField {
        line,
        column: column.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let invoice_no = field(schema.invoice_no).to_string();
    if invoice_no.is_empty() {
        return Err(invalid("InvoiceNo", "", "empty invoice number"));
    }

    let raw = field(schema.customer_id);
    let customer_id = parse_integral(raw).ok_or_else(|| invalid("CustomerID", raw, "not an integer"))?;

    let raw = field(schema.invoice_date);
    let invoice_date = parse_timestamp(raw).ok_or_else(|| invalid("InvoiceDate", raw, "not a timestamp"))?;

    let raw = field(schema.quantity);
    let quantity = parse_integral(raw).ok_or_else(|| invalid("Quantity", raw, "not an integer"))?;

    let raw = field(schema.unit_price);
    let unit_price: f64 = raw.parse().map_err(|_| invalid("UnitPrice", raw, "not a number"))?;
    if !unit_price.is_finite() {
        return Err(invalid("UnitPrice", raw, "not a finite number"));
    }
    if unit_price < 0.0 {
        return Err(invalid("UnitPrice", raw, "negative unit price"));
    }

    let raw = field(schema.invoice_month);
    let file_invoice_month = parse_month(raw).ok_or_else(|| invalid("InvoiceMonth", raw, "not a date"))?;
    let invoice_month = month_start(invoice_date);

    let raw = field(schema.acquisition_month);
    let acquisition_month =
        parse_month(raw).ok_or_else(|| invalid("AcquisitionMonth", raw, "not a date"))?;

    let is_return = match schema.is_return {
        Some(idx) => {
            let raw = field(idx);
            parse_bool(raw).ok_or_else(|| invalid("IsReturn", raw, "not a boolean"))?
        }
        None => is_credit_note(&invoice_no),
    };

    let amount = match schema.amount {
        Some(idx) => parse_finite(field(idx)).map_err(|(raw, why)| invalid("Amount", raw, why))?,
        None => quantity as f64 * unit_price,
    };

    // A derived net amount follows the same sign rule as Transaction::new.
    let derived_net = if is_return { -amount } else { amount };
    let amount_net = match schema.net {
        NetSource::AmountNet(idx) => {
            parse_finite(field(idx)).map_err(|(raw, why)| invalid("AmountNet", raw, why))?
        }
        NetSource::Amount(_) | NetSource::QuantityTimesPrice => derived_net,
    };

    let optional = |idx: Option<usize>| {
        idx.map(field)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let country = field(schema.country).to_string();

    let txn = Transaction {
        invoice_no,
        stock_code: optional(schema.stock_code),
        description: optional(schema.description),
        customer_id,
        invoice_date,
        quantity,
        unit_price,
        amount,
        amount_net,
        is_return,
        invoice_month,
        acquisition_month,
        country,
        continent: String::new(),
    };
    Ok((txn, file_invoice_month == invoice_month))
}

fn parse_finite(raw: &str) -> Result<f64, (&str, &'static str)> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err((raw, "not a finite number")),
        Err(_) => Err((raw, "not a number")),
    }
}

/// Integers, tolerating a float rendering such as `17850.0`.
fn parse_integral(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v: f64 = raw.parse().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Flexible bool: "true"/"false", "1"/"0", "yes"/"no", any case.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_month(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw).map(|ts| first_of_month(ts.date()))
}
