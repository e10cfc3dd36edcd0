//! Transaction loading and parsing using Polars

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, RfmError};

pub const CUSTOMER_ID: &str = "CustomerID";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const QUANTITY: &str = "Quantity";
pub const UNIT_PRICE: &str = "UnitPrice";
/// Quantity × UnitPrice, derived per line
pub const LINE_TOTAL: &str = "TotalAmount";

/// Layouts accepted for InvoiceDate after RFC 3339 has been tried
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Customer identifier as it appears in the sales log
///
/// Identifiers made only of digits order numerically and come before any
/// other identifier; the rest order as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        CustomerId(id.into())
    }

    /// Interpret a raw CustomerID cell.
    ///
    /// Blank and `NaN` cells are anonymous (guest) purchases and yield `None`.
    /// Spreadsheet exports write integral identifiers as `17850.0`; the
    /// trailing `.0` is removed so both spellings name the same customer.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("nan")
            || trimmed.eq_ignore_ascii_case("null")
        {
            return None;
        }

        let id = match trimmed.strip_suffix(".0") {
            Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits
            }
            _ => trimmed,
        };
        Some(CustomerId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Significant digits of a numeric identifier, `None` otherwise
    fn numeric_digits(&self) -> Option<&str> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = self.0.trim_start_matches('0');
        Some(if digits.is_empty() { "0" } else { digits })
    }
}

impl Ord for CustomerId {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_value = match (self.numeric_digits(), other.numeric_digits()) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        // "007" and "7" are distinct customers
        by_value.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for CustomerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Character set of the input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum InputEncoding {
    Utf8,
    /// ISO-8859-1, the encoding of the classic online-retail export
    #[default]
    Latin1,
}

impl InputEncoding {
    /// Convert file bytes into UTF-8 for the CSV reader
    pub fn decode(self, bytes: Vec<u8>) -> Vec<u8> {
        match self {
            InputEncoding::Utf8 => bytes,
            // Every Latin-1 byte is the code point of the same value.
            InputEncoding::Latin1 => bytes
                .iter()
                .map(|&b| b as char)
                .collect::<String>()
                .into_bytes(),
        }
    }
}

/// One sales-log line exactly as read from the input, before typing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransaction {
    pub customer_id: Option<String>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
}

/// A typed invoice line item
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// `None` for anonymous purchases
    pub customer_id: Option<CustomerId>,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    /// Negative for returns
    pub quantity: i64,
    pub unit_price: f64,
}

impl Transaction {
    /// Type a raw row.
    ///
    /// # Arguments
    /// * `row` - Zero-based data row, used in error messages
    /// * `raw` - Cells as read from the input
    ///
    /// # Returns
    /// * The typed transaction, or `DataFormat` naming the first bad cell
    pub fn from_raw(row: usize, raw: &RawTransaction) -> Result<Transaction> {
        let customer_id = raw.customer_id.as_deref().and_then(CustomerId::parse);

        let invoice_no = required(row, INVOICE_NO, &raw.invoice_no)?.to_string();

        let date_text = required(row, INVOICE_DATE, &raw.invoice_date)?;
        let invoice_date = parse_invoice_date(date_text).ok_or_else(|| {
            RfmError::cell(row, INVOICE_DATE, format!("cannot parse '{}'", date_text))
        })?;

        let quantity_text = required(row, QUANTITY, &raw.quantity)?;
        let quantity = parse_quantity(quantity_text).ok_or_else(|| {
            RfmError::cell(row, QUANTITY, format!("'{}' is not an integer", quantity_text))
        })?;

        let price_text = required(row, UNIT_PRICE, &raw.unit_price)?;
        let unit_price = price_text
            .parse::<f64>()
            .ok()
            .filter(|price| price.is_finite())
            .ok_or_else(|| {
                RfmError::cell(row, UNIT_PRICE, format!("'{}' is not a number", price_text))
            })?;

        Ok(Transaction {
            customer_id,
            invoice_no,
            invoice_date,
            quantity,
            unit_price,
        })
    }
}

fn required<'a>(row: usize, column: &'static str, cell: &'a Option<String>) -> Result<&'a str> {
    match cell.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(RfmError::cell(row, column, "value is missing")),
    }
}

fn parse_quantity(text: &str) -> Option<i64> {
    if let Ok(quantity) = text.parse::<i64>() {
        return Some(quantity);
    }
    // Integral floats such as "6.0"
    let value = text.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Parse an InvoiceDate cell into a naive timestamp.
///
/// RFC 3339 values are converted to UTC first. Date-only values are taken at
/// midnight.
pub fn parse_invoice_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Load a sales-log CSV and type every row
///
/// # Arguments
/// * `file_path` - Path to the CSV file
/// * `encoding` - Character set of the file
///
/// # Returns
/// * One `Transaction` per data row, anonymous rows included
pub fn load_transactions(
    file_path: impl AsRef<Path>,
    encoding: InputEncoding,
) -> Result<Vec<Transaction>> {
    let path = file_path.as_ref();
    let bytes = fs::read(path)?;

    let df = read_csv_bytes(encoding.decode(bytes))?;
    debug!(rows = df.height(), columns = df.width(), "read csv");

    let raw = extract_raw_transactions(&df)?;
    let transactions = parse_transactions(&raw)?;

    info!(
        "Loaded {} transaction rows from {}",
        transactions.len(),
        path.display()
    );
    Ok(transactions)
}

/// Read UTF-8 CSV bytes into a DataFrame with every column as text
pub fn read_csv_bytes(bytes: Vec<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Pull the five required columns out of a DataFrame
pub fn extract_raw_transactions(df: &DataFrame) -> Result<Vec<RawTransaction>> {
    let customer_ids = text_column(df, CUSTOMER_ID)?;
    let invoice_nos = text_column(df, INVOICE_NO)?;
    let invoice_dates = text_column(df, INVOICE_DATE)?;
    let quantities = text_column(df, QUANTITY)?;
    let unit_prices = text_column(df, UNIT_PRICE)?;

    let rows = customer_ids
        .into_iter()
        .zip(invoice_nos)
        .zip(invoice_dates)
        .zip(quantities)
        .zip(unit_prices)
        .map(
            |((((customer_id, invoice_no), invoice_date), quantity), unit_price)| RawTransaction {
                customer_id,
                invoice_no,
                invoice_date,
                quantity,
                unit_price,
            },
        )
        .collect();

    Ok(rows)
}

fn text_column(df: &DataFrame, name: &'static str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| RfmError::column(name, "required column is missing"))?;
    let text = column.cast(&DataType::String)?;
    let values = text
        .str()?
        .into_iter()
        .map(|cell| cell.map(str::to_owned))
        .collect();
    Ok(values)
}

/// Type every raw row, failing on the first malformed one
pub fn parse_transactions(raw: &[RawTransaction]) -> Result<Vec<Transaction>> {
    raw.iter()
        .enumerate()
        .map(|(row, record)| Transaction::from_raw(row, record))
        .collect()
}

/// Build a typed DataFrame from transactions
///
/// InvoiceDate is stored as microseconds since the Unix epoch. The frame has
/// the columns `CustomerID` (nullable text), `InvoiceNo`, `InvoiceDate`,
/// `Quantity` and `UnitPrice`; line totals are derived from it lazily.
pub fn transactions_frame(transactions: &[Transaction]) -> Result<DataFrame> {
    let customer_ids: Vec<Option<&str>> = transactions
        .iter()
        .map(|tx| tx.customer_id.as_ref().map(CustomerId::as_str))
        .collect();
    let invoice_nos: Vec<&str> = transactions.iter().map(|tx| tx.invoice_no.as_str()).collect();
    let invoice_dates: Vec<i64> = transactions
        .iter()
        .map(|tx| tx.invoice_date.and_utc().timestamp_micros())
        .collect();
    let quantities: Vec<i64> = transactions.iter().map(|tx| tx.quantity).collect();
    let unit_prices: Vec<f64> = transactions.iter().map(|tx| tx.unit_price).collect();

    let df = DataFrame::new(vec![
        Series::new(CUSTOMER_ID, customer_ids),
        Series::new(INVOICE_NO, invoice_nos),
        Series::new(INVOICE_DATE, invoice_dates),
        Series::new(QUANTITY, quantities),
        Series::new(UNIT_PRICE, unit_prices),
    ])?;
    Ok(df)
}

/// `Quantity × UnitPrice` as a float column named `TotalAmount`
pub fn line_total_expr() -> Expr {
    (col(QUANTITY).cast(DataType::Float64) * col(UNIT_PRICE)).alias(LINE_TOTAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom").unwrap();
        writeln!(file, "536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850,United Kingdom").unwrap();
        writeln!(file, "536366,22633,HAND WARMER UNION JACK,6,12/1/2010 8:28,1.85,17850,United Kingdom").unwrap();
        writeln!(file, "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,12/1/2010 8:34,2.75,13047.0,United Kingdom").unwrap();
        writeln!(file, "536414,22139,RETROSPOT TEA SET,56,12/1/2010 11:52,0,,United Kingdom").unwrap();
        file
    }

    #[test]
    fn test_load_transactions() {
        let test_file = create_test_csv();

        let transactions = load_transactions(test_file.path(), InputEncoding::Utf8).unwrap();
        assert_eq!(transactions.len(), 5);

        let first = &transactions[0];
        assert_eq!(first.customer_id, Some(CustomerId::new("17850")));
        assert_eq!(first.invoice_no, "536365");
        assert_eq!(first.quantity, 6);
        assert_eq!(first.unit_price, 2.55);
        assert_eq!(
            first.invoice_date,
            NaiveDate::from_ymd_opt(2010, 12, 1).unwrap().and_hms_opt(8, 26, 0).unwrap()
        );

        assert_eq!(transactions[3].customer_id, Some(CustomerId::new("13047")));
        assert_eq!(transactions[4].customer_id, None);
    }

    #[test]
    fn test_latin1_bytes_are_decoded() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"InvoiceNo,Description,Quantity,InvoiceDate,UnitPrice,CustomerID\n").unwrap();
        file.write_all(b"540001,CAF\xc9 MUG,2,2011-01-04 10:00:00,1.5,12345\n").unwrap();

        let transactions = load_transactions(file.path(), InputEncoding::Latin1).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].customer_id, Some(CustomerId::new("12345")));

        assert_eq!(InputEncoding::Latin1.decode(vec![0xc9]), "É".as_bytes());
    }

    #[test]
    fn test_missing_column_is_data_format_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,Quantity,InvoiceDate,CustomerID").unwrap();
        writeln!(file, "536365,6,2010-12-01 08:26:00,17850").unwrap();

        let err = load_transactions(file.path(), InputEncoding::Utf8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(err.to_string().contains(UNIT_PRICE));
    }

    #[test]
    fn test_unparseable_date_fails_even_for_anonymous_rows() {
        let raw = vec![RawTransaction {
            customer_id: None,
            invoice_no: Some("536365".to_string()),
            invoice_date: Some("not a date".to_string()),
            quantity: Some("1".to_string()),
            unit_price: Some("1.0".to_string()),
        }];

        match parse_transactions(&raw) {
            Err(RfmError::DataFormat { row, column, .. }) => {
                assert_eq!(row, Some(0));
                assert_eq!(column, INVOICE_DATE);
            }
            other => panic!("expected a data format error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_quantity_is_reported() {
        let raw = RawTransaction {
            customer_id: Some("1".to_string()),
            invoice_no: Some("A1".to_string()),
            invoice_date: Some("2011-01-01".to_string()),
            quantity: Some("  ".to_string()),
            unit_price: Some("2".to_string()),
        };
        let err = Transaction::from_raw(3, &raw).unwrap_err();
        assert!(err.to_string().contains("row 3"));
        assert!(err.to_string().contains(QUANTITY));
    }

    #[test]
    fn test_parse_invoice_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2011, 12, 9)
            .unwrap()
            .and_hms_opt(12, 50, 0)
            .unwrap();

        for text in [
            "2011-12-09T12:50:00Z",
            "2011-12-09T13:50:00+01:00",
            "2011-12-09 12:50:00",
            "2011-12-09 12:50",
            "2011-12-09T12:50:00",
            "12/9/2011 12:50",
            "12/09/2011 12:50:00",
        ] {
            assert_eq!(parse_invoice_date(text), Some(expected), "layout {}", text);
        }

        assert_eq!(
            parse_invoice_date("2011-12-09"),
            NaiveDate::from_ymd_opt(2011, 12, 9).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_invoice_date("09.12.2011"), None);
        assert_eq!(parse_invoice_date(""), None);
    }

    #[test]
    fn test_customer_id_parse() {
        assert_eq!(CustomerId::parse(" 17850 "), Some(CustomerId::new("17850")));
        assert_eq!(CustomerId::parse("17850.0"), Some(CustomerId::new("17850")));
        assert_eq!(CustomerId::parse("C-42"), Some(CustomerId::new("C-42")));
        assert_eq!(CustomerId::parse(""), None);
        assert_eq!(CustomerId::parse("NaN"), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("-3"), Some(-3));
        assert_eq!(parse_quantity("6.0"), Some(6));
        assert_eq!(parse_quantity("6.5"), None);
        assert_eq!(parse_quantity("six"), None);
    }

    #[test]
    fn test_numeric_customer_ids_order_by_value() {
        let mut ids: Vec<CustomerId> = ["10", "C-1", "9", "100", "007", "7", "A"]
            .into_iter()
            .map(CustomerId::new)
            .collect();
        ids.sort();

        let sorted: Vec<&str> = ids.iter().map(CustomerId::as_str).collect();
        assert_eq!(sorted, vec!["007", "7", "9", "10", "100", "A", "C-1"]);
        assert_ne!(CustomerId::new("7"), CustomerId::new("007"));
    }

    #[test]
    fn test_transactions_frame_columns() {
        let date = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap().and_hms_opt(0, 0, 1).unwrap();
        let transactions = vec![
            Transaction {
                customer_id: Some(CustomerId::new("1")),
                invoice_no: "A1".to_string(),
                invoice_date: date,
                quantity: 3,
                unit_price: 0.5,
            },
            Transaction {
                customer_id: None,
                invoice_no: "A2".to_string(),
                invoice_date: date,
                quantity: -1,
                unit_price: 2.0,
            },
        ];

        let df = transactions_frame(&transactions).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column(CUSTOMER_ID).unwrap().null_count(), 1);
        assert_eq!(
            df.column(INVOICE_DATE).unwrap().i64().unwrap().get(0),
            Some(date.and_utc().timestamp_micros())
        );

        let totals = df.lazy().select([line_total_expr()]).collect().unwrap();
        let totals: Vec<Option<f64>> = totals.column(LINE_TOTAL).unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(totals, vec![Some(1.5), Some(-2.0)]);
    }
}
