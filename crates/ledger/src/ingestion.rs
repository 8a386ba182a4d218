//! CSV ingestion: resolve drifting headers to canonical columns, then turn
//! each data row into a validated [`Record`].
//!
//! Rows that cannot identify an investor are skipped with a
//! [`RecordIssue::UnidentifiedRecord`]; unparsable dates are kept as
//! [`StartDate::Invalid`] and reported with [`RecordIssue::InvalidDate`]
//! when the strategy reads dates. Payout rows with an unusable amount are
//! kept as payout events with a zero amount.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use common::error::{LedgerError, LedgerResult, RecordIssue};
use common::types::{EntryType, Record, StartDate};
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::Serialize;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;
/// Ceilings that keep sums and `amount × roi` well inside `Decimal` range.
const MAX_AMOUNT: i64 = 1_000_000_000_000_000;
const MAX_ROI_PCT: i64 = 1_000;

/// Canonical fields of the investor sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Column {
    Timestamp,
    Name,
    Amount,
    Date,
    Roi,
    Type,
}

impl Column {
    pub const ALL: [Self; 6] = [
        Self::Timestamp,
        Self::Name,
        Self::Amount,
        Self::Date,
        Self::Roi,
        Self::Type,
    ];

    /// Header order of the form export. Positional fallback only applies at this width.
    pub const CANONICAL_ORDER: [Self; 5] = [
        Self::Timestamp,
        Self::Name,
        Self::Amount,
        Self::Date,
        Self::Roi,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Timestamp => "Timestamp",
            Self::Name => "Name",
            Self::Amount => "Amount",
            Self::Date => "Date",
            Self::Roi => "ROI",
            Self::Type => "Type",
        }
    }

    /// Normalized header spellings accepted for this column.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Timestamp => &["timestamp", "time", "submitted_at", "created_at"],
            Self::Name => &[
                "name",
                "investor",
                "investor_name",
                "full_name",
                "client",
                "client_name",
            ],
            Self::Amount => &[
                "amount",
                "investment",
                "investment_amount",
                "principal",
                "capital",
                "amount_inr",
                "amount_rs",
            ],
            Self::Date => &[
                "date",
                "start_date",
                "startdate",
                "start",
                "investment_date",
                "date_of_investment",
            ],
            Self::Roi => &[
                "roi",
                "roi_pct",
                "roi_percent",
                "monthly_roi",
                "rate",
                "interest",
                "interest_rate",
            ],
            Self::Type => &["type", "entry_type", "transaction_type", "txn_type", "kind"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnBinding {
    pub column: Column,
    pub index: usize,
    pub header: String,
    pub by_position: bool,
}

/// Which source column feeds which canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    bindings: Vec<ColumnBinding>,
    found: Vec<String>,
}

impl ColumnMap {
    /// Bind headers by alias, then by position for a canonical-width sheet.
    /// Fails with `SchemaMismatch` when any of `required` stays unbound.
    pub fn resolve(headers: &[String], required: &[Column]) -> LedgerResult<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut bindings: Vec<ColumnBinding> = Vec::new();
        let mut claimed: HashSet<usize> = HashSet::new();

        for column in Column::ALL {
            let hit = normalized
                .iter()
                .enumerate()
                .find(|(idx, h)| !claimed.contains(idx) && column.aliases().contains(&h.as_str()));
            if let Some((index, _)) = hit {
                claimed.insert(index);
                bindings.push(ColumnBinding {
                    column,
                    index,
                    header: headers[index].trim().to_string(),
                    by_position: false,
                });
            }
        }

        if headers.len() == Column::CANONICAL_ORDER.len() {
            for (index, column) in Column::CANONICAL_ORDER.into_iter().enumerate() {
                let bound = bindings.iter().any(|b| b.column == column);
                if bound || claimed.contains(&index) {
                    continue;
                }
                let header = headers[index].trim().to_string();
                tracing::warn!(
                    column = column.label(),
                    header = %header,
                    index,
                    "column bound by position; rename the sheet header to silence this"
                );
                claimed.insert(index);
                bindings.push(ColumnBinding {
                    column,
                    index,
                    header,
                    by_position: true,
                });
            }
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|c| !bindings.iter().any(|b| b.column == **c))
            .map(|c| c.label().to_string())
            .collect();
        let found: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        if !missing.is_empty() {
            return Err(LedgerError::SchemaMismatch { missing, found });
        }

        bindings.sort_by_key(|b| b.index);
        Ok(Self { bindings, found })
    }

    pub fn index(&self, column: Column) -> Option<usize> {
        self.bindings
            .iter()
            .find(|b| b.column == column)
            .map(|b| b.index)
    }

    pub fn bindings(&self) -> &[ColumnBinding] {
        &self.bindings
    }

    pub fn found(&self) -> &[String] {
        &self.found
    }

    fn field<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        let value = record.get(self.index(column)?)?.trim();
        (!value.is_empty()).then_some(value)
    }
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub columns: ColumnMap,
    pub records: Vec<Record>,
    pub issues: Vec<RecordIssue>,
    /// Non-blank data rows seen, including skipped ones.
    pub rows_read: usize,
}

/// Parse the raw export. `required` comes from the active reconciliation strategy.
pub fn ingest_csv(body: &str, required: &[Column]) -> LedgerResult<Ingested> {
    let body = body.trim_start_matches('\u{feff}');
    let head = body.trim_start();
    if head.is_empty() {
        return Err(LedgerError::SourceUnavailable(
            "sheet export is empty".to_string(),
        ));
    }
    if head.starts_with('<') {
        return Err(LedgerError::SourceUnavailable(
            "sheet export is not CSV (got an HTML page; is the sheet published?)".to_string(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LedgerError::SourceUnavailable(format!("unreadable header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LedgerError::SourceUnavailable(
            "sheet export has no header row".to_string(),
        ));
    }

    let columns = ColumnMap::resolve(&headers, required)?;
    let report_dates = required.contains(&Column::Date);

    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut rows_read = 0_usize;
    let mut malformed = 0_usize;

    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                rows_read += 1;
                malformed += 1;
                issues.push(RecordIssue::UnidentifiedRecord {
                    row,
                    reason: format!("malformed CSV row: {e}"),
                });
                continue;
            }
        };
        // Sheets exports trailing empty rows as bare commas.
        if raw.iter().all(str::is_empty) {
            continue;
        }
        rows_read += 1;

        match parse_row(row, &raw, &columns) {
            Ok((record, amount_issue)) => {
                if let StartDate::Invalid(bad) = &record.start_date {
                    if report_dates {
                        issues.push(RecordIssue::InvalidDate {
                            row,
                            name: record.name.clone(),
                            raw: bad.clone(),
                        });
                    }
                }
                issues.extend(amount_issue);
                records.push(record);
            }
            Err(reason) => issues.push(RecordIssue::UnidentifiedRecord { row, reason }),
        }
    }

    if rows_read > 0 && malformed == rows_read {
        return Err(LedgerError::SourceUnavailable(format!(
            "none of the {rows_read} data rows could be read as CSV"
        )));
    }

    for issue in &issues {
        tracing::debug!(kind = issue.kind(), row = issue.row(), "{issue}");
    }
    tracing::info!(
        rows_read,
        records = records.len(),
        issues = issues.len(),
        "ingested sheet export"
    );

    Ok(Ingested {
        columns,
        records,
        issues,
        rows_read,
    })
}

fn parse_row(
    row: usize,
    raw: &StringRecord,
    columns: &ColumnMap,
) -> Result<(Record, Option<RecordIssue>), String> {
    let name = columns
        .field(raw, Column::Name)
        .map(normalize_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing investor name".to_string())?;

    let entry_type = columns.field(raw, Column::Type).and_then(EntryType::parse);
    let amount_raw = columns.field(raw, Column::Amount);
    let mut amount_issue = None;
    let amount = match validate_amount(amount_raw, &name) {
        Ok(amount) => amount,
        // Payout counting only needs the event; its amount is never summed.
        Err(_) if entry_type == Some(EntryType::Payout) => {
            amount_issue = Some(RecordIssue::InvalidPayoutAmount {
                row,
                name: name.clone(),
                raw: amount_raw.unwrap_or_default().to_string(),
            });
            Decimal::ZERO
        }
        Err(reason) => return Err(reason),
    };

    let start_date = match columns.field(raw, Column::Date) {
        None => StartDate::Missing,
        Some(text) => parse_start_date(text)
            .map_or_else(|| StartDate::Invalid(text.to_string()), StartDate::Parsed),
    };

    let roi = columns.field(raw, Column::Roi).and_then(|text| {
        let parsed = parse_percent(text);
        if parsed.is_none() {
            tracing::debug!(row, roi = text, "ignoring unparsable ROI");
        }
        parsed
    });

    let record = Record {
        row,
        timestamp: columns.field(raw, Column::Timestamp).map(str::to_string),
        name,
        amount,
        entry_type,
        start_date,
        roi,
    };
    Ok((record, amount_issue))
}

fn validate_amount(raw: Option<&str>, name: &str) -> Result<Decimal, String> {
    let raw = raw.ok_or_else(|| format!("missing amount for {name}"))?;
    let amount =
        parse_amount(raw).ok_or_else(|| format!("non-numeric amount {raw:?} for {name}"))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("negative amount {raw:?} for {name}"));
    }
    if amount > Decimal::from(MAX_AMOUNT) {
        return Err(format!("amount {raw:?} for {name} is implausibly large"));
    }
    Ok(amount)
}

fn normalize_header(name: &str) -> String {
    // Sheets exports may carry a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Grouping key for an investor: whitespace collapsed, title-cased.
pub fn normalize_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut after_letter = false;
    for ch in collapsed.chars() {
        if after_letter {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        after_letter = ch.is_alphabetic();
    }
    out
}

/// Money cell: optional currency prefix, digit grouping commas allowed.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    for prefix in ["₹", "$", "Rs.", "Rs", "INR"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
            break;
        }
    }
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<Decimal>().ok()
}

fn parse_percent(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    s.parse::<Decimal>()
        .ok()
        .filter(|v| !v.is_sign_negative() || v.is_zero())
        .filter(|v| *v <= Decimal::from(MAX_ROI_PCT))
}

/// Day-first date parsing. ISO `YYYY-MM-DD` is accepted since it is unambiguous;
/// a trailing time-of-day is ignored.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    const NAMED_MONTH: [&str; 3] = ["%d %b %Y", "%d-%b-%Y", "%d %B %Y"];

    let raw = raw.trim();
    NAMED_MONTH
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_numeric_date(raw.split_whitespace().next()?))
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
}

fn parse_numeric_date(token: &str) -> Option<NaiveDate> {
    let sep = token.chars().find(|c| matches!(c, '/' | '-' | '.'))?;
    let parts: Vec<&str> = token.split(sep).collect();
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|ch| ch.is_ascii_digit()))
    {
        return None;
    }
    let [first, month, last] = parts.as_slice() else {
        return None;
    };

    if first.len() == 4 {
        return NaiveDate::from_ymd_opt(first.parse().ok()?, month.parse().ok()?, last.parse().ok()?);
    }
    let year: i32 = match last.len() {
        2 => 2000 + last.parse::<i32>().ok()?,
        4 => last.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month.parse().ok()?, first.parse().ok()?)
}
