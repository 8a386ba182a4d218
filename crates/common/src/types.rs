use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Transaction kind from the sheet's `Type` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EntryType {
    Investment,
    Payout,
    Other(String),
}

impl EntryType {
    /// Case-insensitive match on trimmed text; `None` for an empty cell.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(if trimmed.eq_ignore_ascii_case("investment") {
            Self::Investment
        } else if trimmed.eq_ignore_ascii_case("payout") {
            Self::Payout
        } else {
            Self::Other(trimmed.to_string())
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Investment => "Investment",
            Self::Payout => "Payout",
            Self::Other(s) => s,
        }
    }
}

/// A start date as found in the source. `Invalid` keeps the raw text for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StartDate {
    Parsed(NaiveDate),
    Invalid(String),
    Missing,
}

impl StartDate {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Parsed(d) => Some(*d),
            Self::Invalid(_) | Self::Missing => None,
        }
    }
}

/// One validated row of the investor sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// 1-based data row (header excluded).
    pub row: usize,
    pub timestamp: Option<String>,
    /// Trimmed, title-cased grouping key.
    pub name: String,
    pub amount: Decimal,
    pub entry_type: Option<EntryType>,
    pub start_date: StartDate,
    /// Monthly return in percent.
    pub roi: Option<Decimal>,
}

impl Record {
    pub fn is_payout(&self) -> bool {
        self.entry_type == Some(EntryType::Payout)
    }

    pub fn is_investment(&self) -> bool {
        self.entry_type == Some(EntryType::Investment)
    }
}

/// An investment record plus its derived cycle state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub row: usize,
    pub name: String,
    pub amount: Decimal,
    pub start_date: StartDate,
    pub roi: Option<Decimal>,
    pub months_elapsed: u32,
    pub months_remaining: u32,
}

impl Position {
    pub fn is_active(&self) -> bool {
        self.months_remaining > 0
    }

    /// `amount × roi / 100`, when the record carried an ROI and the product
    /// fits in a `Decimal`.
    pub fn monthly_payout(&self) -> Option<Decimal> {
        let product = self.amount.checked_mul(self.roi?)?;
        Some((product / Decimal::ONE_HUNDRED).normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(amount: i64, roi: Option<Decimal>, remaining: u32) -> Position {
        Position {
            row: 1,
            name: "Priya".to_string(),
            amount: Decimal::from(amount),
            start_date: StartDate::Missing,
            roi,
            months_elapsed: 11 - remaining,
            months_remaining: remaining,
        }
    }

    #[test]
    fn test_entry_type_parse() {
        assert_eq!(EntryType::parse(" investment "), Some(EntryType::Investment));
        assert_eq!(EntryType::parse("PAYOUT"), Some(EntryType::Payout));
        assert_eq!(
            EntryType::parse("Refund"),
            Some(EntryType::Other("Refund".to_string()))
        );
        assert_eq!(EntryType::parse("   "), None);
    }

    #[test]
    fn test_monthly_payout_from_roi() {
        let p = position(50_000, Some(Decimal::new(45, 1)), 5);
        assert_eq!(p.monthly_payout(), Some(Decimal::from(2250)));
        assert!(position(50_000, None, 5).monthly_payout().is_none());
    }

    #[test]
    fn test_monthly_payout_overflow_is_none() {
        let p = Position {
            amount: Decimal::MAX,
            ..position(1, Some(Decimal::from(4)), 5)
        };
        assert!(p.monthly_payout().is_none());
    }

    #[test]
    fn test_is_active_boundary() {
        assert!(position(1, None, 1).is_active());
        assert!(!position(1, None, 0).is_active());
    }

    #[test]
    fn test_start_date_serializes_status() {
        let d = StartDate::Parsed(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["status"], "parsed");
        assert_eq!(json["value"], "2025-03-14");
        let missing = serde_json::to_value(StartDate::Missing).unwrap();
        assert_eq!(missing["status"], "missing");
    }
}
