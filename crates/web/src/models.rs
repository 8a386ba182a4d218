//! View models for dashboard templates.
//! Everything here is preformatted text; templates do no arithmetic.

use chrono::NaiveDate;
use common::config::LedgerSettings;
use common::error::LedgerError;
use common::types::{Position, StartDate};
use ledger::aggregation::{Liability, Summary};
use ledger::pipeline::{DashboardState, Report};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::cache::Freshness;

/// Status banner above the metrics
pub struct Banner {
    /// Tailwind classes for border/background/text
    pub classes: String,
    pub title: String,
    pub detail: String,
}

/// One headline figure
pub struct MetricCard {
    pub label: String,
    pub value: String,
    /// Small print under the value, empty when there is nothing to add
    pub note: String,
}

/// Row in the active positions table
pub struct PositionRow {
    pub name: String,
    pub amount: String,
    pub start_date: String,
    pub months_left: u32,
    /// Width of the months-left bar, 0..=100
    pub progress_pct: u32,
    pub monthly_payout: String,
}

pub struct DashboardView {
    pub banners: Vec<Banner>,
    pub metrics: Vec<MetricCard>,
    pub rows: Vec<PositionRow>,
    pub issues: Vec<String>,
    pub strategy: String,
    pub cycle_months: u32,
    pub as_of: String,
    pub freshness: String,
}

const SUCCESS: &str = "border-green-700 bg-green-950 text-green-300";
const INFO: &str = "border-blue-700 bg-blue-950 text-blue-300";
const ERROR: &str = "border-red-700 bg-red-950 text-red-300";

impl DashboardView {
    pub fn from_report(report: &Report, freshness: Freshness) -> Self {
        let mut view = Self::empty(report.strategy, report.cycle_months, report.today);
        view.freshness = freshness_label(freshness).to_string();
        view.issues = report.issues.iter().map(ToString::to_string).collect();

        match &report.state {
            DashboardState::NoData => view.banners.push(Banner {
                classes: INFO.to_string(),
                title: "No data in sheet yet.".to_string(),
                detail: "The sheet has a header row but no investor rows.".to_string(),
            }),
            DashboardState::FullySettled { settled_positions } => view.banners.push(Banner {
                classes: SUCCESS.to_string(),
                title: "All investors have been fully paid!".to_string(),
                detail: format!(
                    "{settled_positions} positions completed their {}-month cycle.",
                    report.cycle_months
                ),
            }),
            DashboardState::Active(summary) => {
                view.metrics = metric_cards(summary);
                view.rows = summary
                    .active_positions
                    .iter()
                    .map(|p| position_row(p, report.cycle_months))
                    .collect();
            }
        }
        view
    }

    pub fn from_error(err: &LedgerError, settings: &LedgerSettings, today: NaiveDate) -> Self {
        let mut view = Self::empty(settings.strategy.as_str(), settings.cycle_months, today);
        let (title, detail) = match err {
            LedgerError::SourceUnavailable(reason) => (
                "Could not load the investor sheet.".to_string(),
                reason.clone(),
            ),
            LedgerError::SchemaMismatch { missing, found } => (
                format!("Sheet is missing required columns: {}", missing.join(", ")),
                if found.is_empty() {
                    "No columns were found.".to_string()
                } else {
                    format!("Columns found: {}", found.join(", "))
                },
            ),
            LedgerError::InvalidConfig(reason) => {
                ("Configuration error.".to_string(), reason.clone())
            }
        };
        view.banners.push(Banner {
            classes: ERROR.to_string(),
            title,
            detail,
        });
        view
    }

    fn empty(strategy: &str, cycle_months: u32, today: NaiveDate) -> Self {
        Self {
            banners: Vec::new(),
            metrics: Vec::new(),
            rows: Vec::new(),
            issues: Vec::new(),
            strategy: strategy.to_string(),
            cycle_months,
            as_of: today.format("%d %b %Y").to_string(),
            freshness: String::new(),
        }
    }
}

fn freshness_label(freshness: Freshness) -> &'static str {
    match freshness {
        Freshness::Cached => "cached",
        Freshness::Live => "live",
    }
}

fn metric_cards(summary: &Summary) -> Vec<MetricCard> {
    let (liability_value, liability_note) = match &summary.monthly_liability {
        Liability::Exact { total } => (format_inr(*total), String::new()),
        Liability::Estimated {
            total,
            fallback_rate_pct,
            estimated_positions,
        } => (
            format!("~{}", format_inr(*total)),
            format!(
                "estimated: {estimated_positions} without ROI priced at {}%",
                fallback_rate_pct.normalize()
            ),
        ),
    };

    vec![
        MetricCard {
            label: "Total Active Capital".to_string(),
            value: format_inr(summary.total_active_capital),
            note: String::new(),
        },
        MetricCard {
            label: "Active Investors".to_string(),
            value: summary.active_investor_count.to_string(),
            note: if summary.settled_positions > 0 {
                format!("{} settled", summary.settled_positions)
            } else {
                String::new()
            },
        },
        MetricCard {
            label: "Monthly Liability".to_string(),
            value: liability_value,
            note: liability_note,
        },
    ]
}

fn position_row(p: &Position, cycle_months: u32) -> PositionRow {
    let start_date = match &p.start_date {
        StartDate::Parsed(d) => d.format("%d %b %Y").to_string(),
        StartDate::Invalid(raw) => format!("{raw} (unparsed)"),
        StartDate::Missing => "-".to_string(),
    };
    PositionRow {
        name: p.name.clone(),
        amount: format_inr(p.amount),
        start_date,
        months_left: p.months_remaining,
        progress_pct: progress_pct(p.months_remaining, cycle_months),
        monthly_payout: p.monthly_payout().map_or_else(|| "-".to_string(), format_inr),
    }
}

pub fn progress_pct(months_left: u32, cycle_months: u32) -> u32 {
    if cycle_months == 0 {
        return 0;
    }
    (months_left.min(cycle_months) * 100) / cycle_months
}

/// Rupees with Indian digit grouping: 12345678 -> "₹1,23,45,678".
/// Paise are shown only when non-zero.
pub fn format_inr(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = rounded.abs();
    let whole = abs.trunc();
    let paise = ((abs - whole) * Decimal::ONE_HUNDRED)
        .to_u32()
        .unwrap_or(0);

    let grouped = group_indian(&whole.normalize().to_string());
    if paise == 0 {
        format!("{sign}₹{grouped}")
    } else {
        format!("{sign}₹{grouped}.{paise:02}")
    }
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, last3) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();
    format!("{},{last3}", groups.join(","))
}
