//! Pure summary of reconciled positions for the presentation layer.

use chrono::NaiveDate;
use common::types::Position;
use rust_decimal::Decimal;
use serde::Serialize;

/// Monthly amount owed to active investors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum Liability {
    /// Every active position carried an ROI.
    Exact { total: Decimal },
    /// Positions without an ROI were priced at `fallback_rate_pct`.
    Estimated {
        total: Decimal,
        fallback_rate_pct: Decimal,
        estimated_positions: usize,
    },
}

impl Liability {
    pub fn total(&self) -> Decimal {
        match self {
            Self::Exact { total } | Self::Estimated { total, .. } => *total,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated { .. })
    }
}

/// One line of the dashboard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub name: String,
    pub amount: Decimal,
    pub start_date: Option<NaiveDate>,
    pub months_left: u32,
    pub monthly_payout: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub active_positions: Vec<Position>,
    pub total_active_capital: Decimal,
    pub active_investor_count: usize,
    pub monthly_liability: Liability,
    /// Positions that reached zero months remaining.
    pub settled_positions: usize,
}

impl Summary {
    pub fn table_rows(&self) -> Vec<TableRow> {
        self.active_positions
            .iter()
            .map(|p| TableRow {
                name: p.name.clone(),
                amount: p.amount,
                start_date: p.start_date.date(),
                months_left: p.months_remaining,
                monthly_payout: p.monthly_payout(),
            })
            .collect()
    }
}

/// Either something is still owed, or every position ran out its cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    FullySettled { settled_positions: usize },
    Active(Summary),
}

pub fn summarize(positions: Vec<Position>, fallback_rate_pct: Decimal) -> Settlement {
    let total = positions.len();
    let active_positions: Vec<Position> = positions.into_iter().filter(Position::is_active).collect();
    let settled_positions = total - active_positions.len();

    if active_positions.is_empty() {
        return Settlement::FullySettled { settled_positions };
    }

    let total_active_capital = active_positions
        .iter()
        .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.amount));
    let monthly_liability = monthly_liability(&active_positions, fallback_rate_pct);

    Settlement::Active(Summary {
        active_investor_count: active_positions.len(),
        active_positions,
        total_active_capital,
        monthly_liability,
        settled_positions,
    })
}

fn monthly_liability(active: &[Position], fallback_rate_pct: Decimal) -> Liability {
    let mut total = Decimal::ZERO;
    let mut estimated_positions = 0_usize;
    for p in active {
        // Ingestion caps amounts; saturate anyway rather than panic.
        if let Some(exact) = p.monthly_payout() {
            total = total.saturating_add(exact);
        } else {
            let estimate = p.amount.saturating_mul(fallback_rate_pct) / Decimal::ONE_HUNDRED;
            total = total.saturating_add(estimate);
            estimated_positions += 1;
        }
    }
    let total = total.normalize();

    if estimated_positions == 0 {
        Liability::Exact { total }
    } else {
        Liability::Estimated {
            total,
            fallback_rate_pct,
            estimated_positions,
        }
    }
}
