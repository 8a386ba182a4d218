use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use ledger::aggregation::Liability;
use ledger::pipeline::{DashboardState, Report};

const USAGE: &str = "usage: ledger [summary|positions|columns] [--csv <path>] [--json]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Summary,
    Positions,
    Columns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub view: View,
    /// Read this file instead of fetching the configured sheet.
    pub csv_path: Option<PathBuf>,
    pub json: bool,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Invocation, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let mut invocation = Invocation {
        view: View::Summary,
        csv_path: None,
        json: false,
    };
    let mut view_set = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" => {
                let path = args
                    .next()
                    .ok_or_else(|| format!("--csv needs a path\n{USAGE}"))?;
                invocation.csv_path = Some(PathBuf::from(path));
            }
            "--json" => invocation.json = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            cmd if !view_set && !cmd.starts_with('-') => {
                invocation.view = match cmd {
                    "summary" => View::Summary,
                    "positions" => View::Positions,
                    "columns" => View::Columns,
                    other => return Err(format!("unknown command: {other}\n{USAGE}")),
                };
                view_set = true;
            }
            other => return Err(format!("unexpected argument: {other}\n{USAGE}")),
        }
    }

    Ok(invocation)
}

pub fn render(report: &Report, invocation: &Invocation) -> Result<String> {
    if invocation.json {
        let mut out = serde_json::to_string_pretty(report)?;
        out.push('\n');
        return Ok(out);
    }
    let mut out = String::new();
    match invocation.view {
        View::Summary => render_summary(&mut out, report)?,
        View::Positions => render_positions(&mut out, report)?,
        View::Columns => render_columns(&mut out, report)?,
    }
    Ok(out)
}

fn render_summary(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(
        out,
        "Payout ledger (strategy={}, cycle={} months, as of {})",
        report.strategy, report.cycle_months, report.today
    )?;

    match &report.state {
        DashboardState::NoData => writeln!(out, "No data in sheet yet.")?,
        DashboardState::FullySettled { settled_positions } => writeln!(
            out,
            "All investors have been fully paid ({settled_positions} positions settled)."
        )?,
        DashboardState::Active(summary) => {
            writeln!(out, "Total active capital: {}", summary.total_active_capital)?;
            writeln!(out, "Active investors:     {}", summary.active_investor_count)?;
            match &summary.monthly_liability {
                Liability::Exact { total } => writeln!(out, "Monthly liability:    {total}")?,
                Liability::Estimated {
                    total,
                    fallback_rate_pct,
                    estimated_positions,
                } => writeln!(
                    out,
                    "Monthly liability:    ~{total} (estimated at {fallback_rate_pct}% for {estimated_positions} positions without ROI)"
                )?,
            }
            writeln!(out)?;
            writeln!(
                out,
                "{:<24} {:>12} {:>10} {:>11} {:>10}",
                "Name", "Amount", "Start", "Months Left", "Monthly"
            )?;
            for row in summary.table_rows() {
                let start = row
                    .start_date
                    .map_or_else(|| "-".to_string(), |d| d.format("%d/%m/%Y").to_string());
                let payout = row
                    .monthly_payout
                    .map_or_else(|| "-".to_string(), |p| p.to_string());
                writeln!(
                    out,
                    "{:<24} {:>12} {:>10} {:>11} {:>10}",
                    row.name, row.amount, start, row.months_left, payout
                )?;
            }
        }
    }

    render_issues(out, report)
}

fn render_positions(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "{} positions:", report.positions.len())?;
    for p in &report.positions {
        let status = if p.is_active() { "active" } else { "settled" };
        writeln!(
            out,
            "row {:>4}  {:<24} {:>12}  elapsed={:>2}  remaining={:>2}  {status}",
            p.row, p.name, p.amount, p.months_elapsed, p.months_remaining
        )?;
    }
    render_issues(out, report)
}

fn render_columns(out: &mut String, report: &Report) -> std::fmt::Result {
    for b in report.columns.bindings() {
        let how = if b.by_position { ", by position" } else { "" };
        writeln!(
            out,
            "{:<10} <- {:?} (column {}{how})",
            b.column.label(),
            b.header,
            b.index + 1
        )?;
    }
    writeln!(out, "found: {}", report.columns.found().join(", "))
}

fn render_issues(out: &mut String, report: &Report) -> std::fmt::Result {
    if report.issues.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{} rows flagged:", report.issues.len())?;
    for issue in &report.issues {
        writeln!(out, "  {issue}")?;
    }
    Ok(())
}
