use crate::config::{Settings, TRADE_FILE_NAME};
use crate::data::WeightTable;
use crate::portfolio::{self, DriftTier, SnapshotAnalysis, TradePlan, TradeSuggestion};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

pub const NO_BUY_TEXT: &str = "No Buy suggestions.";
pub const NO_SELL_TEXT: &str = "No Sell suggestions.";

// ──────────────────────────────────────────────────────────────────────────────
// Number Formatting
// ──────────────────────────────────────────────────────────────────────────────

/// `0.1234 -> "12.34%"`
pub fn format_pct(x: f64) -> String {
    format!("{:.2}%", x * 100.0)
}

/// Inserts `,` between thousands groups of a plain digit string.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Fixed-point with thousands separators: `1234567.891, 2 -> "1,234,567.89"`.
pub fn format_grouped(x: f64, decimals: usize) -> String {
    let raw = format!("{:.*}", decimals, x.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };
    let mut out = String::new();
    // "-0.00" style output is printed without the sign.
    if x < 0.0 && raw.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// `1234.5 -> "$1,234.50"`, `-1234.5 -> "-$1,234.50"`.
pub fn format_money(x: f64) -> String {
    let grouped = format_grouped(x, 2);
    match grouped.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", grouped),
    }
}

/// Whole-dollar form used for the headline portfolio value.
pub fn format_money_whole(x: f64) -> String {
    let grouped = format_grouped(x, 0);
    match grouped.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", grouped),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ──────────────────────────────────────────────────────────────────────────────
// Trade Text
// ──────────────────────────────────────────────────────────────────────────────

/// `"Sell $1,000.00 AAA"`
pub fn trade_line(s: &TradeSuggestion) -> String {
    format!("{} {} {}", s.action.as_str(), format_money(s.amount), s.ticker)
}

pub fn buy_text(plan: &TradePlan) -> String {
    block_text(&plan.buys, NO_BUY_TEXT)
}

pub fn sell_text(plan: &TradePlan) -> String {
    block_text(&plan.sells, NO_SELL_TEXT)
}

fn block_text(items: &[TradeSuggestion], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.iter().map(trade_line).collect::<Vec<_>>().join("\n")
    }
}

/// Contents of the downloadable trade list, Buy lines first. `None` when there
/// is nothing to trade.
pub fn trade_file_text(plan: &TradePlan) -> Option<String> {
    if plan.is_empty() {
        return None;
    }
    Some(plan.iter().map(trade_line).collect::<Vec<_>>().join("\n"))
}

/// Writes the trade list into `dir` under the standard file name. Returns the
/// path written, or `None` if the plan is empty.
pub fn export_trades(plan: &TradePlan, dir: &Path) -> Result<Option<PathBuf>> {
    let Some(text) = trade_file_text(plan) else {
        info!("No trade suggestions; nothing exported");
        return Ok(None);
    };
    let path = dir.join(TRADE_FILE_NAME);
    export_trades_to(&text, &path)?;
    Ok(Some(path))
}

pub fn export_trades_to(text: &str, path: &Path) -> Result<()> {
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write trade suggestions to {}", path.display()))?;
    info!("Trade suggestions written to {}", path.display());
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// Headless Report
// ──────────────────────────────────────────────────────────────────────────────

pub fn summary_lines(
    date: NaiveDate,
    analysis: &SnapshotAnalysis,
    portfolio_value: f64,
    rebalance_threshold: f64,
) -> Vec<(String, String)> {
    let cash = portfolio::cash_weight(&analysis.current)
        .map(format_pct)
        .unwrap_or_else(|| "—".to_string());
    let rebalance = if analysis.needs_rebalance(rebalance_threshold) {
        "Yes"
    } else {
        "No"
    };
    vec![
        ("Date".to_string(), format_date(date)),
        ("Portfolio Value".to_string(), format_money_whole(portfolio_value)),
        ("Cash %".to_string(), cash),
        ("Needs Rebalance".to_string(), rebalance.to_string()),
    ]
}

/// Prints every dashboard section for one date to stdout.
pub fn print_report(table: &WeightTable, date: NaiveDate, settings: &Settings) -> Result<()> {
    let snapshot = table
        .snapshot_on(date)
        .with_context(|| format!("No snapshot for {}", format_date(date)))?;
    let analysis = SnapshotAnalysis::new(snapshot);

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║                   Portfolio Dashboard                      ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    for (label, value) in summary_lines(
        date,
        &analysis,
        settings.portfolio_value,
        settings.rebalance_threshold,
    ) {
        println!("║  {:<18}: {:<37} ║", label, value);
    }

    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Ticker     Current%  Target%   Drift%            $        ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    for row in portfolio::allocation_table(&analysis, settings.portfolio_value) {
        println!(
            "║  {:<9} {:>8}  {:>8}  {:>8}  {:>16}   ║",
            row.ticker,
            format_pct(row.current_pct),
            format_pct(row.target_pct),
            format_pct(row.drift_pct),
            format_grouped(row.dollars, 2),
        );
    }

    println!("╠════════════════════════════════════════════════════════════╣");
    println!(
        "║  Drift Monitor (band ±{:<6})                               ║",
        format_pct(settings.drift_band)
    );
    for bar in portfolio::drift_bars(&analysis.drift, settings.drift_band) {
        println!(
            "║    {:<9} {:>8}  {:<36}║",
            bar.ticker,
            format_pct(bar.drift),
            bar.tier.label()
        );
    }

    let plan = analysis.trades(settings.drift_band, settings.portfolio_value);
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Trade Suggestions                                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!("Buy:\n{}", buy_text(&plan));
    println!("Sell:\n{}", sell_text(&plan));
    println!();
    println!("⚠  Illustrative rebalancing only. No orders are placed.");

    Ok(())
}

/// Counts per tier, legend order.
pub fn tier_counts(analysis: &SnapshotAnalysis, band: f64) -> Vec<(DriftTier, usize)> {
    let bars = portfolio::drift_bars(&analysis.drift, band);
    DriftTier::ALL
        .iter()
        .map(|tier| (*tier, bars.iter().filter(|b| b.tier == *tier).count()))
        .collect()
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────
