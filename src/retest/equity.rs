//! Retest trades post-processing
//!
//! A finished `WFO_RETEST` run leaves a trades list behind. This splits it
//! into in-sample and out-of-sample halves, folds each into a daily equity
//! progression, and packages both curves in one JSON artifact for the cloud.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};

/// One completed trade from the engine's trades list.
///
/// Engine column layout (26 columns): strategy name, task no, project id,
/// entry date/price, exit date/price, stop price, position, profit, risk,
/// size, symbol, atr, currency conversion, equity, commission, slippage,
/// mae, mfe, run no, test type, is/os date bounds.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub exit_at: NaiveDateTime,
    pub run_number: u32,
    pub symbol: String,
    pub quantity: i64,
    pub price: f64,
    pub commission: f64,
    pub pnl: f64,
    pub test_type: String,
}

const ENGINE_TRADE_COLUMNS: usize = 26;

/// Parses the trades list, dropping the header row and sorting by exit time.
pub fn parse_trades(text: &str) -> Result<Vec<TradeRecord>> {
    let mut trades = Vec::new();
    for (line_no, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < ENGINE_TRADE_COLUMNS {
            return Err(AgentError::Format(format!(
                "trade row {} has {} columns, expected {}",
                line_no + 1,
                cols.len(),
                ENGINE_TRADE_COLUMNS
            )));
        }
        let Some(exit_at) = parse_engine_datetime(cols[5].trim()) else {
            warn!(row = line_no + 1, "unparseable exit date, skipping trade");
            continue;
        };
        trades.push(TradeRecord {
            exit_at,
            run_number: cols[20].trim().parse().unwrap_or(0),
            symbol: cols[12].trim().to_string(),
            quantity: cols[11].trim().parse().unwrap_or(0),
            price: cols[6].trim().parse().unwrap_or(0.0),
            commission: cols[16].trim().parse().unwrap_or(0.0),
            pnl: cols[9].trim().parse().unwrap_or(0.0),
            test_type: cols[21].trim().to_string(),
        });
    }
    trades.sort_by_key(|t| t.exit_at);
    Ok(trades)
}

/// Engine datetimes look like `1/17/2007 16:00:00`, occasionally without a
/// zero-padded month or day.
fn parse_engine_datetime(value: &str) -> Option<NaiveDateTime> {
    for fmt in ["%m/%d/%Y %H:%M:%S", "%-m/%-d/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    None
}

/// Splits trades into IS and OS sets on the engine's own test-type marker.
pub fn split_by_test_type(trades: &[TradeRecord]) -> (Vec<TradeRecord>, Vec<TradeRecord>) {
    let mut is_trades = Vec::new();
    let mut os_trades = Vec::new();
    for trade in trades {
        match trade.test_type.as_str() {
            "IS" => is_trades.push(trade.clone()),
            "OS" => os_trades.push(trade.clone()),
            other => debug!(test_type = other, "trade with unknown test type, skipped"),
        }
    }
    (is_trades, os_trades)
}

/// One combined equity curve over every run of a test type.
#[derive(Debug, Serialize)]
pub struct EquityCurve {
    pub task_type: String,
    pub test_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub run: String,
    pub job_id: String,
    pub start_date: String,
    pub end_date: String,
    pub total_runs: usize,
    pub os_percentage: i64,
    pub profit: String,
    pub max_drawdown: String,
    pub netprofit_drawdown: String,
    pub dates: Vec<String>,
    pub cumulative_pnl: Vec<f64>,
    pub running_peak: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub daily_returns: Vec<f64>,
    pub net_profit: Vec<f64>,
}

/// The final artifact: IS and OS curves keyed `{symbol}-{timeframe}-{IS|OS}`.
#[derive(Debug, Serialize)]
pub struct DualEquityCurves {
    pub equity_curves: BTreeMap<String, EquityCurve>,
}

const INITIAL_CAPITAL: f64 = 100_000.0;

/// Folds a trade set into a daily equity progression with drawdown tracking.
pub fn build_equity_curve(
    trades: &[TradeRecord],
    test_type: &str,
    symbol: &str,
    timeframe: &str,
    job_id: &str,
    total_runs: usize,
    os_percentage: i64,
) -> EquityCurve {
    let mut curve = EquityCurve {
        task_type: "WFO_RETEST".to_string(),
        test_type: test_type.to_string(),
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        run: "Combined".to_string(),
        job_id: job_id.to_string(),
        start_date: String::new(),
        end_date: String::new(),
        total_runs,
        os_percentage,
        profit: "0".to_string(),
        max_drawdown: "0".to_string(),
        netprofit_drawdown: "0".to_string(),
        dates: Vec::new(),
        cumulative_pnl: Vec::new(),
        running_peak: Vec::new(),
        drawdown: Vec::new(),
        daily_returns: Vec::new(),
        net_profit: Vec::new(),
    };
    if trades.is_empty() {
        return curve;
    }

    // net PnL per day, in date order
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for trade in trades {
        *by_date.entry(trade.exit_at.date()).or_insert(0.0) += trade.pnl - trade.commission;
    }

    let mut equity = INITIAL_CAPITAL;
    let mut peak = INITIAL_CAPITAL;
    let mut total_profit = 0.0;
    for (date, day_pnl) in &by_date {
        let prev_equity = curve.cumulative_pnl.last().copied();
        equity += day_pnl;
        total_profit += day_pnl;
        if equity > peak {
            peak = equity;
        }
        let daily_return = match prev_equity {
            Some(prev) if prev > 0.0 => (equity - prev) / prev,
            _ => 0.0,
        };
        curve.dates.push(date.format("%Y-%m-%d").to_string());
        curve.cumulative_pnl.push(equity);
        curve.running_peak.push(peak);
        curve.drawdown.push(equity - peak);
        curve.daily_returns.push(daily_return);
        curve.net_profit.push(*day_pnl);
    }

    curve.start_date = curve.dates.first().cloned().unwrap_or_default();
    curve.end_date = curve.dates.last().cloned().unwrap_or_default();
    curve.profit = format!("{total_profit:.2}");
    let max_dd = curve.drawdown.iter().copied().fold(0.0_f64, f64::min);
    curve.max_drawdown = format!("{max_dd:.2}");
    curve.netprofit_drawdown = if max_dd != 0.0 {
        format!("{:.2}", total_profit / -max_dd)
    } else {
        "0.00".to_string()
    };
    curve
}

/// Builds the dual-curve artifact from a trades list file.
pub fn build_dual_curves(
    trades_path: &Path,
    symbol: &str,
    timeframe: &str,
    job_id: &str,
    total_runs: usize,
    os_percentage: i64,
) -> Result<DualEquityCurves> {
    let text = std::fs::read_to_string(trades_path)?;
    let trades = parse_trades(&text)?;
    let (is_trades, os_trades) = split_by_test_type(&trades);

    let mut curves = BTreeMap::new();
    curves.insert(
        format!("{symbol}-{timeframe}-IS"),
        build_equity_curve(&is_trades, "IS", symbol, timeframe, job_id, total_runs, os_percentage),
    );
    curves.insert(
        format!("{symbol}-{timeframe}-OS"),
        build_equity_curve(&os_trades, "OS", symbol, timeframe, job_id, total_runs, os_percentage),
    );
    Ok(DualEquityCurves { equity_curves: curves })
}
