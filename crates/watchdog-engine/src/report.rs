//! Report Renderer: structured run report and the notification built from it.
//!
//! Both renderings are pure functions of [`RunReport`]; rendering the same
//! report twice yields identical output.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use watchdog_common::{Alert, AlertRisk, AlertType, Result, Severity};

/// `WD-` followed by the capture time down to milliseconds.
pub fn run_id(run_timestamp: DateTime<Utc>) -> String {
    format!("WD-{}", run_timestamp.format("%Y-%m-%d-%H%M%S-%3f"))
}

/// Alert counts by severity. Always derived from the alert set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
}

impl RunSummary {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut summary = Self { total: alerts.len(), ..Self::default() };
        for alert in alerts {
            match alert.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
            }
        }
        summary
    }

    pub fn is_all_clear(&self) -> bool {
        self.total == 0
    }
}

/// Alerts of one type split by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBuckets {
    pub critical: Vec<Alert>,
    pub high: Vec<Alert>,
    pub medium: Vec<Alert>,
}

impl SeverityBuckets {
    fn push(&mut self, alert: Alert) {
        match alert.severity {
            Severity::Critical => self.critical.push(alert),
            Severity::High => self.high.push(alert),
            Severity::Medium => self.medium.push(alert),
        }
    }

    pub fn get(&self, severity: Severity) -> &[Alert] {
        match severity {
            Severity::Critical => &self.critical,
            Severity::High => &self.high,
            Severity::Medium => &self.medium,
        }
    }

    pub fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.medium.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Machine-readable output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_timestamp: DateTime<Utc>,
    pub summary: RunSummary,
    pub expiry_alerts: SeverityBuckets,
    pub shortfall_predictions: SeverityBuckets,
}

impl RunReport {
    pub fn build(run_timestamp: DateTime<Utc>, alerts: &[Alert]) -> Self {
        let mut expiry_alerts = SeverityBuckets::default();
        let mut shortfall_predictions = SeverityBuckets::default();
        for alert in alerts {
            match alert.alert_type() {
                AlertType::Expiry => expiry_alerts.push(alert.clone()),
                AlertType::Shortfall => shortfall_predictions.push(alert.clone()),
            }
        }

        Self {
            run_id: run_id(run_timestamp),
            run_timestamp,
            summary: RunSummary::from_alerts(alerts),
            expiry_alerts,
            shortfall_predictions,
        }
    }

    /// `watchdog_output_<YYYYMMDD_HHMMSS>.json`
    pub fn file_name(&self) -> String {
        format!("watchdog_output_{}.json", self.run_timestamp.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn render_notification(&self) -> Notification {
        Notification { subject: render_subject(&self.summary), body: render_body(self) }
    }
}

/// Rendered subject and HTML body, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

// ── Rendering ────────────────────────────────────────────────────────────────

pub fn render_subject(summary: &RunSummary) -> String {
    if summary.is_all_clear() {
        "Supply Watchdog: All clear".to_string()
    } else {
        format!(
            "Supply Watchdog: {} CRITICAL, {} HIGH, {} MEDIUM",
            summary.critical, summary.high, summary.medium
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn cell(value: Option<&str>) -> String {
    escape_html(value.unwrap_or("-"))
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#c0392b",
        Severity::High => "#e67e22",
        Severity::Medium => "#f1c40f",
    }
}

fn render_row(alert: &Alert) -> String {
    let (what, when, remaining) = match &alert.risk {
        AlertRisk::Expiry { batch_lot, expiry_date, days_until_expiry, .. } => (
            cell(batch_lot.as_deref()),
            expiry_date.to_string(),
            format!("{days_until_expiry} days"),
        ),
        AlertRisk::Shortfall { weekly_consumption_rate, weeks_until_stockout, projected_shortage_date, .. } => (
            format!("{weekly_consumption_rate:.1}/week"),
            projected_shortage_date.to_string(),
            format!("{weeks_until_stockout:.1} weeks"),
        ),
    };
    format!(
        r#"<tr><td style="color:{color};font-weight:700">{severity}</td><td>{trial}</td><td>{location}</td><td>{material}</td><td>{what}</td><td>{qty:.1}</td><td>{when}</td><td>{remaining}</td><td>{action}</td></tr>"#,
        color = severity_color(alert.severity),
        severity = alert.severity,
        trial = cell(alert.trial_alias.as_deref()),
        location = cell(alert.location.as_deref()),
        material = cell(alert.material_description.as_deref()),
        qty = alert.current_quantity,
        action = escape_html(&alert.recommended_action),
    )
}

fn render_section(title: &str, detail_header: &str, date_header: &str, buckets: &SeverityBuckets) -> String {
    if buckets.is_empty() {
        return format!("<h3>{title}</h3>\n<p>None.</p>\n");
    }
    let rows: String = Severity::DESCENDING
        .iter()
        .flat_map(|s| buckets.get(*s))
        .map(|a| render_row(a) + "\n")
        .collect();
    format!(
        "<h3>{title} ({count})</h3>\n<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\n\
         <tr><th>Severity</th><th>Trial</th><th>Location</th><th>Material</th><th>{detail_header}</th>\
         <th>Quantity</th><th>{date_header}</th><th>Remaining</th><th>Recommended action</th></tr>\n\
         {rows}</table>\n",
        count = buckets.len(),
    )
}

fn render_body(report: &RunReport) -> String {
    let header = format!(
        "<h2>Clinical Supply Watchdog</h2>\n<p>Run {} at {}</p>\n",
        escape_html(&report.run_id),
        report.run_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if report.summary.is_all_clear() {
        return format!(
            "<html><body>\n{header}<p style=\"color:#27ae60;font-weight:700\">All clear: \
             no batches expiring within the horizon and no projected stockouts.</p>\n</body></html>\n"
        );
    }

    let s = &report.summary;
    format!(
        "<html><body>\n{header}<p><b>{total}</b> alerts: \
         <span style=\"color:{c}\">{critical} CRITICAL</span>, \
         <span style=\"color:{h}\">{high} HIGH</span>, \
         <span style=\"color:{m}\">{medium} MEDIUM</span></p>\n{expiry}{shortfall}</body></html>\n",
        total = s.total,
        critical = s.critical,
        high = s.high,
        medium = s.medium,
        c = severity_color(Severity::Critical),
        h = severity_color(Severity::High),
        m = severity_color(Severity::Medium),
        expiry = render_section("Expiring batches", "Batch", "Expiry date", &report.expiry_alerts),
        shortfall = render_section("Projected shortfalls", "Consumption", "Shortage date", &report.shortfall_predictions),
    )
}
