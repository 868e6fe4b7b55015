use colored::Colorize;

use crate::{
    catalog::Catalog,
    query::{SqlDialect, ensure_read_only},
    report::{CheckOutcome, RunReport}
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Format a run report based on output options
pub fn format_run_report(report: &RunReport, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Text => format_text_report(report, opts)
    }
}

fn paint(label: &str, outcome: CheckOutcome, colored: bool) -> String {
    if !colored {
        return label.to_string();
    }
    match outcome {
        CheckOutcome::Notified => label.yellow().bold().to_string(),
        CheckOutcome::Capped => label.yellow().to_string(),
        CheckOutcome::NoFinding | CheckOutcome::Noise => label.green().to_string(),
        CheckOutcome::SuppressedDuplicate => label.dimmed().to_string(),
        CheckOutcome::DeliveryFailed | CheckOutcome::Failed(_) | CheckOutcome::TimedOut => {
            label.red().bold().to_string()
        }
    }
}

fn format_text_report(report: &RunReport, opts: &OutputOptions) -> String {
    let mut output = String::new();
    let header = format!("=== Run {} ===", report.run_id);
    if opts.colored {
        output.push_str(&header.bold().to_string());
    } else {
        output.push_str(&header);
    }
    output.push_str("\n\n");

    let width = report
        .outcomes
        .iter()
        .map(|r| r.check.len())
        .max()
        .unwrap_or(0);
    for check in &report.outcomes {
        let label = format!("[{}]", check.outcome);
        output.push_str(&format!(
            "{:<width$}  {}",
            check.check,
            paint(&label, check.outcome, opts.colored),
            width = width
        ));
        if let Some(finding) = &check.finding {
            output.push_str(&format!(
                "  {} {}: {}",
                finding.severity, finding.category, finding.title
            ));
        }
        if let Some(error) = &check.error {
            output.push_str(&format!("  {}: {}", error.kind, error.message));
        }
        if let Some(fallback) = &check.classification_error
            && check.error.as_ref() != Some(fallback)
        {
            output.push_str(&format!("  {}: {}", fallback.kind, fallback.message));
        }
        output.push('\n');

        if opts.verbose {
            if let Some(sql) = &check.sql {
                for line in sql.lines() {
                    output.push_str(&format!("    {}\n", line));
                }
            }
            let mut details = vec![
                format!("attempts: {}", check.attempts),
                format!("{} ms", check.duration_ms)
            ];
            if let Some(rows) = check.row_count {
                details.push(format!("rows: {}", rows));
            }
            if let Some(model) = &check.model {
                details.push(format!("model: {}", model));
            }
            output.push_str(&format!("    {}\n", details.join(", ")));
        }
    }

    output.push('\n');
    let counts: Vec<String> = report
        .counts
        .iter()
        .map(|(label, n)| format!("{} {}", n, label))
        .collect();
    output.push_str(&format!(
        "{} check(s) in {} ms: {}\n",
        report.outcomes.len(),
        report.duration_ms,
        if counts.is_empty() {
            String::from("nothing to run")
        } else {
            counts.join(", ")
        }
    ));
    output
}

/// Format the catalog listing shown by the `checks` command
pub fn format_catalog(catalog: &Catalog, dialect: SqlDialect, opts: &OutputOptions) -> String {
    let mut output = String::new();
    for check in catalog.checks() {
        let name = if opts.colored {
            check.name.cyan().bold().to_string()
        } else {
            check.name.clone()
        };
        output.push_str(&name);
        if !check.enabled {
            output.push_str(" (disabled)");
        }
        if let Some(schedule) = &check.schedule {
            output.push_str(&format!(" [{}]", schedule));
        }
        output.push('\n');
        if !check.description.is_empty() {
            output.push_str(&format!("  {}\n", check.description.trim()));
        }
        if let Some(sql) = &check.sql {
            match ensure_read_only(sql, dialect) {
                Ok(_) => output.push_str("  inline SQL: valid\n"),
                Err(e) => output.push_str(&format!("  inline SQL: {}\n", e))
            }
        }
        if opts.verbose {
            for (category, severity) in &check.severity {
                output.push_str(&format!("  severity {}: {}\n", category, severity));
            }
        }
    }
    output.push_str(&format!("\n{} check(s)\n", catalog.len()));
    output
}
