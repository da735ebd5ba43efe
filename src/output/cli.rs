use crate::model::{truncate, AggregatedResult, Finding, Severity};
use crate::policy::Decision;
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ThreatRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Type")]
    finding_type: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct CveRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Fix")]
    fix: String,
}

#[derive(Tabled)]
struct OtherRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Type")]
    finding_type: String,
    #[tabled(rename = "Title")]
    title: String,
}

pub fn print_cli_table(result: &AggregatedResult) -> Result<()> {
    println!();
    println!(
        "Scanned {} packages in {}ms",
        result.total_packages,
        result.duration.as_millis()
    );

    if result.total_findings == 0 {
        println!("No security issues found.");
        return Ok(());
    }

    println!();
    println!("Found {} issue(s):", result.total_findings);

    let threats = result.malware_findings();
    if !threats.is_empty() {
        println!();
        println!("Malware / supply chain threats:");
        println!("{}", threat_table(&threats));
    }

    let cves = result.cve_findings();
    if !cves.is_empty() {
        println!();
        println!("Vulnerabilities (CVEs):");
        println!("{}", cve_table(&cves));
    }

    let other = result.other_findings();
    if !other.is_empty() {
        println!();
        println!("Other issues:");
        println!("{}", other_table(&other));
    }

    println!();
    print_summary(result);

    Ok(())
}

/// Prints policy warnings and block reasons to stderr.
pub fn print_decision(decision: &Decision) {
    for warning in decision.warnings() {
        eprintln!("\x1b[33mwarning:\x1b[0m {}", warning);
    }
    for reason in decision.reasons() {
        eprintln!("\x1b[31mblocked:\x1b[0m {}", reason);
    }
}

fn threat_table(findings: &[&Finding]) -> String {
    let rows: Vec<ThreatRow> = findings
        .iter()
        .map(|f| ThreatRow {
            severity: format_severity(f.severity),
            package: f.package_ref(),
            finding_type: f.finding_type.to_string(),
            description: truncate(non_empty(&f.description, &f.title), 60),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn cve_table(findings: &[&Finding]) -> String {
    let rows: Vec<CveRow> = findings
        .iter()
        .map(|f| CveRow {
            severity: format_severity(f.severity),
            package: f.package_ref(),
            id: f.id.clone().unwrap_or_else(|| "-".to_string()),
            title: truncate(&f.title, 50),
            fix: f.remediation.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn other_table(findings: &[&Finding]) -> String {
    let rows: Vec<OtherRow> = findings
        .iter()
        .map(|f| OtherRow {
            severity: format_severity(f.severity),
            package: f.package_ref(),
            finding_type: f.finding_type.to_string(),
            title: truncate(&f.title, 50),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn non_empty<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

pub fn format_severity(severity: Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Info => "INFO".to_string(),
    }
}

fn print_summary(result: &AggregatedResult) {
    println!("Summary:");
    println!("  Total packages: {}", result.total_packages);

    let malware = result.malware_count();
    if malware > 0 {
        println!("  Malware/supply chain: {}", malware);
    }

    println!(
        "  Findings: {} critical, {} high, {} medium, {} low",
        result.count_by_severity(Severity::Critical),
        result.count_by_severity(Severity::High),
        result.count_by_severity(Severity::Medium),
        result.count_by_severity(Severity::Low),
    );

    let sources: Vec<&str> = result.results.iter().map(|r| r.scanner.as_str()).collect();
    if !sources.is_empty() {
        println!("  Sources: {}", sources.join(", "));
    }
}
