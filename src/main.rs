/// `Logtriage` - log error triage from the command line
///
/// Copyright (C) 2026 Logtriage Authors
///
/// This program is free software: you can redistribute it and/or modify
/// it under the terms of the GNU General Public License as published by
/// the Free Software Foundation, either version 3 of the License, or
/// (at your option) any later version.
///
/// This program is distributed in the hope that it will be useful,
/// but WITHOUT ANY WARRANTY; without even the implied warranty of
/// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
/// GNU General Public License for more details.
///
/// You should have received a copy of the GNU General Public License
/// along with this program.  If not, see <https://www.gnu.org/licenses/>.
use anyhow::Context;
use clap::{Parser, ValueEnum};
use logtriage::config::GlobalConfig;
use logtriage::discovery::DiscoveryOptions;
use logtriage::reason::{HttpReasoner, Reasoner};
use logtriage::session::{ReviewMode, Selection, Session, SessionOptions};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Log-only review: extract, classify, explain
    Basic,
    /// Correlate with source files and propose fixes
    Deep,
}

#[derive(Parser, Debug)]
#[command(name = "logtriage")]
#[command(author = "Logtriage Authors")]
#[command(version)]
#[command(about = "Triage application logs: extract errors, group them into patterns, anchor fixes", long_about = None)]
struct Args {
    /// Directory to search for log files
    #[arg(value_name = "DIR", default_value = ".")]
    directory: PathBuf,

    /// Maximum recursion depth below the root directory
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Log file extensions to consider (comma-separated)
    #[arg(short, long, value_name = "EXTS", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Only keep files whose content matches this pattern
    #[arg(short, long, value_name = "PATTERN")]
    grep: Option<String>,

    /// Drop candidate files whose head has no log-shaped content
    #[arg(long)]
    sniff: bool,

    /// Review mode
    #[arg(short, long, value_enum, default_value_t = Mode::Basic)]
    mode: Mode,

    /// Which listed files to analyze: "all" or comma-separated 1-based indices
    #[arg(short, long, value_name = "SEL", default_value = "all")]
    select: String,

    /// Root directory for resolving source files named in tracebacks
    #[arg(long, value_name = "DIR")]
    source_root: Option<PathBuf>,

    /// Write the full JSON report to this path
    #[arg(short, long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// List discovered log files and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logger with millisecond precision timestamps
    // Set RUST_LOG environment variable to override (e.g., RUST_LOG=debug)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!(
        "Logtriage starting up (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();
    let config = GlobalConfig::load();

    let discovery = DiscoveryOptions {
        max_depth: args.max_depth.unwrap_or(config.max_depth),
        extensions: if args.extensions.is_empty() {
            config.extensions.clone()
        } else {
            args.extensions.clone()
        },
        grep: args.grep.clone(),
        sniff_content: args.sniff || config.sniff_content,
    };

    let source_root = args
        .source_root
        .clone()
        .or_else(|| config.source_root.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let options = SessionOptions {
        root: args.directory.clone(),
        discovery,
        mode: match args.mode {
            Mode::Basic => ReviewMode::Basic,
            Mode::Deep => ReviewMode::Deep,
        },
        context_lines: config.context_lines,
        source_root,
    };

    let reasoner: Option<Box<dyn Reasoner>> = match &config.reasoning_endpoint {
        Some(endpoint) => {
            let reasoner = HttpReasoner::new(endpoint.clone(), config.reasoning_timeout())
                .with_context(|| format!("cannot set up reasoning client for {endpoint}"))?;
            Some(Box::new(reasoner))
        }
        None => {
            log::info!("no reasoning endpoint configured, explanations disabled");
            None
        }
    };

    let session = Session::new(options, reasoner);

    let listing = session.list_files()?;
    if listing.files.is_empty() {
        println!("No log files found under {}", args.directory.display());
        return Ok(());
    }

    println!("Found {} log file(s):", listing.files.len());
    for (index, file) in listing.files.iter().enumerate() {
        println!(
            "  {:>3}  {:>10}  {}",
            index + 1,
            format_size(file.descriptor.size_bytes),
            file.descriptor.path.display()
        );
    }
    if args.list {
        return Ok(());
    }

    let selection = parse_selection(&args.select)?;
    let report = session.analyze(&listing, &selection)?;

    for (rank, finding) in report.findings.iter().enumerate() {
        let key = &finding.pattern.key;
        let error_type = if key.error_type.is_empty() {
            "(untyped)"
        } else {
            key.error_type.as_str()
        };
        println!("\n#{} {} ({}x)", rank + 1, error_type, finding.occurrences);
        println!("    {}", finding.pattern.representative.error_message);
        if let (Some(file), Some(line)) = (
            &finding.pattern.representative.origin_file,
            finding.pattern.representative.origin_line,
        ) {
            println!("    at {}:{line}", file.display());
        }
        if let Some(explanation) = &finding.explanation {
            println!("    {explanation}");
        }
        if let Some(patch) = &finding.proposed_fix {
            println!("\n{}", patch.unified_diff());
        }
    }

    let summary = &report.summary;
    println!(
        "\n{} file(s) analyzed, {} failed, {} discovery warning(s)",
        summary.files_parsed, summary.files_failed, summary.discovery_warnings
    );
    println!(
        "{} entries ({} malformed skipped), {} error record(s) (high {}, medium {}, low {}), {} pattern(s)",
        summary.entries,
        summary.malformed_entries,
        summary.records_total(),
        summary.records_high,
        summary.records_medium,
        summary.records_low,
        summary.patterns
    );
    if summary.explanations_unavailable > 0 {
        println!(
            "{} explanation(s) unavailable (reasoning service)",
            summary.explanations_unavailable
        );
    }
    if summary.fixes_proposed > 0 {
        println!("{} fix(es) proposed for review", summary.fixes_proposed);
    }

    if let Some(path) = &args.report {
        Session::write_report(&report, path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn parse_selection(raw: &str) -> anyhow::Result<Selection> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(Selection::All);
    }
    let indices = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid selection index '{part}'"))
        })
        .collect::<anyhow::Result<Vec<usize>>>()?;
    Ok(Selection::Indices(indices))
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
