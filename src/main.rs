use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Arg, Command};
use hive_pulse::api::{ApiGateway, BlockingTransport};
use hive_pulse::config::Config;
use hive_pulse::content::{self, ContentAnalyzer};
use hive_pulse::engine::EligibilityEngine;
use hive_pulse::report;
use log::LevelFilter;
use std::path::Path;
use std::process;
use std::time::Instant;

fn main() {
    let matches = Command::new("hive-pulse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Engagement scoring and community-rule eligibility reports for Hive communities")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("hive-pulse.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("compliance")
                .long("compliance")
                .help("Produce the community-rule compliance report instead of engagement scores")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        if let Err(e) = Config::generate_default(path) {
            eprintln!("Error generating configuration: {e:#}");
            process::exit(1);
        }
        println!("Default configuration written to {path}");
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!(
            "Configuration OK: {} authors, {} endpoints, community {}",
            config.authors.len(),
            config.endpoints.len(),
            config.community
        );
        return;
    }

    let start = Instant::now();
    if let Err(e) = run(&config, matches.get_flag("compliance")) {
        log::error!("run failed: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
    println!("Work completed in {:.2} seconds", start.elapsed().as_secs_f64());
}

fn run(config: &Config, compliance: bool) -> Result<()> {
    let transport =
        BlockingTransport::new(config.timeout_seconds).context("building the HTTP client")?;
    let gateway = ApiGateway::new(config.endpoints.clone(), transport);
    let target = content::parse_language(&config.language)
        .with_context(|| format!("unsupported language code: {}", config.language))?;
    let analyzer = ContentAnalyzer::new(target);
    let engine = EligibilityEngine::new(&gateway, &analyzer, &config.community).with_compliance(
        config.beneficiary.clone(),
        config.polls.iter().cloned().collect(),
    );

    let now = Utc::now().naive_utc();
    let window_start = config.window.start_before(now);

    if compliance {
        let poll_window_start = config.poll_window.start_before(now);
        let report = engine.compliance_report(&config.authors, window_start, poll_window_start)?;
        report::write_compliance(
            &report,
            config.beneficiary.as_deref(),
            Path::new(&config.reports.entries_file),
            Path::new(&config.reports.authors_file),
        )?;
        println!(
            "{} eligible posts from {} compliant authors",
            report.entries.len(),
            report.authors.len()
        );
    } else {
        let results = engine.score_all(&config.authors, window_start)?;
        let ranked = report::rank(results);
        println!("### Results:");
        for result in &ranked {
            println!("{}", result.line);
        }
        if let Some(path) = &config.reports.scores_file {
            report::write_scores(&ranked, Path::new(path))?;
        }
    }
    Ok(())
}
