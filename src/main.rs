// 🔌 eeprom-reconcile CLI
// seed → classify → reconcile, plus list/rules helpers.
// Exit status: 0 clean, 2 mismatches found, 1 fatal error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};

use eeprom_reconcile::products::unique_part_numbers;
use eeprom_reconcile::{
    load_product_lists, load_research_table, save_research_table, seed_research_table,
    CategoryClassifier, ClassificationEngine, Config, IdentifierParser, PartRecord,
    ReconciliationEngine, ReconciliationReport, ReportFormat,
};

#[derive(Debug, Parser)]
#[command(
    name = "eeprom-reconcile",
    version,
    about = "Classify STM32 L0/L1 EEPROM layouts and reconcile them across sources"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Vendor prefix of part numbers (overrides the config)
    #[arg(long, global = true, value_name = "PREFIX")]
    vendor_prefix: Option<String>,

    /// Research table CSV (overrides the config)
    #[arg(long, global = true, value_name = "PATH")]
    table: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Append new L0/L1 parts with EEPROM from the product lists to the research table
    Seed {
        /// Glob matching the product list exports
        #[arg(long, value_name = "GLOB")]
        products: Option<String>,
    },

    /// Fill category and EEPROM layout columns of the research table
    Classify {
        /// Custom rule table (JSON)
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,

        /// Classify without rewriting the table
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the research table against product lists and descriptor files
    Reconcile {
        /// Glob matching the product list exports
        #[arg(long, value_name = "GLOB")]
        products: Option<String>,

        /// Skip the product list comparison
        #[arg(long)]
        skip_products: bool,

        /// Directory of original descriptor files
        #[arg(long, value_name = "DIR", requires = "updated")]
        original: Option<PathBuf>,

        /// Directory of updated descriptor files
        #[arg(long, value_name = "DIR", requires = "original")]
        updated: Option<PathBuf>,

        /// Write the report here instead of stdout
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Report format: text or json
        #[arg(long, value_name = "FORMAT")]
        format: Option<ReportFormat>,
    },

    /// Print the unique part numbers of the product lists (or research table)
    List {
        /// Glob matching the product list exports
        #[arg(long, value_name = "GLOB")]
        products: Option<String>,

        /// List the research table instead
        #[arg(long)]
        from_table: bool,
    },

    /// Print the category rule table in use
    Rules {
        /// Custom rule table (JSON)
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: u8) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("eeprom_reconcile={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Config file, then CLI overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(prefix) = &cli.vendor_prefix {
        config = config.with_vendor_prefix(prefix.clone());
    }
    if let Some(table) = &cli.table {
        config = config.with_research_table(table.clone());
    }
    match &cli.command {
        Command::Seed { products: Some(glob) }
        | Command::List { products: Some(glob), .. }
        | Command::Reconcile { products: Some(glob), .. } => {
            config = config.with_product_list_glob(glob.clone());
        }
        _ => {}
    }
    match &cli.command {
        Command::Classify { rules: Some(path), .. } | Command::Rules { rules: Some(path) } => {
            config = config.with_rules_file(path.clone());
        }
        _ => {}
    }
    if let Command::Reconcile {
        original: Some(original),
        updated: Some(updated),
        ..
    } = &cli.command
    {
        config = config.with_descriptor_dirs(original.clone(), updated.clone());
    }
    if let Command::Reconcile { format: Some(format), .. } = &cli.command {
        config = config.with_report_format(*format);
    }

    config.validate().context("Invalid configuration")?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Seed { .. } => run_seed(&config),
        Command::Classify { dry_run, .. } => run_classify(&config, *dry_run),
        Command::Reconcile {
            skip_products,
            report,
            ..
        } => run_reconcile(&config, *skip_products, report.as_deref()),
        Command::List { from_table, .. } => run_list(&config, *from_table),
        Command::Rules { .. } => run_rules(&config),
    }
}

fn load_classifier(config: &Config) -> Result<CategoryClassifier> {
    let classifier = match &config.rules_file {
        Some(path) => CategoryClassifier::from_file(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?,
        None => CategoryClassifier::builtin().context("Embedded rule table is invalid")?,
    };
    Ok(classifier)
}

fn load_table(config: &Config) -> Result<Vec<PartRecord>> {
    let path = &config.research_table;
    load_research_table(path)
        .with_context(|| format!("Failed to load research table {}", path.display()))
}

/// Existing table, or an empty one when the file does not exist yet
fn load_table_or_empty(path: &Path) -> Result<Vec<PartRecord>> {
    if path.exists() {
        Ok(load_research_table(path)
            .with_context(|| format!("Failed to load research table {}", path.display()))?)
    } else {
        info!(file = %path.display(), "research table does not exist yet, starting empty");
        Ok(Vec::new())
    }
}

fn run_seed(config: &Config) -> Result<i32> {
    let parser = IdentifierParser::with_vendor_prefix(config.vendor_prefix.clone());
    let products = load_product_lists(&config.product_list_glob)
        .context("Failed to load product lists")?;
    let mut records = load_table_or_empty(&config.research_table)?;

    let summary = seed_research_table(&mut records, &products, &parser);
    save_research_table(&config.research_table, &records)
        .with_context(|| format!("Failed to write {}", config.research_table.display()))?;

    println!("🌱 Seeded {}", config.research_table.display());
    println!("   added:           {}", summary.added);
    println!("   already present: {}", summary.already_present);
    println!("   out of series:   {}", summary.out_of_series);
    println!("   without EEPROM:  {}", summary.without_eeprom);
    Ok(0)
}

fn run_classify(config: &Config, dry_run: bool) -> Result<i32> {
    let engine = ClassificationEngine::new(
        IdentifierParser::with_vendor_prefix(config.vendor_prefix.clone()),
        load_classifier(config)?,
    );
    let mut records = load_table(config)?;

    let summary = engine.classify_table(&mut records);

    if dry_run {
        info!("dry run, research table left unchanged");
    } else {
        save_research_table(&config.research_table, &records)
            .with_context(|| format!("Failed to write {}", config.research_table.display()))?;
    }

    println!("🏷️  {}", summary.summary());
    for (category, count) in &summary.by_category {
        println!("   {:<32} {}", category, count);
    }
    for (part, reason) in &summary.failures {
        println!("   UNCLASSIFIED {}: {}", part, reason);
    }
    Ok(0)
}

fn run_reconcile(config: &Config, skip_products: bool, report_path: Option<&Path>) -> Result<i32> {
    let engine = ReconciliationEngine::with_parser(IdentifierParser::with_vendor_prefix(
        config.vendor_prefix.clone(),
    ));
    let table = load_table(config)?;

    let mut report = ReconciliationReport::new();

    if !skip_products {
        let products = load_product_lists(&config.product_list_glob)
            .context("Failed to load product lists")?;
        report.add_check("product_list", engine.compare_products(&table, &products));
    }

    report.add_check("table", engine.check_table(&table));

    let descriptor_dirs = (&config.original_descriptors, &config.updated_descriptors);
    if let (Some(original), Some(updated)) = descriptor_dirs {
        let found = engine
            .compare_descriptor_dirs(original, updated, &table)
            .context("Failed to compare descriptor directories")?;
        report.add_check("descriptors", found);
    }

    let rendered = report
        .render(config.report_format)
        .context("Failed to render report")?;

    match report_path {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            info!(file = %path.display(), "report written");
            eprintln!("{}", report.summary());
        }
        None => print!("{}", rendered),
    }

    Ok(report.exit_code())
}

fn run_list(config: &Config, from_table: bool) -> Result<i32> {
    let parts = if from_table {
        let records = load_table(config)?;
        unique_part_numbers(records.iter().map(|r| r.key()))
    } else {
        let products = load_product_lists(&config.product_list_glob)
            .context("Failed to load product lists")?;
        unique_part_numbers(products.iter().map(|p| p.key()))
    };

    for part in &parts {
        println!("{}", part);
    }
    info!(parts = parts.len(), "listed part numbers");
    Ok(0)
}

fn run_rules(config: &Config) -> Result<i32> {
    let classifier = load_classifier(config)?;

    println!(
        "📐 {} rules in {} families",
        classifier.rule_count(),
        classifier.families().count()
    );
    for family in classifier.families() {
        println!("\n{} (EEPROM base {})", family.family, family.eeprom_base);
        for rule in &family.rules {
            let flash = match &rule.flash_kb {
                Some(sizes) => sizes
                    .iter()
                    .map(|s| format!("{}K", s))
                    .collect::<Vec<_>>()
                    .join("/"),
                None => "any".to_string(),
            };
            let bank1 = match &rule.layout.bank1 {
                Some(bank) => format!("+{} {} B", bank.offset, bank.size),
                None => "-".to_string(),
            };
            let bank2 = match &rule.layout.bank2 {
                Some(bank) => format!("+{} {} B", bank.offset, bank.size),
                None => "-".to_string(),
            };
            println!(
                "   {:<22} flash {:<10} EEPROM {:>5} B  bank1 {:<20} bank2 {:<20} {}",
                rule.id, flash, rule.eeprom_b, bank1, bank2, rule.category
            );
        }
    }
    Ok(0)
}
