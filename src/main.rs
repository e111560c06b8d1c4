use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tuition_engine::alert::{apply_alert_rules, build_sinks, dispatch, evaluate_alerts};
use tuition_engine::catalog::fallback::{static_discounts, static_tracks};
use tuition_engine::catalog::DiscountSelection;
use tuition_engine::config::{Config, ConfigOverrides, StoreBackend};
use tuition_engine::finance::{
    assess_viability, calculate_financials, late_fees, simulate_payment_scenarios,
    FinancialRequest, PaymentMethod,
};
use tuition_engine::geo;
use tuition_engine::migration::{
    analyze_with, newly_available_discounts, EligibilityContext, MigrationAnalysisComplete,
};
use tuition_engine::output::csv::{
    discounts_to_csv, installments_to_csv, migration_to_csv, scenarios_to_csv, totals_to_csv,
};
use tuition_engine::output::render_json;
use tuition_engine::output::table::{
    render_discounts_table, render_eligibility_table, render_financial_table,
    render_late_fees_table, render_migration_table, render_payment_scenarios_table,
    render_scenarios_table, render_totals_table, render_tracks_table,
};
use tuition_engine::pricing::scenarios::{compare_scenarios, NamedScenario};
use tuition_engine::pricing::{
    calculate_by_ids, CalculatedTotals, CalculationInput, CalculationOptions, BASE_VALUE_ERROR,
};
use tuition_engine::resolver::sqlite::SqliteReferenceStore;
use tuition_engine::resolver::Resolver;
use tuition_engine::server::run_server;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "tuition-engine",
    about = "Tuition discount determination, migration and financial projection"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    backend: Option<StoreBackend>,
    #[arg(long = "store-url")]
    store_url: Option<String>,
    #[arg(long = "db-path")]
    db_path: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone)]
struct CalcArgs {
    #[arg(short, long)]
    track: Option<String>,
    /// Comma-separated discount ids or codes.
    #[arg(short, long, default_value = "")]
    discounts: String,
    #[arg(long)]
    base: f64,
    /// Chosen percentage for a variable discount, as CODE=PERCENT.
    #[arg(long = "variable")]
    variable: Vec<String>,
    #[arg(long = "include-inactive")]
    include_inactive: bool,
    #[arg(long = "skip-documents")]
    skip_documents: bool,
    #[arg(long = "no-cap")]
    no_cap: bool,
    #[arg(long = "no-special-rules")]
    no_special_rules: bool,
}

impl CalcArgs {
    fn to_input(&self) -> Result<CalculationInput> {
        Ok(CalculationInput {
            track_id: self.track.clone(),
            discount_ids: split_list(&self.discounts),
            base_value: self.base,
            options: CalculationOptions {
                include_inactive_discounts: self.include_inactive,
                validate_documentation: !self.skip_documents,
                apply_cap_automatically: !self.no_cap,
                consider_special_rules: !self.no_special_rules,
            },
            variable_percentages: parse_variables(&self.variable)?,
        })
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Calculate {
        #[command(flatten)]
        calc: CalcArgs,
    },
    Classify {
        postal_code: String,
        #[arg(long, default_value = "")]
        codes: String,
        #[arg(long)]
        track: Option<String>,
    },
    Migrate {
        /// Prior discounts as CODE:PERCENT, comma-separated.
        #[arg(long, default_value = "")]
        previous: String,
        #[arg(long, default_value = "cli")]
        student: String,
        #[arg(long = "postal-code")]
        postal_code: Option<String>,
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        debt: bool,
        #[arg(long)]
        base: Option<f64>,
    },
    Finance {
        #[command(flatten)]
        calc: CalcArgs,
        #[arg(long, default_value_t = 0.0)]
        material: f64,
        #[arg(long)]
        installments: Option<u32>,
        #[arg(long, default_value = "boleto")]
        method: PaymentMethod,
        #[arg(long = "due-day")]
        due_day: Option<u32>,
        /// Defaults to today.
        #[arg(long = "reference-date")]
        reference_date: Option<NaiveDate>,
        #[arg(long = "previous-monthly")]
        previous_monthly: Option<f64>,
        #[arg(long)]
        income: Option<f64>,
        #[arg(long)]
        simulate: bool,
    },
    Scenarios {
        /// JSON file holding an array of named calculation inputs.
        #[arg(long)]
        file: PathBuf,
    },
    LateFee {
        #[arg(long)]
        value: f64,
        #[arg(long)]
        due: NaiveDate,
        #[arg(long)]
        paid: Option<NaiveDate>,
    },
    Tracks,
    Discounts,
    Refresh,
    SeedCatalog,
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        backend: cli.backend,
        store_url: cli.store_url.clone(),
        db_path: cli.db_path.clone(),
    });

    match &cli.command {
        Commands::Config { init, show } => handle_config_command(*init, *show, &config, &config_path),
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await
        }
        Commands::SeedCatalog => {
            let path = config.resolved_db_path();
            let store = SqliteReferenceStore::open(&path)?;
            let written = store.seed(&static_tracks(), &static_discounts())?;
            info!("seeded {written} catalog rows into {}", path.display());
            println!("Seeded {written} rows into {}", path.display());
            Ok(())
        }
        command => run_catalog_command(command, &config, cli.output).await,
    }
}

async fn run_catalog_command(command: &Commands, config: &Config, output: OutputFormat) -> Result<()> {
    let resolver = Resolver::from_config(config)?;
    let pricing_rules = config.pricing_rules();

    match command {
        Commands::Calculate { calc } => {
            let totals = calculate_by_ids(&resolver, &pricing_rules, &calc.to_input()?).await;
            emit_alerts(config, &resolver, Some(&totals)).await?;
            print_totals(&totals, output)?;
        }
        Commands::Classify {
            postal_code,
            codes,
            track,
        } => {
            let classification = geo::classify_detailed(postal_code);
            let category = classification.as_ref().map(|c| c.category);
            let special_track = match track {
                Some(id) => resolver
                    .resolve_track(id)
                    .await
                    .map(|t| t.is_special())
                    .unwrap_or(false),
                None => false,
            };
            let codes = split_list(codes);
            let checks = if codes.is_empty() {
                geo::analyze_eligibility(&resolver.list_discounts().await, category, special_track)
            } else {
                codes
                    .iter()
                    .map(|code| geo::evaluate_code(code, category, special_track))
                    .collect()
            };
            match output {
                OutputFormat::Table => {
                    match &classification {
                        Some(c) => println!("{} -> {} ({})", c.postal_code, c.category, c.area),
                        None => println!("{postal_code} -> unclassifiable"),
                    }
                    println!("{}", render_eligibility_table(&checks));
                }
                OutputFormat::Json => println!(
                    "{}",
                    render_json(&serde_json::json!({
                        "classification": classification,
                        "checks": checks,
                        "stats": geo::eligibility_stats(&checks),
                    }))?
                ),
                OutputFormat::Csv => {
                    warn!("CSV output for classify not implemented, using JSON");
                    println!("{}", render_json(&checks)?);
                }
            }
        }
        Commands::Migrate {
            previous,
            student,
            postal_code,
            track,
            debt,
            base,
        } => {
            let previous = parse_previous(previous, &resolver).await?;
            let context = EligibilityContext {
                student_id: student.clone(),
                track_id: track.clone(),
                postal_code: postal_code.clone(),
                has_outstanding_debt: *debt,
                base_value: *base,
                ..EligibilityContext::default()
            };
            let mut analysis = analyze_with(&config.migration_rules(), &previous, &context);
            let held: Vec<String> = previous.iter().map(|p| p.discount_code.clone()).collect();
            let offered =
                newly_available_discounts(&context, &held, &resolver.list_discounts().await);
            analysis.summary.new_discounts_available = offered.len();
            print_migration(&analysis, &offered, output)?;
        }
        Commands::Finance {
            calc,
            material,
            installments,
            method,
            due_day,
            reference_date,
            previous_monthly,
            income,
            simulate,
        } => {
            if !calc.base.is_finite() || calc.base <= 0.0 {
                bail!(BASE_VALUE_ERROR);
            }
            let totals = calculate_by_ids(&resolver, &pricing_rules, &calc.to_input()?).await;
            emit_alerts(config, &resolver, Some(&totals)).await?;
            let rules = config.finance_rules();
            let request = FinancialRequest {
                material_cost: *material,
                installments: *installments,
                payment_method: *method,
                due_day: *due_day,
                reference_date: reference_date.unwrap_or_else(|| Local::now().date_naive()),
                previous_monthly_value: *previous_monthly,
                family_income: *income,
            };
            let financials = calculate_financials(&totals, &request, &rules)?;
            let viability = assess_viability(&financials, *income, &rules);
            match output {
                OutputFormat::Table => {
                    println!("{}", render_financial_table(&financials));
                    if !viability.is_viable {
                        for reason in &viability.reasons {
                            println!("! {reason}");
                        }
                    }
                    if *simulate {
                        let scenarios = simulate_payment_scenarios(&totals, &request, &rules)?;
                        println!("{}", render_payment_scenarios_table(&scenarios));
                    }
                }
                OutputFormat::Json => {
                    let scenarios = if *simulate {
                        Some(simulate_payment_scenarios(&totals, &request, &rules)?)
                    } else {
                        None
                    };
                    println!(
                        "{}",
                        render_json(&serde_json::json!({
                            "financials": financials,
                            "viability": viability,
                            "scenarios": scenarios,
                        }))?
                    );
                }
                OutputFormat::Csv => println!("{}", installments_to_csv(&financials)?),
            }
        }
        Commands::Scenarios { file } => {
            let scenarios = load_scenarios(file)?;
            let comparison = compare_scenarios(&resolver, &pricing_rules, &scenarios).await;
            match output {
                OutputFormat::Table => println!("{}", render_scenarios_table(&comparison)),
                OutputFormat::Json => println!("{}", render_json(&comparison)?),
                OutputFormat::Csv => println!("{}", scenarios_to_csv(&comparison)?),
            }
        }
        Commands::LateFee { value, due, paid } => {
            let paid = paid.unwrap_or_else(|| Local::now().date_naive());
            let fees = late_fees(*value, *due, paid, &config.finance_rules());
            match output {
                OutputFormat::Table => println!("{}", render_late_fees_table(&fees)),
                OutputFormat::Json | OutputFormat::Csv => println!("{}", render_json(&fees)?),
            }
        }
        Commands::Tracks => {
            let tracks = resolver.list_tracks().await;
            match output {
                OutputFormat::Table => println!("{}", render_tracks_table(&tracks)),
                OutputFormat::Json => println!("{}", render_json(&tracks)?),
                OutputFormat::Csv => {
                    warn!("CSV output for tracks not implemented, using JSON");
                    println!("{}", render_json(&tracks)?);
                }
            }
        }
        Commands::Discounts => {
            let discounts = resolver.list_discounts().await;
            match output {
                OutputFormat::Table => println!("{}", render_discounts_table(&discounts)),
                OutputFormat::Json => println!("{}", render_json(&discounts)?),
                OutputFormat::Csv => println!("{}", discounts_to_csv(&discounts)?),
            }
        }
        Commands::Refresh => {
            let summary = resolver.refresh().await?;
            emit_alerts(config, &resolver, None).await?;
            println!("{}", render_json(&summary)?);
        }
        Commands::Config { .. } | Commands::Serve { .. } | Commands::SeedCatalog => {}
    }

    Ok(())
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

async fn emit_alerts(
    config: &Config,
    resolver: &Resolver,
    totals: Option<&CalculatedTotals>,
) -> Result<()> {
    let alerts = apply_alert_rules(
        evaluate_alerts(totals, resolver.store_failures()),
        &config.alerts.rules,
    );
    if alerts.is_empty() {
        return Ok(());
    }
    let sinks = build_sinks(&config.alerts)?;
    dispatch(&sinks, &alerts).await;
    Ok(())
}

fn print_totals(totals: &CalculatedTotals, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_totals_table(totals)),
        OutputFormat::Json => println!("{}", render_json(totals)?),
        OutputFormat::Csv => println!("{}", totals_to_csv(totals)?),
    }
    Ok(())
}

fn print_migration(
    analysis: &MigrationAnalysisComplete,
    offered: &[DiscountSelection],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_migration_table(analysis));
            if !offered.is_empty() {
                let codes: Vec<&str> = offered.iter().map(|o| o.discount_code.as_str()).collect();
                println!("Newly available: {}", codes.join(", "));
            }
        }
        OutputFormat::Json => println!(
            "{}",
            render_json(&serde_json::json!({
                "analysis": analysis,
                "newly_available": offered,
            }))?
        ),
        OutputFormat::Csv => println!("{}", migration_to_csv(analysis)?),
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_variables(raw: &[String]) -> Result<BTreeMap<String, f64>> {
    let mut out = BTreeMap::new();
    for entry in raw {
        let (code, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected CODE=PERCENT, got {entry}"))?;
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid percentage in {entry}"))?;
        out.insert(code.trim().to_string(), value);
    }
    Ok(out)
}

/// Builds prior selections from CODE:PERCENT pairs, naming them from the catalog.
async fn parse_previous(raw: &str, resolver: &Resolver) -> Result<Vec<DiscountSelection>> {
    let mut out = Vec::new();
    for entry in split_list(raw) {
        let (code, value) = entry
            .split_once(':')
            .ok_or_else(|| anyhow!("expected CODE:PERCENT, got {entry}"))?;
        let percentage: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid percentage in {entry}"))?;
        let code = code.trim().to_ascii_uppercase();
        let selection = match resolver.resolve_discount(&code).await {
            Ok(discount) => DiscountSelection {
                percentage,
                ..DiscountSelection::from_discount(&discount)
            },
            Err(_) => DiscountSelection {
                discount_id: code.clone(),
                discount_code: code,
                percentage,
                requires_documents: false,
                discount_name: None,
                category: None,
            },
        };
        out.push(selection);
    }
    Ok(out)
}

fn load_scenarios(path: &Path) -> Result<Vec<NamedScenario>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading scenarios: {}", path.display()))?;
    let scenarios: Vec<NamedScenario> = serde_json::from_str(&data)
        .with_context(|| format!("failed parsing scenarios: {}", path.display()))?;
    Ok(scenarios)
}

