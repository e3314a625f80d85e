use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fshift_core::{
    calculate_budget_variance, calculate_debt_payoff, calculate_goal_projection, calculate_pay_period,
    calculate_shift_pay, compare_strategies, compute_tax_burden, summarize_budgets, Budget, DebtAccount,
    FilingStatus, Goal, PayoffStrategy, Shift, ShiftRule, StateTax, TaxSchedule,
};
use fshift_ingest::{parse_transactions_csv, CategoryRules, ImportOptions, SignConvention};
use fshift_sync::{HttpTransport, OptimizedClient};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;
mod input;
mod report;
mod state;

use input::read_json;

#[derive(Parser, Debug)]
#[command(
    name = "fshift",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("FSHIFT_BUILD_SHA"), ")"),
    about = "Financial $hift: shift pay, debt payoff, tax and budget calculations"
)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pay for a single shift
    Pay {
        /// Shift as JSON (inline or path)
        #[arg(long)]
        shift: String,
        /// Pay rule as JSON (inline or path)
        #[arg(long)]
        rule: String,
    },

    /// Pay for a set of shifts, carrying weekly overtime across them
    Period {
        #[arg(long)]
        shifts: String,
        #[arg(long)]
        rule: String,
    },

    /// Project a debt payoff plan
    Debt {
        /// Debts as a JSON array (inline or path)
        #[arg(long)]
        debts: String,
        #[arg(long, default_value = "avalanche")]
        strategy: PayoffStrategy,
        /// Monthly amount on top of the minimums
        #[arg(long, default_value_t = 0.0)]
        extra: f64,
        /// First payment month (default: today)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Show avalanche and snowball side by side
        #[arg(long)]
        compare: bool,
    },

    /// Estimate annual tax on gross income
    Tax {
        #[arg(long)]
        income: f64,
        #[arg(long, default_value = "single")]
        status: FilingStatus,
        /// Flat state income tax rate, e.g. 0.0495
        #[arg(long)]
        state_rate: Option<f64>,
    },

    /// Compare budgets with spending from a CSV export
    Budget {
        /// Budgets as a JSON array (inline or path)
        #[arg(long)]
        budgets: String,
        #[arg(long)]
        transactions: PathBuf,
        /// Positive amounts are charges (credit card exports)
        #[arg(long)]
        card: bool,
        /// Extra category rules: JSON array of {category, pattern}
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Project completion of a savings goal
    Goal {
        #[arg(long)]
        goal: String,
        /// Date to project from (default: today in the profile timezone)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Read records from the entity API
    Entities {
        #[command(subcommand)]
        command: EntitiesCommand,
    },

    /// Manage ~/.fshift/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EntitiesCommand {
    List {
        entity: String,
        /// Sort field, prefix with - for descending
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        entity: String,
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn today(cfg: &config::Config) -> Result<NaiveDate> {
    state::local_today(&cfg.profile.timezone)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config()?;
    debug!(timezone = %cfg.profile.timezone, "config loaded");

    match cli.command {
        Command::Pay { shift, rule } => {
            let shift: Shift = read_json(&shift).context("--shift")?;
            let rule: ShiftRule = read_json(&rule).context("--rule")?;
            let pay = calculate_shift_pay(&shift, &rule)?;
            emit(cli.json, &pay, report::print_pay)?;
        }

        Command::Period { shifts, rule } => {
            let shifts: Vec<Shift> = read_json(&shifts).context("--shifts")?;
            let rule: ShiftRule = read_json(&rule).context("--rule")?;
            let summary = calculate_pay_period(&shifts, &rule)?;
            emit(cli.json, &summary, report::print_period)?;
        }

        Command::Debt {
            debts,
            strategy,
            extra,
            start,
            compare,
        } => {
            let debts: Vec<DebtAccount> = read_json(&debts).context("--debts")?;
            let start = match start {
                Some(d) => d,
                None => today(&cfg)?,
            };
            if compare {
                let comparison = compare_strategies(&debts, extra, start)?;
                emit(cli.json, &comparison, report::print_comparison)?;
            } else {
                let plan = calculate_debt_payoff(&debts, strategy, extra, start)?;
                emit(cli.json, &plan, report::print_payoff)?;
            }
        }

        Command::Tax {
            income,
            status,
            state_rate,
        } => {
            let mut schedule = TaxSchedule::federal_2024();
            if let Some(rate) = state_rate {
                schedule = schedule.with_state(StateTax::Flat { rate });
            }
            let details = compute_tax_burden(income, status, &schedule)?;
            emit(cli.json, &details, report::print_tax)?;
        }

        Command::Budget {
            budgets,
            transactions,
            card,
            rules,
        } => {
            let budgets: Vec<Budget> = read_json(&budgets).context("--budgets")?;
            let rules = match rules {
                Some(path) => CategoryRules::from_json_file(path)?,
                None => CategoryRules::default_rules()?,
            };
            let options = ImportOptions {
                sign: if card {
                    SignConvention::PositiveIsExpense
                } else {
                    SignConvention::NegativeIsExpense
                },
            };
            let txns = parse_transactions_csv(&transactions, &rules, options)
                .with_context(|| format!("parsing {}", transactions.display()))?;
            debug!(count = txns.len(), "transactions imported");

            let variances = calculate_budget_variance(&budgets, &txns)?;
            let summary = summarize_budgets(&variances);
            if cli.json {
                let out = serde_json::json!({ "budgets": variances, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                report::print_budgets(&variances, &summary);
            }
        }

        Command::Goal { goal, today: on } => {
            let goal: Goal = read_json(&goal).context("--goal")?;
            let on = match on {
                Some(d) => d,
                None => today(&cfg)?,
            };
            let projection = calculate_goal_projection(&goal, on)?;
            emit(cli.json, &projection, |p| report::print_goal(&goal, p))?;
        }

        Command::Entities { command } => {
            let mut transport = HttpTransport::new(&cfg.api.base_url);
            if let Some(app_id) = &cfg.api.app_id {
                transport = transport.with_app_id(app_id);
            }
            if let Some(token) = cfg.api.token() {
                transport = transport.with_token(token);
            }
            let client = OptimizedClient::new(transport, &cfg.optimizer)?;

            let value = match command {
                EntitiesCommand::List { entity, sort, limit } => {
                    client.list(&entity, sort.as_deref(), limit).await?
                }
                EntitiesCommand::Get { entity, id } => client.get(&entity, &id).await?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                println!("# {}", config::config_path()?.display());
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        },
    }

    Ok(())
}
