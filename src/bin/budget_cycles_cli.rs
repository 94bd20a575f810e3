use std::path::PathBuf;
use std::process::ExitCode;

use budget_cycles::{
    config::ConfigManager,
    core::{
        AmountKind, BudgetEngine, BudgetStatus, CatchUpOutcome, CatchUpTrigger, FixedClock, Insights,
        TimeFrame, UpcomingOccurrence,
    },
    errors::{EngineError, Result},
    ledger::{Budget, BudgetKind, BudgetScope, Category, RecurrenceRule, TransactionDraft},
    storage::JsonFileStore,
    utils::app_data_dir,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "budget_cycles_cli", version)]
#[command(about = "Budget cycles, recurring catch-up and spending insights", long_about = None)]
struct Cli {
    /// Data directory holding config.json and the default ledger store.
    #[arg(long, env = "BUDGET_CYCLES_HOME", global = true)]
    home: Option<PathBuf>,

    /// Ledger store file; overrides the configured one.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Frozen current time (RFC 3339). Defaults to the system clock.
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Materialize recurring transactions that have come due.
    CatchUp {
        #[arg(long, value_enum, default_value_t = TriggerArg::Foreground)]
        trigger: TriggerArg,
    },
    /// Show every budget's position in its current cycle.
    Status,
    /// Bucketed totals for the week, month or year around a reference time.
    Insights {
        #[arg(long, value_enum, default_value_t = FrameArg::Month)]
        frame: FrameArg,
        #[arg(long, value_enum, default_value_t = KindArg::Expense)]
        kind: KindArg,
        /// Any instant inside the wanted frame. Defaults to now.
        #[arg(long)]
        reference: Option<DateTime<Utc>>,
    },
    /// List recurring occurrences due within the next days.
    Upcoming {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Record a one-off transaction.
    Record(RecordArgs),
    /// Create a recurring schedule.
    Schedule(ScheduleArgs),
    /// Create or replace a budget.
    Budget(BudgetArgs),
    /// Manage spending and income categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Stop a recurring schedule from producing further occurrences.
    Cancel { schedule_id: Uuid },
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Add a category and print its id.
    Add {
        name: String,
        /// Display colour, e.g. "#FF9500".
        colour: String,
        #[arg(long)]
        income: bool,
    },
}

#[derive(Debug, Args)]
struct RecordArgs {
    amount: Decimal,
    #[arg(long)]
    income: bool,
    #[arg(long)]
    category: Option<Uuid>,
    /// When the transaction happened. Defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    #[arg(long, short = 'm')]
    note: Option<String>,
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    amount: Decimal,
    #[arg(long, value_enum)]
    every: EveryArg,
    #[arg(long, default_value_t = 1)]
    coefficient: u32,
    /// First due date. Defaults to now.
    #[arg(long)]
    first_due: Option<DateTime<Utc>>,
    #[arg(long)]
    income: bool,
    #[arg(long)]
    category: Option<Uuid>,
    #[arg(long, short = 'm')]
    note: Option<String>,
}

#[derive(Debug, Args)]
struct BudgetArgs {
    #[arg(value_enum)]
    kind: PeriodArg,
    limit: Decimal,
    /// Date the cycle is anchored to. Defaults to today.
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Limit one category instead of all spending.
    #[arg(long)]
    category: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TriggerArg {
    Foreground,
    Sync,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FrameArg {
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Expense,
    Income,
    Net,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EveryArg {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Day,
    Week,
    Month,
    Year,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    budget_cycles::init();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let manager = ConfigManager::with_base_dir(cli.home.clone().unwrap_or_else(app_data_dir))?;
    let config = manager.load()?;
    let settings = config.engine_settings()?;
    let store_path = cli.store.clone().unwrap_or_else(|| manager.store_path(&config));
    let store = JsonFileStore::open(store_path)?;
    let engine = BudgetEngine::new(store, FixedClock::new(cli.now.unwrap_or_else(Utc::now)), settings);
    let now = engine.now();

    match cli.command {
        Command::CatchUp { trigger } => {
            let trigger = match trigger {
                TriggerArg::Foreground => CatchUpTrigger::Foreground,
                TriggerArg::Sync => CatchUpTrigger::SyncCompleted,
            };
            let outcome = engine.run_recurring_catch_up(trigger, now);
            return Ok(print_catch_up(&outcome, cli.json));
        }
        Command::Status => {
            let statuses = engine.budget_statuses(now)?;
            if cli.json {
                print_json(&statuses)?;
            } else {
                print_statuses(&statuses);
            }
        }
        Command::Insights { frame, kind, reference } => {
            let frame = match frame {
                FrameArg::Week => TimeFrame::Week,
                FrameArg::Month => TimeFrame::Month,
                FrameArg::Year => TimeFrame::Year,
            };
            let kind = match kind {
                KindArg::Expense => AmountKind::Expense,
                KindArg::Income => AmountKind::Income,
                KindArg::Net => AmountKind::Net,
            };
            let insights = engine.compute_insights_at(frame, kind, reference.unwrap_or(now))?;
            if cli.json {
                print_json(&insights)?;
            } else {
                print_insights(&insights);
            }
        }
        Command::Upcoming { days } => {
            let upcoming = engine.upcoming_occurrences(now + Duration::days(days as i64))?;
            if cli.json {
                print_json(&upcoming)?;
            } else {
                print_upcoming(&upcoming);
            }
        }
        Command::Record(args) => {
            let draft = draft(args.amount, args.income, args.category, args.note);
            let txn = engine.record_transaction(draft, args.at.unwrap_or(now))?;
            println!("{} {}", "Recorded".green(), txn.id);
        }
        Command::Schedule(args) => {
            let rule = match args.every {
                EveryArg::Day => RecurrenceRule::daily(args.coefficient),
                EveryArg::Week => RecurrenceRule::weekly(args.coefficient),
                EveryArg::Month => RecurrenceRule::monthly(args.coefficient),
            }?;
            let draft = draft(args.amount, args.income, args.category, args.note);
            let schedule = engine.schedule_recurring(draft, rule, args.first_due.unwrap_or(now))?;
            println!(
                "{} {} ({}, first due {})",
                "Scheduled".green(),
                schedule.id,
                schedule.rule.label(),
                schedule.next_due.format("%Y-%m-%d %H:%M")
            );
        }
        Command::Budget(args) => {
            let kind = match args.kind {
                PeriodArg::Day => BudgetKind::Day,
                PeriodArg::Week => BudgetKind::Week,
                PeriodArg::Month => BudgetKind::Month,
                PeriodArg::Year => BudgetKind::Year,
            };
            let scope = args.category.map(BudgetScope::Category).unwrap_or(BudgetScope::Main);
            let start = args.start.unwrap_or_else(|| engine.policy().local_date(now));
            let budget = engine.create_budget(Budget::starting_on(scope, kind, start, args.limit)?)?;
            println!("{} {}", "Budget saved".green(), budget.id);
        }
        Command::Category(CategoryCommand::Add { name, colour, income }) => {
            let category = if income {
                Category::income(name, colour)
            } else {
                Category::expense(name, colour)
            };
            let category = engine.add_category(category)?;
            println!("{} {} {}", "Category added".green(), category.name, category.id);
        }
        Command::Cancel { schedule_id } => {
            let schedule = engine.cancel_recurring(schedule_id)?;
            println!("{} {} ({})", "Cancelled".yellow(), schedule.id, schedule.rule.label());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn draft(amount: Decimal, income: bool, category: Option<Uuid>, note: Option<String>) -> TransactionDraft {
    let mut draft = if income {
        TransactionDraft::income(amount)
    } else {
        TransactionDraft::expense(amount)
    };
    draft.category_id = category;
    draft.note = note;
    draft
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|err| EngineError::Validation(err.to_string()))?;
    println!("{json}");
    Ok(())
}

fn print_catch_up(outcome: &CatchUpOutcome, json: bool) -> ExitCode {
    match outcome {
        CatchUpOutcome::Completed(report) => {
            if json {
                if let Err(err) = print_json(report) {
                    eprintln!("{} {err}", "error:".red().bold());
                    return ExitCode::FAILURE;
                }
            } else {
                println!(
                    "{} materialized {} occurrence(s) across {} schedule(s)",
                    "Catch-up:".bold(),
                    report.created(),
                    report.schedules_advanced
                );
                if report.capped {
                    println!("{}", "More occurrences remain; run catch-up again.".yellow());
                }
                for failure in &report.failures {
                    println!(
                        "{} schedule {} stopped at {}: {}",
                        "warning:".yellow().bold(),
                        failure.schedule_id,
                        failure.due.format("%Y-%m-%d %H:%M"),
                        failure.reason
                    );
                }
            }
            if report.failures.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        CatchUpOutcome::Skipped { retry_after, .. } => {
            println!("Catch-up skipped until {}", retry_after.format("%Y-%m-%d %H:%M:%S"));
            ExitCode::SUCCESS
        }
        CatchUpOutcome::Failed(reason) => {
            eprintln!("{} catch-up failed: {reason}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn print_statuses(statuses: &[BudgetStatus]) {
    if statuses.is_empty() {
        println!("No budgets defined.");
        return;
    }
    for status in statuses {
        let percent = if status.percent_spent.is_finite() {
            format!("{:.1}%", status.percent_spent)
        } else {
            "n/a".to_string()
        };
        let line = format!(
            "{}  {} → {}  spent {} of {} ({}), {:.0}% of cycle elapsed",
            status.budget_id,
            status.window.start.format("%Y-%m-%d"),
            status.window.end.format("%Y-%m-%d"),
            status.spent,
            status.limit,
            percent,
            status.percent_elapsed * 100.0
        );
        if status.over_budget {
            println!("{} {}", line.red(), "over budget".red().bold());
        } else {
            println!("{}", line.green());
        }
    }
}

fn print_insights(insights: &Insights) {
    println!(
        "{} {:?} {:?} {} → {}",
        "Insights".bold(),
        insights.frame,
        insights.kind,
        insights.window.start.format("%Y-%m-%d"),
        insights.window.end.format("%Y-%m-%d")
    );
    for (start, amount) in insights.buckets.iter().filter(|(_, amount)| !amount.is_zero()) {
        println!("  {}  {}", start.format("%Y-%m-%d"), amount);
    }
    println!(
        "Total {}  Average {}  Max {}  Active buckets {}",
        insights.total,
        insights.average.round_dp(2),
        insights.maximum,
        insights.non_zero_buckets
    );
    for share in &insights.category_breakdown {
        let name = share
            .category_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "uncategorised".to_string());
        println!("  {name}: {} ({:.1}%)", share.amount, share.percent);
    }
}

fn print_upcoming(upcoming: &[UpcomingOccurrence]) {
    if upcoming.is_empty() {
        println!("Nothing scheduled.");
        return;
    }
    for item in upcoming {
        let sign = if item.template.is_income { "+" } else { "-" };
        println!(
            "{}  {}{}  {}",
            item.due.format("%Y-%m-%d %H:%M"),
            sign,
            item.template.amount,
            item.label.dimmed()
        );
    }
}
