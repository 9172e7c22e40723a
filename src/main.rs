use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use portfolio_analytics::config::{parse_curriculum, Config};
use portfolio_analytics::import;
use portfolio_analytics::models::{
    NewAssessment, NewCriterion, NewRecommendation, Priority, RecommendationKind,
};
use portfolio_analytics::recommend::RegenerationPolicy;
use portfolio_analytics::report;
use portfolio_analytics::store::SqlStore;
use portfolio_analytics::Dashboard;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "portfolio-analytics")]
#[command(about = "Progress, peer assessment and study recommendation analytics", long_about = None)]
struct Cli {
    /// SQLite database URL (defaults to DATABASE_URL or sqlite://portfolio.db)
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Comma-separated canonical subject list
    #[arg(long, global = true)]
    curriculum: Option<String>,
    /// Keep completion markers when recommendations are regenerated
    #[arg(long, global = true)]
    keep_completed: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import progress rows (subject,topic,progress_percent) from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record and inspect topic progress
    #[command(subcommand)]
    Progress(ProgressCommand),
    /// Generate and manage study recommendations
    #[command(subcommand)]
    Recommend(RecommendCommand),
    /// Manage the peer assessment criteria catalog
    #[command(subcommand)]
    Criteria(CriteriaCommand),
    /// Record and inspect peer assessments
    #[command(subcommand)]
    Assess(AssessCommand),
    /// Peer assessment statistics
    #[command(subcommand)]
    Stats(StatsCommand),
    /// Generate a markdown report
    Report {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProgressCommand {
    Set {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        percent: u8,
    },
    Remove {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        topic: String,
    },
    List {
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Subcommand)]
enum RecommendCommand {
    Generate,
    List {
        #[arg(long)]
        priority: Option<Priority>,
        /// Include completed items
        #[arg(long)]
        all: bool,
    },
    Add {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        message: String,
        #[arg(long)]
        action: String,
    },
    Complete {
        id: Uuid,
    },
    Remove {
        id: Uuid,
    },
}

#[derive(Args)]
struct CriterionArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    weight: f64,
}

impl From<CriterionArgs> for NewCriterion {
    fn from(args: CriterionArgs) -> Self {
        NewCriterion {
            name: args.name,
            description: args.description,
            weight: args.weight,
        }
    }
}

#[derive(Subcommand)]
enum CriteriaCommand {
    List,
    Add(CriterionArgs),
    Update {
        id: Uuid,
        #[command(flatten)]
        criterion: CriterionArgs,
    },
    Remove {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum AssessCommand {
    Add {
        #[arg(long)]
        group: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        student: String,
        #[arg(long)]
        assessor: String,
        /// Repeatable, as <criterion-id>=<rating>
        #[arg(long = "rating", value_parser = parse_rating)]
        ratings: Vec<(Uuid, u8)>,
        #[arg(long)]
        comments: Option<String>,
    },
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        assessor: Option<String>,
    },
    Remove {
        id: Uuid,
    },
    /// Delete every assessment recorded for a project
    Purge {
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand)]
enum StatsCommand {
    Project {
        #[arg(long)]
        project: String,
    },
    Student {
        #[arg(long)]
        project: String,
        #[arg(long)]
        student: String,
    },
}

fn parse_rating(value: &str) -> Result<(Uuid, u8), String> {
    let (id, rating) = value
        .split_once('=')
        .ok_or_else(|| format!("expected <criterion-id>=<rating>, got '{value}'"))?;
    let id = id.trim().parse::<Uuid>().map_err(|err| err.to_string())?;
    let rating = rating.trim().parse::<u8>().map_err(|err| err.to_string())?;
    Ok((id, rating))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(curriculum) = cli.curriculum {
        config.curriculum = parse_curriculum(&curriculum);
    }
    if cli.keep_completed {
        config.policy = RegenerationPolicy::KeepCompleted;
    }

    let store = SqlStore::open(&config.database_url)
        .with_context(|| format!("failed to open {}", config.database_url))?;
    if let Commands::InitDb = cli.command {
        println!("Schema ready.");
        return Ok(());
    }

    let mut dashboard =
        Dashboard::open(Arc::new(store), &config).context("failed to load stored collections")?;

    match cli.command {
        Commands::InitDb => {}
        Commands::Seed => {
            dashboard.seed()?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let rows = import::read_progress_csv(&csv)?;
            let imported = dashboard.import_progress(&rows)?;
            println!("Imported {imported} progress rows from {}.", csv.display());
        }
        Commands::Progress(command) => run_progress(&mut dashboard, command)?,
        Commands::Recommend(command) => run_recommend(&mut dashboard, command)?,
        Commands::Criteria(command) => run_criteria(&mut dashboard, command)?,
        Commands::Assess(command) => run_assess(&mut dashboard, command)?,
        Commands::Stats(command) => run_stats(&dashboard, command)?,
        Commands::Report { project, out } => {
            let report = report::build_report(&dashboard, project.as_deref());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn run_progress(dashboard: &mut Dashboard, command: ProgressCommand) -> anyhow::Result<()> {
    match command {
        ProgressCommand::Set {
            subject,
            topic,
            percent,
        } => {
            dashboard.record_progress(&subject, &topic, percent)?;
            println!("{subject} / {topic} set to {percent}%.");
        }
        ProgressCommand::Remove { subject, topic } => {
            dashboard.remove_progress(&subject, &topic)?;
            println!("{subject} / {topic} removed.");
        }
        ProgressCommand::List { subject } => {
            let ledger = dashboard.progress();
            let records: Vec<_> = match subject.as_deref() {
                Some(subject) => ledger.by_subject(subject),
                None => ledger.records().iter().collect(),
            };
            if records.is_empty() {
                println!("No progress recorded.");
                return Ok(());
            }
            for record in records {
                println!(
                    "- {} / {}: {}% (recorded {})",
                    record.subject,
                    record.topic,
                    record.progress_percent,
                    record.recorded_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("Overall: {}%", ledger.by_overall());
            for (subject, average) in ledger.by_subject_summary() {
                println!("  {subject}: {average}%");
            }
        }
    }
    Ok(())
}

fn run_recommend(dashboard: &mut Dashboard, command: RecommendCommand) -> anyhow::Result<()> {
    match command {
        RecommendCommand::Generate => {
            let count = dashboard.generate_recommendations()?;
            println!("Generated {count} recommendations.");
        }
        RecommendCommand::List { priority, all } => {
            let engine = dashboard.recommendations();
            let items: Vec<_> = match (priority, all) {
                (Some(priority), _) => engine.by_priority(priority),
                (None, true) => engine.all().iter().collect(),
                (None, false) => engine.active(),
            };
            if items.is_empty() {
                println!("No recommendations.");
                return Ok(());
            }
            for item in items {
                let status = if item.completed { "done" } else { "open" };
                println!(
                    "- {} [{}] [{}] {}: {} ({})",
                    item.id, item.priority, status, item.subject, item.message, item.action
                );
            }
        }
        RecommendCommand::Add {
            subject,
            priority,
            message,
            action,
        } => {
            let item = dashboard.recommendations_mut().add(NewRecommendation {
                kind: RecommendationKind::Study,
                subject,
                priority,
                message,
                action,
            })?;
            println!("Added recommendation {}.", item.id);
        }
        RecommendCommand::Complete { id } => {
            dashboard.recommendations_mut().complete(id)?;
            println!("Recommendation {id} completed.");
        }
        RecommendCommand::Remove { id } => {
            dashboard.recommendations_mut().remove(id)?;
            println!("Recommendation {id} removed.");
        }
    }
    Ok(())
}

fn run_criteria(dashboard: &mut Dashboard, command: CriteriaCommand) -> anyhow::Result<()> {
    let engine = dashboard.assessments_mut();
    match command {
        CriteriaCommand::List => {
            for criterion in engine.criteria() {
                println!(
                    "- {} {} ({}%): {}",
                    criterion.id, criterion.name, criterion.weight, criterion.description
                );
            }
        }
        CriteriaCommand::Add(args) => {
            let criterion = engine.create_criterion(args.into())?;
            println!("Added criterion {} ({}).", criterion.name, criterion.id);
        }
        CriteriaCommand::Update { id, criterion } => {
            let criterion = engine.update_criterion(id, criterion.into())?;
            println!("Updated criterion {}.", criterion.name);
        }
        CriteriaCommand::Remove { id } => {
            engine.delete_criterion(id)?;
            println!("Removed criterion {id}.");
        }
    }

    if !engine.weights_balanced() {
        println!(
            "Warning: criteria weights sum to {}, not 100.",
            engine.total_weight()
        );
    }
    Ok(())
}

fn run_assess(dashboard: &mut Dashboard, command: AssessCommand) -> anyhow::Result<()> {
    match command {
        AssessCommand::Add {
            group,
            project,
            student,
            assessor,
            ratings,
            comments,
        } => {
            let engine = dashboard.assessments_mut();
            for (id, _) in &ratings {
                if engine.criterion(*id).is_none() {
                    tracing::warn!(criterion = %id, "rating references an unknown criterion");
                }
            }
            let assessment = engine.create_assessment(NewAssessment {
                group_id: group,
                project_id: project,
                assessed_student_id: student,
                assessor,
                ratings: ratings.into_iter().collect(),
                comments,
            })?;
            println!(
                "Recorded assessment {} (score {:.2}).",
                assessment.id,
                engine.weighted_score(&assessment)
            );
        }
        AssessCommand::List {
            project,
            student,
            assessor,
        } => {
            let engine = dashboard.assessments();
            let items = engine.search(project.as_deref(), student.as_deref(), assessor.as_deref());
            if items.is_empty() {
                println!("No assessments found.");
                return Ok(());
            }
            for item in items {
                println!(
                    "- {} {} -> {} score {:.2}",
                    item.id,
                    item.assessor,
                    item.assessed_student_id,
                    engine.weighted_score(item)
                );
            }
        }
        AssessCommand::Remove { id } => {
            dashboard.assessments_mut().delete_assessment(id)?;
            println!("Removed assessment {id}.");
        }
        AssessCommand::Purge { project } => {
            let removed = dashboard.delete_project_assessments(&project)?;
            println!("Removed {removed} assessments for {project}.");
        }
    }
    Ok(())
}

fn run_stats(dashboard: &Dashboard, command: StatsCommand) -> anyhow::Result<()> {
    let engine = dashboard.assessments();
    let stats = match command {
        StatsCommand::Project { project } => {
            serde_json::to_string_pretty(&engine.project_statistics(&project))?
        }
        StatsCommand::Student { project, student } => {
            serde_json::to_string_pretty(&engine.student_statistics(&project, &student))?
        }
    };
    println!("{stats}");
    Ok(())
}
