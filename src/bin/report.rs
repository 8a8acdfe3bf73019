use clap::Parser;
use praxis::db::{migrate, Db};
use praxis::model::EntityBody;
use praxis::{analytics, radar, Config};
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "report")]
#[command(about = "Print analytics tables for the methodology graph")]
struct Args {
    /// Maximum rows per table
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    println!("\n=== Praxis Methodology Graph Report ===\n");

    // Practice influence ranking
    let influence = analytics::influence_scores(&db).await?;
    println!("Practice Influence Ranking:\n");
    println!("{:-<70}", "");
    println!(
        "{:<35} {:>8} {:>10} {:>10}",
        "Practice", "Rules", "Contexts", "Influence"
    );
    println!("{:-<70}", "");
    if influence.is_empty() {
        println!("(no practices)");
    }
    for row in influence.iter().take(args.limit) {
        println!(
            "{:<35} {:>8} {:>10} {:>10}",
            row.practice, row.rule_count, row.context_count, row.score
        );
    }
    println!("{:-<70}", "");

    // Evidence strength per rule
    let strength = analytics::evidence_strength(&db).await?;
    println!("\nEvidence Strength by Rule:\n");
    println!("{:-<70}", "");
    println!(
        "{:<35} {:>8} {:>10} {:>10}",
        "Rule", "Sources", "Avg Cred", "Strength"
    );
    println!("{:-<70}", "");
    if strength.is_empty() {
        println!("(no supported rules)");
    }
    for row in strength.iter().take(args.limit) {
        println!(
            "{:<35} {:>8} {:>10.1} {:>10.1}",
            row.rule, row.evidence_count, row.avg_credibility, row.strength
        );
    }
    println!("{:-<70}", "");

    // Temporal trend
    let trend = analytics::temporal_trend(&db).await?;
    println!("\nMethodology Emergence by Year:\n");
    println!("{:-<70}", "");
    println!("{:<8} {:>6}  {}", "Year", "Count", "Methodologies");
    println!("{:-<70}", "");
    if trend.is_empty() {
        println!("(no dated methodologies)");
    }
    for row in trend.iter().take(args.limit) {
        println!("{:<8} {:>6}  {}", row.year, row.count, row.methodologies.join(", "));
    }
    println!("{:-<70}", "");

    // Radar summary
    let summaries = radar::techniques_summary(&db).await?;
    println!("\nTechnology Radar Summary:\n");
    println!("{:-<70}", "");
    println!("{:<30} {:>8}  {}", "Technique", "Ring", "Influences");
    println!("{:-<70}", "");
    if summaries.is_empty() {
        println!("(no radar techniques)");
    }
    for summary in summaries.iter().take(args.limit) {
        let ring = match &summary.technique.body {
            EntityBody::RadarTechnique(attrs) => attrs.ring.as_str(),
            _ => "?",
        };
        let practices = if summary.influenced_practices.is_empty() {
            "-".to_string()
        } else {
            summary.influenced_practices.join(", ")
        };
        println!("{:<30} {:>8}  {}", summary.technique.name, ring, practices);
    }
    println!("{:-<70}", "");
    println!();

    Ok(())
}
