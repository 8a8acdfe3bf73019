use clap::Parser;
use praxis::db::{migrate, Db};
use praxis::error::PraxisError;
use praxis::graph::{self, LinkAttrs};
use praxis::model::{
    ContextAttrs, EntityBody, EntityDraft, EntityKind, EntityRef, EvidenceAttrs,
    MethodologyAttrs, PracticeAttrs, Priority, RelKind, RuleAttrs,
};
use praxis::{store, Config};
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "seed")]
#[command(about = "Load the canonical sample methodology graph")]
struct Args {
    /// Recreate the database file before seeding
    #[arg(short, long)]
    reset: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn methodology(
    name: &str,
    description: &str,
    origin: &str,
    year_created: i32,
    category: &str,
) -> EntityDraft {
    EntityDraft {
        name: name.to_string(),
        body: EntityBody::Methodology(MethodologyAttrs {
            description: Some(description.to_string()),
            origin: Some(origin.to_string()),
            year_created: Some(year_created),
            category: Some(category.to_string()),
        }),
    }
}

fn practice(
    name: &str,
    description: &str,
    tools: &[&str],
    difficulty_level: &str,
    estimated_time: &str,
) -> EntityDraft {
    EntityDraft {
        name: name.to_string(),
        body: EntityBody::Practice(PracticeAttrs {
            description: Some(description.to_string()),
            tools: strings(tools),
            difficulty_level: Some(difficulty_level.to_string()),
            estimated_time: Some(estimated_time.to_string()),
        }),
    }
}

fn rule(
    name: &str,
    title: &str,
    detail: &str,
    priority: Priority,
    category: &str,
    tags: &[&str],
) -> EntityDraft {
    EntityDraft {
        name: name.to_string(),
        body: EntityBody::Rule(RuleAttrs {
            title: title.to_string(),
            detail: detail.to_string(),
            priority,
            category: Some(category.to_string()),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

fn context(
    name: &str,
    description: &str,
    constraints: &[&str],
    team_size: &str,
    project_type: &str,
    industry: &str,
) -> EntityDraft {
    EntityDraft {
        name: name.to_string(),
        body: EntityBody::Context(ContextAttrs {
            description: Some(description.to_string()),
            constraints: strings(constraints),
            team_size: Some(team_size.to_string()),
            project_type: Some(project_type.to_string()),
            industry: Some(industry.to_string()),
        }),
    }
}

fn evidence(
    name: &str,
    title: &str,
    url: &str,
    summary: &str,
    source_type: &str,
    credibility_score: f64,
) -> EntityDraft {
    EntityDraft {
        name: name.to_string(),
        body: EntityBody::Evidence(EvidenceAttrs {
            title: title.to_string(),
            url: Some(url.to_string()),
            summary: Some(summary.to_string()),
            source_type: Some(source_type.to_string()),
            credibility_score: Some(credibility_score),
        }),
    }
}

/// Create an entity, skipping duplicates so re-running the seed is safe.
async fn create(db: &Db, draft: EntityDraft) -> Result<()> {
    let kind = draft.body.kind();
    let name = draft.name.clone();
    match store::create(db, draft).await {
        Ok(entity) => {
            log::info!("Created {} '{}'", kind.as_str(), entity.name);
            Ok(())
        }
        Err(PraxisError::DuplicateName { .. }) => {
            log::warn!("{} '{}' already exists, skipping", kind.as_str(), name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn link(
    db: &Db,
    from_kind: EntityKind,
    from: &str,
    rel: RelKind,
    to_kind: EntityKind,
    to: &str,
) -> Result<()> {
    graph::link(
        db,
        EntityRef::new(from_kind, from),
        rel,
        EntityRef::new(to_kind, to),
        LinkAttrs::default(),
    )
    .await?;
    log::debug!("Linked {}:{} -{}-> {}:{}", from_kind.as_str(), from, rel.as_str(), to_kind.as_str(), to);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    if args.reset {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = config.db_path().as_os_str().to_owned();
            path.push(suffix);
            match std::fs::remove_file(Path::new(&path)) {
                Ok(()) => log::info!("Removed {}", Path::new(&path).display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    log::info!("Seeding canonical sample data");

    // Methodologies
    create(&db, methodology(
        "Agile",
        "Iterative development methodology focusing on collaboration, customer feedback, and rapid delivery",
        "Agile Manifesto Authors", 2001, "Agile",
    )).await?;
    create(&db, methodology(
        "Scrum",
        "Framework for developing and sustaining complex products in a complex environment",
        "Ken Schwaber and Jeff Sutherland", 1995, "Agile",
    )).await?;
    create(&db, methodology(
        "Waterfall",
        "Sequential development process where progress flows downwards through distinct phases",
        "Winston W. Royce", 1970, "Traditional",
    )).await?;
    create(&db, methodology(
        "DevOps",
        "Set of practices that combines software development and IT operations",
        "Patrick Debois", 2009, "DevOps",
    )).await?;
    create(&db, methodology(
        "Kanban",
        "Visual workflow management method for defining, managing and improving services",
        "Toyota Production System", 1940, "Lean",
    )).await?;

    // Practices, with the methodology each belongs to
    let practices: Vec<(&str, EntityDraft)> = vec![
        ("Agile", practice(
            "User Stories",
            "Short, simple descriptions of features told from the perspective of the end user",
            &["Jira", "Azure DevOps", "Trello"], "Beginner", "2-4 hours per story",
        )),
        ("Agile", practice(
            "Sprint Planning",
            "Event in Scrum where the team plans work to be performed during the sprint",
            &["Jira", "Azure DevOps", "Miro"], "Intermediate", "2-4 hours per sprint",
        )),
        ("Scrum", practice(
            "Daily Scrum",
            "Daily time-boxed event for the development team to synchronize activities",
            &["Teams", "Slack", "Zoom"], "Beginner", "15 minutes daily",
        )),
        ("Scrum", practice(
            "Sprint Review",
            "Event where the Scrum Team and stakeholders inspect the increment",
            &["Teams", "PowerPoint", "Demo environment"], "Intermediate", "1-2 hours per sprint",
        )),
        ("Scrum", practice(
            "Sprint Retrospective",
            "Event where the Scrum Team inspects itself and creates improvement plans",
            &["Miro", "Retrium", "FunRetro"], "Intermediate", "1-2 hours per sprint",
        )),
        ("DevOps", practice(
            "Continuous Integration",
            "Practice of merging developer working copies to a shared mainline frequently",
            &["Jenkins", "GitHub Actions", "Azure DevOps"], "Advanced", "Initial setup: 1-2 weeks",
        )),
        ("DevOps", practice(
            "Infrastructure as Code",
            "Managing and provisioning infrastructure through machine-readable definition files",
            &["Terraform", "Ansible", "CloudFormation"], "Advanced", "Setup: 2-4 weeks",
        )),
        ("Kanban", practice(
            "Visualize Workflow",
            "Make work visible through boards and cards representing work items",
            &["Kanban boards", "Jira", "Trello"], "Beginner", "1-2 days setup",
        )),
        ("Kanban", practice(
            "Limit Work in Progress",
            "Constrain how much work can be in each stage of the workflow",
            &["Physical boards", "Digital tools"], "Intermediate", "Ongoing adjustment",
        )),
    ];
    for (owner, draft) in practices {
        let name = draft.name.clone();
        create(&db, draft).await?;
        link(&db, EntityKind::Methodology, owner, RelKind::HasPractice, EntityKind::Practice, &name).await?;
    }

    // Rules, with the practice each belongs to
    let rules: Vec<(&str, EntityDraft)> = vec![
        ("Daily Scrum", rule(
            "daily-scrum-timebox", "Daily Scrum Time-box",
            "The Daily Scrum is time-boxed to 15 minutes regardless of team size",
            Priority::High, "timeboxing", &["scrum", "meeting", "timebox"],
        )),
        ("Daily Scrum", rule(
            "daily-scrum-three-questions", "Three Questions Format",
            "Each team member answers: What did I do yesterday? What will I do today? What impediments are in my way?",
            Priority::High, "format", &["scrum", "questions", "format"],
        )),
        ("Sprint Planning", rule(
            "sprint-planning-capacity", "Team Capacity Planning",
            "Consider team member availability, holidays, and other commitments when planning sprint capacity",
            Priority::High, "planning", &["capacity", "planning", "team"],
        )),
        ("User Stories", rule(
            "user-story-invest", "INVEST Criteria",
            "User stories should be Independent, Negotiable, Valuable, Estimable, Small, and Testable",
            Priority::High, "quality", &["invest", "criteria", "quality"],
        )),
        ("Continuous Integration", rule(
            "ci-commit-frequency", "Frequent Commits",
            "Developers should commit code to the main branch at least once per day",
            Priority::Medium, "frequency", &["commits", "integration", "frequency"],
        )),
        ("Continuous Integration", rule(
            "ci-automated-tests", "Automated Test Suite",
            "Every commit should trigger automated tests to ensure code quality",
            Priority::Critical, "testing", &["automation", "testing", "quality"],
        )),
        ("Limit Work in Progress", rule(
            "kanban-wip-limits", "Enforce WIP Limits",
            "Strictly enforce work-in-progress limits to prevent overloading the system",
            Priority::High, "workflow", &["wip", "limits", "flow"],
        )),
    ];
    for (owner, draft) in rules {
        let name = draft.name.clone();
        create(&db, draft).await?;
        link(&db, EntityKind::Practice, owner, RelKind::HasRule, EntityKind::Rule, &name).await?;
    }

    // Contexts
    create(&db, context(
        "Remote Team",
        "Distributed development team working from different locations",
        &["Time zone differences", "Communication challenges", "Limited face-to-face interaction"],
        "4-7", "Web App", "Technology",
    )).await?;
    create(&db, context(
        "Startup Environment",
        "Fast-paced startup environment with limited resources",
        &["Limited budget", "Tight deadlines", "Small team", "Changing requirements"],
        "1-3", "Mobile App", "Fintech",
    )).await?;
    create(&db, context(
        "Enterprise Project",
        "Large-scale enterprise project with complex requirements",
        &["Strict compliance", "Legacy systems", "Multiple stakeholders", "Long approval cycles"],
        "16+", "API", "Finance",
    )).await?;
    create(&db, context(
        "Open Source Project",
        "Community-driven open source software project",
        &["Volunteer contributors", "Asynchronous collaboration", "Documentation heavy"],
        "8-15", "Desktop", "Open Source",
    )).await?;

    // Where each rule applies
    let applications = [
        ("daily-scrum-timebox", "Remote Team"),
        ("daily-scrum-three-questions", "Remote Team"),
        ("sprint-planning-capacity", "Remote Team"),
        ("user-story-invest", "Startup Environment"),
        ("kanban-wip-limits", "Startup Environment"),
        ("ci-automated-tests", "Enterprise Project"),
        ("ci-commit-frequency", "Open Source Project"),
    ];
    for (rule_name, context_name) in applications {
        link(&db, EntityKind::Rule, rule_name, RelKind::AppliesIn, EntityKind::Context, context_name).await?;
    }

    // Evidence
    create(&db, evidence(
        "agile-manifesto", "Agile Manifesto",
        "https://agilemanifesto.org/",
        "The original Agile Manifesto that established the foundation for agile methodologies",
        "website", 10.0,
    )).await?;
    create(&db, evidence(
        "scrum-guide", "The Scrum Guide",
        "https://scrumguides.org/",
        "Official guide to Scrum by Ken Schwaber and Jeff Sutherland",
        "guide", 10.0,
    )).await?;
    create(&db, evidence(
        "devops-handbook", "The DevOps Handbook",
        "https://itrevolution.com/the-devops-handbook/",
        "Comprehensive guide to DevOps practices and principles",
        "book", 9.5,
    )).await?;
    create(&db, evidence(
        "kanban-toyota", "Toyota Production System",
        "https://www.toyota-global.com/company/vision_philosophy/toyota_production_system/",
        "Original source of Kanban methodology from Toyota's manufacturing system",
        "documentation", 9.8,
    )).await?;

    // Link evidence to rules
    let evidence_links = [
        ("daily-scrum-timebox", "scrum-guide"),
        ("daily-scrum-three-questions", "scrum-guide"),
        ("user-story-invest", "agile-manifesto"),
        ("ci-automated-tests", "devops-handbook"),
        ("kanban-wip-limits", "kanban-toyota"),
    ];
    for (rule_name, evidence_name) in evidence_links {
        link(&db, EntityKind::Rule, rule_name, RelKind::SupportedBy, EntityKind::Evidence, evidence_name).await?;
    }

    // Methodology kinship
    let kinship = [
        ("Agile", "Scrum"),
        ("Agile", "Kanban"),
        ("Scrum", "Kanban"),
        ("DevOps", "Agile"),
    ];
    for (from, to) in kinship {
        link(&db, EntityKind::Methodology, from, RelKind::RelatedTo, EntityKind::Methodology, to).await?;
    }

    log::info!("Seed complete");
    Ok(())
}
