use std::env;
use std::process;
use wake::mission::topology;
use wake::persistence::Persistence;
use wake::{init, run, Advisor, ConfigManager, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    wake::utils::logging::init_logger()?;

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <plan_file> [run|validate|info] [--state <file>]",
            args[0]
        );
        process::exit(1);
    }

    let config_path = &args[1];
    let command = args.get(2).map(String::as_str).unwrap_or("run");
    let state_path = args
        .iter()
        .position(|arg| arg == "--state")
        .and_then(|i| args.get(i + 1));

    match command {
        "validate" => {
            let plan = ConfigManager::load_config(config_path)?;
            for mission in &plan.missions {
                let issues = topology::analyze(&mission.steps);
                println!("{}: {} issue(s)", mission.name, issues.len());
                for issue in issues {
                    println!("  - {}", issue);
                }
            }
        }
        "run" => {
            let pipeline = init(config_path).await?;
            let advisor = Advisor::new(pipeline.registry().clone());

            log::info!("Starting mission execution");
            for (mission_id, report) in run(&pipeline).await {
                println!("{}", serde_json::to_string_pretty(&report)?);
                if let Some(mission) = pipeline.registry().get_mission(&mission_id).await {
                    for step in &mission.steps {
                        if let Some(s) = advisor
                            .get_ai_strategy_recommendation(&mission_id, &step.id)
                            .await
                        {
                            println!("  {} -> {} ({:.2})", step.id, s.recommendation, s.confidence);
                        }
                    }
                }
            }
            log::info!("Mission execution completed");

            if let Some(path) = state_path {
                Persistence::new(path).save_state(pipeline.registry()).await?;
            }
        }
        "info" => {
            let pipeline = init(config_path).await?;
            if let Some(path) = state_path {
                Persistence::new(path).restore_into(pipeline.registry()).await?;
            }
            for mission in pipeline.registry().get_missions().await {
                println!(
                    "{} ({}) status={} progress={}%",
                    mission.name, mission.id, mission.status, mission.progress
                );
                for step in &mission.steps {
                    println!(
                        "  [{}] {} {} retries={}/{}",
                        step.status, step.id, step.kind, step.retry_count, step.max_retries
                    );
                }
            }
        }
        _ => {
            eprintln!("Error: Unknown command. Available commands: run, validate, info");
            process::exit(1);
        }
    }

    Ok(())
}
