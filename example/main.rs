use replicuter::*;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// Built-in workflows, selected by name; any other argument is read as a JSON file.
const SIMPLE_DAG: &str = r#"{
    "A": [],
    "B": ["A"],
    "C": ["A"],
    "D": ["B", "C"]
}"#;

const LINEAR_CHAIN: &str = r#"{
    "T1": [],
    "T2": ["T1"],
    "T3": ["T2"],
    "T4": ["T3"]
}"#;

fn load_dag(arg: Option<String>) -> std::io::Result<String> {
    match arg.as_deref() {
        None | Some("simple") => Ok(SIMPLE_DAG.to_string()),
        Some("linear") => Ok(LINEAR_CHAIN.to_string()),
        Some(path) => std::fs::read_to_string(path),
    }
}

fn print_report(report: &RunReport) {
    println!("{:<12} {:>7}  {:<8} {}", "TASK", "ATTEMPT", "VM", "STATUS");
    for row in &report.log {
        let resource = row.resource.as_ref().map(|r| r.as_str()).unwrap_or("-");
        println!("{:<12} {:>7}  {:<8} {:?}", row.task, row.attempt, resource, row.status);
    }

    println!();
    for (i, round) in report.rounds.iter().enumerate() {
        println!("round {}: {}", i + 1, round.join(", "));
    }
    for (task, resolution) in &report.resolution {
        println!("{} -> {:?}", task, resolution);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let dag = load_dag(args.next())?;
    let config = match args.next() {
        Some(path) => SchedulerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SchedulerConfig {
            max_task_duration_ms: 200,
            ..Default::default()
        },
    };

    let mut scheduler = DagScheduler::from_json(&dag, config)?;
    let ctx = CancellationToken::new();

    let order: Vec<&str> = scheduler.graph().topological_order().collect();
    println!("=== Topological order: {} ===", order.join(" -> "));

    let start = std::time::Instant::now();
    let outcome = scheduler.execute(ctx).await;
    println!("=== Finished in {:?} ===", start.elapsed());

    match outcome {
        Ok(report) => print_report(&report),
        Err(err) => {
            if let Some(report) = err.report() {
                print_report(report);
            }
            return Err(err.into());
        }
    }

    Ok(())
}
