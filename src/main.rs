use clap::Parser;
use invigil::config::{ConfigStore, FileConfigStore, MonitorConfig};
use invigil::grading::SimulatedGrader;
use invigil::report::SessionReport;
use invigil::runtime::dispatch;
use invigil::script::parse_script;
use invigil::session::{GrantedScreen, IntegritySessionController, SessionState};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

const DEFAULT_QUESTION: &str = "Given an array of integers 'nums' and an integer 'target', \
return indices of the two numbers such that they add up to target.";

const CODE_SCAFFOLD: &str = "# Write your solution here...\ndef solve_challenge():\n    pass";

/// headless replay harness for the exam-integrity monitoring engine
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Replays a JSON-lines telemetry script against a fresh integrity session, \
printing every lifecycle transition and the final session report."
)]
struct Cli {
    /// replay script (JSON lines) to drive the session
    #[clap(short = 's', long)]
    script: PathBuf,

    /// monitor config (JSON); built-in defaults when omitted
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// append a summary row to log.csv in this directory
    #[clap(long)]
    report_dir: Option<PathBuf>,

    /// write the full session report as JSON to this path
    #[clap(long)]
    json_report: Option<PathBuf>,

    /// exam question handed to the grader
    #[clap(short = 'q', long, default_value = DEFAULT_QUESTION)]
    question: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FileConfigStore::with_path(path).load(),
        None => MonitorConfig::default(),
    };

    let steps = parse_script(BufReader::new(File::open(&cli.script)?))?;

    let base = SystemTime::now();
    let mut controller = IntegritySessionController::new(
        config,
        cli.question.clone(),
        CODE_SCAFFOLD,
        Box::new(SimulatedGrader),
        Box::new(GrantedScreen::default()),
        base,
    );

    let mut last_state: Option<SessionState> = None;
    controller.subscribe(Box::new(move |snapshot| {
        if last_state != Some(snapshot.state) {
            println!(
                "-> {} (trust {}%, strikes {})",
                snapshot.state, snapshot.trust_score, snapshot.strike_count
            );
            last_state = Some(snapshot.state);
        }
    }));

    let mut clock = base;
    for step in &steps {
        let event = step.to_monitor_event(base)?;
        dispatch(&mut controller, event);
        clock = base + Duration::from_millis(step.at_ms);
    }

    let report = SessionReport::from_controller(&controller, clock);
    println!("{}", report.summary_line());
    for line in report.violations.iter().rev() {
        println!("  {}", line);
    }

    if let Some(dir) = &cli.report_dir {
        let path = report.append_csv_summary(Some(dir))?;
        println!("summary appended to {}", path.display());
    }
    if let Some(path) = &cli.json_report {
        report.write_json(path)?;
        println!("report written to {}", path.display());
    }

    Ok(())
}
