//! scenario-runner: headless what-if runner for the r* scenario engine.
//!
//! Usage:
//!   scenario-runner --sims 10000 --seed 12345
//!   scenario-runner --calibration data/calibration/reference.json \
//!                   --request data/requests/worked_scenario.json --json
//!   scenario-runner --ipc-mode

use anyhow::{Context, Result};
use clap::Parser;
use rstar_scenario_core::{
    rng::entropy_seed, CalibrationConfig, ScenarioEngine, SimulationRequest, SimulationResult,
};
use std::io::{self, BufRead, Write};

#[derive(Parser, Debug)]
#[command(name = "scenario-runner", version, about = "Correlated r* scenario simulation")]
struct Args {
    /// Calibration JSON. Defaults to the built-in reference calibration.
    #[arg(long)]
    calibration: Option<String>,

    /// Request JSON. Defaults to the reference worked scenario.
    #[arg(long)]
    request: Option<String>,

    /// Override the request's simulation count.
    #[arg(long)]
    sims: Option<usize>,

    /// Override the request's master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Run on the calling thread only.
    #[arg(long)]
    sequential: bool,

    /// Print the export envelope as JSON instead of the summary table.
    #[arg(long)]
    json: bool,

    /// Read JSON-line commands from stdin, answer one JSON line each.
    #[arg(long)]
    ipc_mode: bool,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Run { request: SimulationRequest },
    Calibration,
    Quit,
}

/// What the report exporter receives.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportEnvelope<'a> {
    run_id:       String,
    generated_at: String,
    seed:         u64,
    result:       &'a SimulationResult,
}

impl<'a> ExportEnvelope<'a> {
    fn new(seed: u64, result: &'a SimulationResult) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            seed,
            result,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let calibration = match &args.calibration {
        Some(path) => CalibrationConfig::load(path)?,
        None => CalibrationConfig::reference(),
    };
    let engine = ScenarioEngine::new(calibration)?.with_parallelism(!args.sequential);

    if args.ipc_mode {
        return run_ipc_loop(&engine);
    }

    let mut request = match &args.request {
        Some(path) => load_request(path)?,
        None => SimulationRequest::reference(),
    };
    if let Some(n) = args.sims {
        request.num_sims = n;
    }
    if args.seed.is_some() {
        request.seed = args.seed;
    }

    let seed = request.seed.unwrap_or_else(entropy_seed);
    let result = engine.run_seeded(&request, seed)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ExportEnvelope::new(seed, &result))?);
    } else {
        print_summary(&result, seed);
    }
    Ok(())
}

fn load_request(path: &str) -> Result<SimulationRequest> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    SimulationRequest::from_json(&content).with_context(|| format!("Cannot parse {path}"))
}

fn run_ipc_loop(engine: &ScenarioEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Calibration => {
                writeln!(stdout, "{}", serde_json::to_string(engine.calibration())?)?;
            }
            IpcCommand::Run { request } => {
                let seed = request.seed.unwrap_or_else(entropy_seed);
                match engine.run_seeded(&request, seed) {
                    Ok(result) => {
                        let envelope = ExportEnvelope::new(seed, &result);
                        writeln!(stdout, "{}", serde_json::to_string(&envelope)?)?;
                    }
                    Err(e) => {
                        log::warn!("scenario rejected: {e}");
                        write_error(&mut stdout, &e.to_string())?;
                    }
                }
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn write_error(out: &mut impl Write, message: &str) -> Result<()> {
    writeln!(out, "{}", serde_json::json!({ "error": message }))?;
    out.flush()?;
    Ok(())
}

fn print_summary(result: &SimulationResult, seed: u64) {
    println!("=== SCENARIO SUMMARY ===");
    println!("  simulations:    {} / {}", result.simulations, result.requested);
    println!("  seed:           {seed}");
    println!();
    println!("  baseline r*:    {:.2}%", result.baseline.composite_rstar);
    println!("  baseline SELIC*: {:.2}%", result.baseline.policy_rate);
    println!();
    println!("  mean r*:        {:.2}%", result.mean);
    println!("  median r*:      {:.2}%", result.median);
    println!("  std:            {:.2}", result.std);
    println!(
        "  p5/p25/p75/p95: {:.2} / {:.2} / {:.2} / {:.2}",
        result.p5, result.p25, result.p75, result.p95
    );
    println!("  P(r* > 6%):     {:.2}", result.prob_above_6);
    println!("  P(r* < 3%):     {:.2}", result.prob_below_3);
    println!(
        "  SELIC* mean:    {:.2}% (p5 {:.2}, p95 {:.2})",
        result.mean_derived_policy_rate, result.policy_p5, result.policy_p95
    );

    println!();
    println!("=== DISTRIBUTION ===");
    let peak = result.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for bin in &result.histogram {
        let bar = "#".repeat(bin.count * 40 / peak);
        println!("  [{:>6.2}, {:>6.2}) {:>7} {bar}", bin.start, bin.end, bin.count);
    }
}
