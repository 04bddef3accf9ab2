//! dispenser-runner: headless driver for the prize dispenser.
//!
//! Usage:
//!   dispenser-runner --config machine.json --db quota.db --seed 12345 --spins 50
//!   dispenser-runner --config machine.json --db quota.db --ipc-mode

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dispenser_core::{
    clock::SystemClock,
    config::DispenserConfig,
    dispenser::Dispenser,
    event::DispenserEvent,
    planner::{PlanTier, SpinPlan},
    scheduler::DEFAULT_POLL_INTERVAL,
    store::QuotaStore,
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Spin,
    Reset,
    GetState,
    Quit,
}

#[derive(serde::Serialize)]
struct SpinReply {
    stops:    Vec<usize>,
    symbols:  Vec<String>,
    prize_id: Option<String>,
    label:    Option<String>,
    outcome:  &'static str,
    tier:     PlanTier,
}

#[derive(serde::Serialize)]
struct QuotaView {
    cap:       u32,
    consumed:  u32,
    remaining: u32,
}

#[derive(serde::Serialize)]
struct UiState {
    spins_served: u64,
    last_reset:   Option<DateTime<Utc>>,
    quota:        BTreeMap<String, QuotaView>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let spins = parse_arg(&args, "--spins", 20u64);
    let poll_secs = parse_arg(&args, "--poll-secs", DEFAULT_POLL_INTERVAL.as_secs());
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let config_path = flag_value(&args, "--config");

    let config = match config_path {
        Some(path) => DispenserConfig::load(path)?,
        None => DispenserConfig::default_machine(),
    };
    config.validate().context("configuration rejected")?;

    if !ipc_mode {
        println!("Prize dispenser: dispenser-runner");
        println!("  config:  {}", config_path.unwrap_or("(built-in machine)"));
        println!("  seed:    {seed}");
        println!("  spins:   {spins}");
        println!("  db:      {db}");
        println!();
    }

    let store = if db == ":memory:" {
        QuotaStore::in_memory()?
    } else {
        QuotaStore::open(db)?
    };
    let dispenser = Dispenser::build(config, seed, Some(store), Arc::new(SystemClock))?;

    if ipc_mode {
        let scheduler = dispenser.scheduler()?.spawn(Duration::from_secs(poll_secs.max(1)))?;
        forward_events(&dispenser)?;
        run_ipc_loop(&dispenser)?;
        scheduler.stop();
    } else {
        for _ in 0..spins {
            let plan = dispenser.spin();
            print_spin(&dispenser, &plan);
        }
        print_summary(&dispenser)?;
    }

    dispenser.flush()?;
    Ok(())
}

fn run_ipc_loop(dispenser: &Dispenser) -> Result<()> {
    let stdin = io::stdin();
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
                emit(&serde_json::json!({ "error": e.to_string() }))?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Spin => {
                let plan = dispenser.spin();
                emit(&spin_reply(dispenser, &plan))?;
            }
            IpcCommand::Reset => {
                dispenser.reset_quota();
                emit(&build_ui_state(dispenser))?;
            }
            IpcCommand::GetState => emit(&build_ui_state(dispenser))?,
        }
    }
    Ok(())
}

/// Print reset and persistence events as they happen, one JSON line each.
fn forward_events(dispenser: &Dispenser) -> Result<()> {
    let rx = dispenser.subscribe();
    std::thread::Builder::new()
        .name("event-forward".into())
        .spawn(move || {
            for event in rx {
                if !matches!(
                    event,
                    DispenserEvent::QuotaReset { .. } | DispenserEvent::PersistenceFailed { .. }
                ) {
                    continue;
                }
                if let Err(e) = emit(&serde_json::json!({ "event": &event })) {
                    log::warn!("could not forward {} event: {e}", event.type_name());
                }
            }
        })?;
    Ok(())
}

fn emit<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn spin_reply(dispenser: &Dispenser, plan: &SpinPlan) -> SpinReply {
    SpinReply {
        stops: plan.stops.clone(),
        symbols: dispenser.visible_symbols(plan).unwrap_or_default(),
        prize_id: plan.prize_id().map(str::to_string),
        label: plan.prize.as_ref().map(|p| p.label.clone()),
        outcome: plan.outcome.name(),
        tier: plan.tier,
    }
}

fn build_ui_state(dispenser: &Dispenser) -> UiState {
    let snapshot = dispenser.quota_snapshot();
    let quota = dispenser
        .config()
        .prizes
        .iter()
        .map(|p| {
            let view = QuotaView {
                cap: p.daily_max,
                consumed: snapshot.consumed(&p.id),
                remaining: dispenser.remaining(&p.id),
            };
            (p.id.clone(), view)
        })
        .collect();

    UiState {
        spins_served: dispenser.spins_served(),
        last_reset: snapshot.last_reset,
        quota,
    }
}

fn print_spin(dispenser: &Dispenser, plan: &SpinPlan) {
    let symbols = dispenser.visible_symbols(plan).unwrap_or_default().join(" | ");
    let prize = plan
        .prize
        .as_ref()
        .map(|p| format!("{} ({})", p.label, p.id))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<28} {:<16} {:<12} {prize}",
        symbols,
        plan.outcome.name(),
        format!("{:?}", plan.tier)
    );
}

fn print_summary(dispenser: &Dispenser) -> Result<()> {
    let state = build_ui_state(dispenser);

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  seed:         {:#x}", dispenser.seed());
    println!("  spins served: {}", state.spins_served);
    match state.last_reset {
        Some(at) => println!("  last reset:   {at}"),
        None => println!("  last reset:   (never)"),
    }

    if let Some(persister) = dispenser.persister() {
        let logged = persister.with_store(|s| s.spin_count())??;
        println!("  spins logged: {logged}");
    }

    println!();
    println!("=== QUOTA ===");
    for (id, view) in &state.quota {
        println!(
            "  {id:<16} {:>5} / {:<5} remaining {}",
            view.consumed, view.cap, view.remaining
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
