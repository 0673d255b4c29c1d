use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snapwatch_notify::{LogNotifier, Notifier};
use snapwatch_runner::{Check, RunReport, Runner, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "snapwatch", version, about = "Watch pages for changes and email what is new")]
struct Cli {
    /// Config file (TOML, or YAML by extension)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an example config (never overwrites)
    Init,

    /// Collect, diff, notify and save
    Run {
        #[arg(long)]
        target: Option<String>,
        #[arg(long, conflicts_with = "target")]
        all: bool,
        /// Print the message instead of sending it; nothing is saved
        #[arg(long)]
        dry_run: bool,
    },

    /// Collect and diff against the stored baseline, print the planned message
    Check {
        #[arg(long)]
        target: String,
    },

    /// Print the stored snapshot of a target
    Show {
        #[arg(long)]
        target: String,
    },

    /// List stored baselines
    Status,

    /// Print the recorded run history of a target, oldest first
    History {
        #[arg(long)]
        target: String,
    },

    /// Forget a target's baseline; its next run is a first run
    Reset {
        #[arg(long)]
        target: String,
    },
}

fn print_report(r: &RunReport) {
    println!(
        "{}: {} entities, +{} -{} ~{}{}{}",
        r.target,
        r.entities,
        r.added,
        r.removed,
        r.changed,
        if r.matched > 0 { format!(", {} matching", r.matched) } else { String::new() },
        if r.alerted { ", notified" } else { "" },
    );
}

fn print_check(c: &Check) {
    print_report(&c.report);
    match &c.plan.message {
        Some(m) => println!("\nSubject: {}\n\n{}", m.subject, m.body),
        None => println!("nothing to send"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    tracing::debug!(config = %cli.config.display(), "using config");

    match cli.cmd {
        Command::Init => {
            if Runner::init(&cli.config)? {
                println!("Wrote example config to {}", cli.config.display());
            } else {
                println!("{} already exists; left unchanged", cli.config.display());
            }
        }
        Command::Run { target, all, dry_run } => {
            let r = Runner::open(&cli.config)?;
            let names: Vec<String> = match (target, all) {
                (Some(name), _) => vec![name],
                (None, true) => r.cfg.targets.iter().map(|t| t.name.to_string()).collect(),
                (None, false) => bail!("pass --target NAME or --all"),
            };

            if dry_run {
                let log = LogNotifier;
                for name in &names {
                    let check = r.check(name)?;
                    print_report(&check.report);
                    if let Some(message) = &check.plan.message {
                        log.send(message)?;
                    }
                }
            } else if all {
                for report in r.run_all()? {
                    print_report(&report);
                }
            } else {
                for name in &names {
                    print_report(&r.run(name)?);
                }
            }
        }
        Command::Check { target } => {
            let r = Runner::open(&cli.config)?;
            print_check(&r.check(&target)?);
        }
        Command::Show { target } => {
            let r = Runner::open(&cli.config)?;
            match r.show(&target)? {
                Some(snap) => {
                    println!("{}", serde_json::to_string_pretty(&snap)?);
                    println!("fingerprint: {}", snap.fingerprint());
                }
                None => println!("No snapshot stored for {}", target),
            }
        }
        Command::Status => {
            let r = Runner::open(&cli.config)?;
            let stored = r.status()?;
            println!("Configured targets: {}", r.cfg.targets.len());
            for s in &stored {
                let note = if s.configured { "" } else { " (not in config)" };
                println!("- {} [{} entities] {}{}", s.name, s.entities, &s.fingerprint[..12.min(s.fingerprint.len())], note);
            }
            for t in r.cfg.targets.iter().filter(|t| !stored.iter().any(|s| s.name == t.name)) {
                println!("- {} [never run]", t.name);
            }
        }
        Command::History { target } => {
            let r = Runner::open(&cli.config)?;
            let entries = r.history(&target)?;
            if entries.is_empty() {
                println!("No history recorded for {}", target);
            }
            for e in &entries {
                println!("{} run {} [{} entities]", e.recorded_at, e.run_id, e.snapshot.len());
                for (id, record) in e.snapshot.iter() {
                    let fields: Vec<String> = record.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    println!("  {}  {}", id, fields.join(" "));
                }
            }
        }
        Command::Reset { target } => {
            let r = Runner::open(&cli.config)?;
            if r.reset(&target)? {
                println!("Removed baseline for {}", target);
            } else {
                println!("No baseline stored for {}", target);
            }
        }
    }

    Ok(())
}
