/// bbctl - Blackboard command line driver
///
/// Runs blackboards in-process on a local bus so their replication can be
/// watched without any external transport.
///
/// Usage:
///   bbctl simulate [--nodes N] [--steps S] [--capacity C] [--late-join]
///   bbctl config <file.json>
use anyhow::{Context, Result};
use blackboard::prelude::*;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Blackboard - shared, replicated observations
#[derive(Parser)]
#[command(name = "bbctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate robots sharing poses over a local bus
    ///
    /// Examples:
    ///   bbctl simulate --nodes 3 --steps 20
    ///   bbctl simulate --late-join
    Simulate {
        /// Number of blackboards
        #[arg(short, long, default_value_t = 3)]
        nodes: usize,

        /// Writes per blackboard
        #[arg(short, long, default_value_t = 20)]
        steps: usize,

        /// History capacity per key (0 = unbounded)
        #[arg(short, long, default_value_t = 10)]
        capacity: usize,

        /// Connect peers after keys exist (shows the announcement gap)
        #[arg(long)]
        late_join: bool,
    },

    /// Validate a JSON configuration file and print it
    Config {
        /// Path to the configuration file
        path: PathBuf,
    },
}

struct Node {
    blackboard: Blackboard,
    pose: Key,
    status: Key,
    pose_updates: Arc<AtomicUsize>,
}

fn robot_id(index: usize) -> String {
    format!("robot{}", index + 1)
}

/// Register the shared keys and a pose-update counter.
fn register(blackboard: Blackboard, capacity: usize) -> Result<Node> {
    let pose = blackboard.add_key_with("pose", Some(Arc::new(BincodeSerializer)), capacity);
    let status = blackboard.add_key_with("status", Some(Arc::new(JsonSerializer)), capacity);

    let pose_updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pose_updates);
    blackboard
        .add_trigger(pose, move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .context("Failed to register trigger")?;

    Ok(Node {
        blackboard,
        pose,
        status,
        pose_updates,
    })
}

fn connect(blackboard: &Blackboard, ids: &[String]) -> Result<()> {
    for id in ids.iter().filter(|id| id.as_str() != blackboard.id()) {
        blackboard
            .add_external(id)
            .with_context(|| format!("Failed to connect to {}", id))?;
    }
    Ok(())
}

fn drain_all(nodes: &[Node]) -> (usize, usize) {
    nodes.iter().fold((0, 0), |(keys, values), node| {
        (
            keys + node.blackboard.update_connections(),
            values + node.blackboard.update_values(),
        )
    })
}

fn simulate(nodes: usize, steps: usize, capacity: usize, late_join: bool) -> Result<()> {
    let bus = LocalBus::shared();

    let ids: Vec<String> = (0..nodes).map(robot_id).collect();
    let streams = |fleet: &[Node]| -> usize {
        fleet
            .iter()
            .map(|n| n.blackboard.stats().value_subscriptions)
            .sum()
    };

    let mut fleet = Vec::with_capacity(nodes);
    if late_join {
        for id in &ids {
            fleet.push(register(Blackboard::with_id(id.clone(), bus.clone()), capacity)?);
        }
        for node in &fleet {
            connect(&node.blackboard, &ids)?;
        }
        drain_all(&fleet);
        println!(
            "{} peers connected after registration: {} value streams linked",
            "!".yellow().bold(),
            streams(&fleet)
        );

        for node in &fleet {
            node.blackboard.announce_keys()?;
        }
        drain_all(&fleet);
        println!("  after explicit announce: {} value streams linked", streams(&fleet));
    } else {
        // Connect first so every registration announcement is heard.
        for id in &ids {
            let blackboard = Blackboard::with_id(id.clone(), bus.clone());
            connect(&blackboard, &ids)?;
            fleet.push(register(blackboard, capacity)?);
        }
        drain_all(&fleet);
    }

    for step in 0..steps {
        let t = step as f64 * 0.1;
        for (i, node) in fleet.iter().enumerate() {
            let angle = t + i as f64;
            node.blackboard.set_value(
                node.pose,
                t,
                Pose::planar(angle.cos() * (i + 1) as f64, angle.sin() * (i + 1) as f64, angle),
            )?;
            if step % 5 == 0 {
                node.blackboard.set_value(
                    node.status,
                    t,
                    serde_json::json!({ "step": step, "ok": true }),
                )?;
            }
        }
        drain_all(&fleet);
    }

    println!();
    println!("{}", "Blackboards".bold());
    for node in &fleet {
        let bb = &node.blackboard;
        let stats = bb.stats();
        println!(
            "  {}  keys={} entries={} peers={} streams={} dropped={}",
            bb.id().cyan(),
            stats.key_count,
            stats.total_entries,
            stats.peer_count,
            stats.value_subscriptions,
            stats.dropped_values
        );
        println!(
            "    pose: {} entries, {} trigger calls",
            bb.entry_count(node.pose),
            node.pose_updates.load(Ordering::Relaxed)
        );
        if let Some(latest) = bb.latest(node.pose) {
            if let Ok(pose) = latest.value.get::<Pose>() {
                println!(
                    "    latest pose at {}: ({:.2}, {:.2}, yaw {:.2})",
                    latest.timestamp, pose.x, pose.y, pose.yaw
                );
            }
        }
    }
    println!();
    println!(
        "{} {} messages published",
        "OK".green().bold(),
        bus.published_count()
    );
    Ok(())
}

fn show_config(path: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = BlackboardConfig::from_json_str(&text)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    println!("{}", "OK".green().bold());
    println!(
        "  id: {}",
        config.id.as_deref().unwrap_or("(generated)").cyan()
    );
    println!("  default capacity: {}", config.default_capacity);
    println!("  peers: {}", config.peers.join(", "));
    println!("  keys:");
    for key in &config.keys {
        let capacity = key.capacity.unwrap_or(config.default_capacity);
        println!(
            "    {:<20} capacity={:<6} serializer={:?}",
            key.name, capacity, key.serializer
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate {
            nodes,
            steps,
            capacity,
            late_join,
        } => simulate(nodes, steps, capacity, late_join),
        Commands::Config { path } => show_config(&path),
    }
}
