//! Terminal demo - usual and exclusive tasks sharing one pool
//!
//! Run with `RUST_LOG=thread_terminal=debug` to watch every transition.

use std::thread;
use std::time::Duration;
use thread_terminal::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Terminal Demo ===\n");

    let config = Config::builder()
        .name("demo")
        .pool_size(4)
        .self_test(true)
        .build()
        .expect("Failed to build config");
    let terminal = Terminal::new(config).expect("Failed to create terminal");

    // A handful of usual reports, then a migration that must run alone.
    let reports: Vec<_> = (0..6)
        .map(|i| {
            terminal
                .submit(
                    move || {
                        thread::sleep(Duration::from_millis(20));
                        format!("report {} ready", i)
                    },
                    "report",
                    Priority::LOW,
                    false,
                )
                .expect("submit failed")
        })
        .collect();

    let migration = terminal
        .submit(
            || {
                thread::sleep(Duration::from_millis(50));
                "schema migrated"
            },
            "migration",
            Priority::HIGH,
            true,
        )
        .expect("submit failed");

    thread::sleep(Duration::from_millis(10));
    println!("While running: {}", terminal.snapshot());

    let migration_name = migration.name().to_string();
    println!("{} -> {:?}", migration_name, migration.join());
    for report in reports {
        let name = report.name().to_string();
        println!("{} -> {:?}", name, report.join());
    }

    // A batch that has to run exclusively, one member at a time.
    let batch: Vec<_> = (1..=3)
        .map(|step| {
            (
                move || {
                    thread::sleep(Duration::from_millis(10));
                    step
                },
                format!("compact-{}", step),
            )
        })
        .collect();
    let steps = terminal
        .invoke_all(batch, Priority::HIGH, true)
        .expect("batch rejected");
    println!("Compaction finished {} steps", steps.len());

    terminal.shutdown();
    terminal.await_termination(Duration::from_secs(5));

    let state = terminal.snapshot();
    println!("\nFinal: {}", state);
    println!(
        "Recorded {} transitions, {} atomicity breaks",
        terminal.state_history().len(),
        terminal.atomicity_breaks()
    );
}
