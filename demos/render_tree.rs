//! Render Tree Example - mount, update and print a host tree
//!
//! This example renders a small description into the in-memory host,
//! prints it with the terminal printer, then applies an update and dumps
//! the host operations it produced as JSON.
//!
//! Run with: RUST_LOG=spark_fiber=debug cargo run --example render_tree

use std::io::{self, Write};

use spark_fiber::host::terminal;
use spark_fiber::{create_root, Element, MemoryHost, ReconcilerConfig, Scheduler};

fn title(greeting: &str, color: &str) -> Element {
    Element::host("h1")
        .attr("title", "hello world")
        .child(format!("{greeting} "))
        .child(
            Element::host("span")
                .style("color", color)
                .attr("className", "barClass")
                .text("world"),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut host = MemoryHost::new();
    let container = host.create_container();
    let root = create_root(host, container, ReconcilerConfig::from_env());
    let mut scheduler = Scheduler::new();

    println!("=== spark-fiber Render Tree Example ===\n");

    // Mount
    root.render(title("hello", "cyan"), &mut scheduler)?;
    while scheduler.run_frame()? {}

    let mut stdout = io::stdout();
    root.with_host(|host| terminal::write_tree(&mut stdout, host, container))?;
    println!("\nmarkup: {}", root.with_host(|host| host.to_markup(container)));
    let mounted = root.with_host_mut(|host| host.take_ops());
    println!("mount: {} host operations", mounted.len());

    // Update: one text node and one style change
    root.render(title("goodbye", "magenta"), &mut scheduler)?;
    scheduler.run_until_idle()?;

    println!();
    root.with_host(|host| terminal::write_tree(&mut stdout, host, container))?;
    let updated = root.with_host_mut(|host| host.take_ops());
    println!("\nupdate operations:");
    println!("{}", serde_json::to_string_pretty(&updated)?);

    println!("\nsnapshot:");
    println!(
        "{}",
        serde_json::to_string_pretty(&root.with_host(|host| host.snapshot(container)))?
    );

    let fibers = root.with_root(|fiber_root| fiber_root.arena().len());
    println!("\nfibers alive after {} commits: {fibers}", root.with_root(|r| r.commit_count()));
    stdout.flush()?;
    Ok(())
}
