//! Command-line demo of the todo client.
//!
//! Runs against an in-memory service: loads the collection, adds items,
//! toggles one locally and shows how the next refresh replaces that edit
//! with the service's data.

use std::sync::Arc;
use std::time::Duration;
use todo_sync_client::{ClientConfig, TodoClient};
use todo_sync_core::{NewItemPayload, Snapshot, TodoService};
use todo_sync_testing::InMemoryTodoService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_snapshot(title: &str, snapshot: &Snapshot) {
    println!("\n{title} ({}):", snapshot.version);
    if snapshot.is_empty() {
        println!("  (empty)");
    }
    for item in &snapshot.items {
        let status = if item.completed { "✓" } else { " " };
        println!("  [{status}] #{} {}", item.id, item.text);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = ClientConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Todo Sync Demo ===");

    let service = InMemoryTodoService::new();
    let client = TodoClient::new(Arc::new(service.clone()), config);

    let snapshot = client.mount().await?;
    print_snapshot("Mounted", &snapshot);

    println!("\nAdding \"a\"...");
    let added = client.add(NewItemPayload::new("a")).await?;
    print_snapshot("After add", &added.snapshot);

    println!("\nAdding a blank todo...");
    if let Err(error) = client.add(NewItemPayload::new("   ")).await {
        println!("  refused: {error}");
    }

    println!("\nToggling #{} locally...", added.created.id);
    let toggled = client
        .toggle(added.snapshot.version, &added.created)
        .await?;
    print_snapshot("After toggle", &client.snapshot().await);

    // Another client completes the same item and adds one of its own
    service.set_completed(toggled.id, true);
    let other = service.create_item(NewItemPayload::new("b")).await?;

    println!("\nRefreshing...");
    let snapshot = client.refresh().await?;
    print_snapshot("After refresh", &snapshot);

    println!("\nToggling #{} with the pre-refresh version...", other.id);
    if let Err(error) = client.toggle(added.snapshot.version, &other).await {
        println!("  refused: {error}");
    }

    println!(
        "\nService calls: {} create, {} list",
        service.create_calls(),
        service.list_calls()
    );

    client.shutdown(Duration::from_secs(5)).await?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
