//! Basic credential manager usage.
//!
//! Uses the Win32 API on Windows and the in-memory API elsewhere; set
//! `CREDSTORE_API=mock` to force the latter.
//!
//! Run with: cargo run --example basic

use credstore::{factory, Config, CredentialStore, CredentialType};

fn main() -> credstore::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Credential Manager Example ===\n");

    let config = Config::from_env()?;
    let manager = factory::new_manager(config)?;
    println!("Using API: {}\n", manager.name());

    let id = "credstore-demo:svc@host";
    let credential = manager
        .builder(id)
        .with_username("u1")
        .with_secret("p1")
        .build()?;

    println!("Writing '{}'...", id);
    manager.add(&credential)?;
    println!("✓ Written");

    match manager.find(id, CredentialType::Generic)? {
        Some(found) => println!("✓ Found: {} (secret is {} chars)", found, found.secret().len()),
        None => println!("✗ Not found"),
    }

    println!("\nCredentials matching 'credstore-demo:*':");
    for credential in manager.find_matching("credstore-demo:*", false)? {
        println!("  - {}", credential);
    }

    println!("\nDeleting '{}'...", id);
    manager.delete(&credential)?;
    manager.delete(&credential)?;
    println!("✓ Deleted (twice, the second is a no-op)");

    Ok(())
}
