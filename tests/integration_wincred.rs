//! Windows Credential Manager integration tests.
//!
//! These tests write to the real credential store of the current logon
//! session, using session persistence and a `credstore-test:` prefix.
//!
//! Run with:
//!   cargo test --test integration_wincred -- --ignored

#![cfg(all(windows, feature = "wincred"))]

use credstore::{
    factory, ApiType, Config, Credential, CredentialManager, CredentialPersistence,
    CredentialType,
};

fn manager() -> CredentialManager {
    factory::new_manager(
        Config::new(ApiType::Win32).with_default_persistence(CredentialPersistence::Session),
    )
    .expect("Failed to create Win32 credential manager")
}

fn target(name: &str) -> String {
    format!("credstore-test:{}:{}", std::process::id(), name)
}

#[test]
#[ignore] // Touches the real credential store
fn test_win32_add_find_delete() {
    let manager = manager();
    let id = target("roundtrip");

    let credential = manager
        .builder(id.as_str())
        .with_username("u1")
        .with_secret("p1")
        .build()
        .unwrap();
    manager.add(&credential).expect("Failed to write credential");

    let found = manager
        .find(&id, CredentialType::Generic)
        .expect("Failed to read credential")
        .expect("Credential should exist");
    assert_eq!(found.username(), "u1");
    assert_eq!(found.secret(), "p1");

    manager.delete(&found).expect("Failed to delete credential");
    assert!(manager.find(&id, CredentialType::Generic).unwrap().is_none());
}

#[test]
#[ignore] // Touches the real credential store
fn test_win32_missing_target() {
    let manager = manager();
    let id = target("missing");

    assert!(manager.find(&id, CredentialType::Generic).unwrap().is_none());
    manager
        .delete_by_id(&id, CredentialType::Generic)
        .expect("Deleting a missing credential should succeed");
}

#[test]
#[ignore] // Touches the real credential store
fn test_win32_find_matching_prefix() {
    let manager = manager();
    let ids: Vec<String> = (0..3).map(|i| target(&format!("enum{}", i))).collect();
    for id in &ids {
        let credential = Credential::builder(id.as_str())
            .with_username("u1")
            .with_secret("p1")
            .with_persistence(CredentialPersistence::Session)
            .build()
            .unwrap();
        manager.add(&credential).unwrap();
    }

    let filter = format!("{}*", target("enum"));
    let found: Vec<String> = manager
        .find_matching(&filter, false)
        .unwrap()
        .map(|c| c.id().to_string())
        .collect();

    for id in &ids {
        manager.delete_by_id(id, CredentialType::Generic).unwrap();
    }
    assert_eq!(found.len(), 3);
}
