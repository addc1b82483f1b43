//! Credential manager tests against the in-memory API.
//!
//! Run with:
//!   cargo test --test credential_manager
//!
//! Set `RUST_LOG=credstore=debug` to see the anomaly log.

#![cfg(feature = "mock")]

use credstore::native::mock::{MockCredentialApi, MockRecord, Operation};
use credstore::native::{CountingMarshaler, ErrorCode};
use credstore::{
    CredStoreError, Credential, CredentialManager, CredentialPersistence, CredentialType,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    api: Arc<MockCredentialApi>,
    marshaler: Arc<CountingMarshaler>,
    manager: CredentialManager,
}

impl Fixture {
    fn new() -> Self {
        init_logging();
        let api = Arc::new(MockCredentialApi::new());
        let marshaler = Arc::new(CountingMarshaler::new());
        let manager = CredentialManager::with_marshaler(api.clone(), marshaler.clone());
        Self {
            api,
            marshaler,
            manager,
        }
    }

    fn seed(&self, id: &str) {
        self.api.seed(&credential(id, "u1", "p1"));
    }

    fn assert_no_leaks(&self) {
        assert_eq!(self.api.live_buffers(), 0, "OS buffers left unfreed");
        assert_eq!(
            self.marshaler.allocations(),
            self.marshaler.frees(),
            "marshaler allocations left unfreed"
        );
    }
}

fn credential(id: &str, username: &str, secret: &str) -> Credential {
    Credential::builder(id)
        .with_username(username)
        .with_secret(secret)
        .build()
        .unwrap()
}

#[test]
fn test_seed_find_delete_scenario() {
    let fx = Fixture::new();
    fx.seed("svc@host");

    let found = fx
        .manager
        .find("svc@host", CredentialType::Generic)
        .unwrap()
        .expect("seeded credential should be found");
    assert_eq!(found.username(), "u1");
    assert_eq!(found.secret(), "p1");

    fx.manager
        .delete_by_id("svc@host", CredentialType::Generic)
        .unwrap();
    assert!(fx
        .manager
        .find("svc@host", CredentialType::Generic)
        .unwrap()
        .is_none());

    fx.assert_no_leaks();
}

#[test]
fn test_add_then_find() {
    let fx = Fixture::new();
    let original = Credential::builder("git:https://example.com")
        .with_username("octocat")
        .with_secret("ghp_\u{1F512}token")
        .with_type(CredentialType::DomainVisiblePassword)
        .with_persistence(CredentialPersistence::Enterprise)
        .build()
        .unwrap();

    fx.manager.add(&original).unwrap();
    let found = fx
        .manager
        .find("git:https://example.com", CredentialType::DomainVisiblePassword)
        .unwrap()
        .unwrap();

    assert_eq!(found.id(), original.id());
    assert_eq!(found.username(), original.username());
    assert_eq!(found.secret(), original.secret());
    assert_eq!(found.persistence(), CredentialPersistence::Enterprise);

    // One intermediate secret block plus one write envelope.
    assert_eq!(fx.marshaler.allocations(), 2);
    fx.assert_no_leaks();
}

#[test]
fn test_delete_missing_is_idempotent() {
    let fx = Fixture::new();
    let missing = credential("nobody@nowhere", "u1", "p1");

    fx.manager.delete(&missing).unwrap();
    fx.manager.delete(&missing).unwrap();
    assert_eq!(fx.api.calls().delete, 2);
}

#[test]
fn test_find_missing_is_absent() {
    let fx = Fixture::new();
    let result = fx.manager.find("svc@host", CredentialType::Generic);
    assert!(matches!(result, Ok(None)));
    fx.assert_no_leaks();
}

#[test]
fn test_enumerate_yields_each_seeded_credential_once() {
    let fx = Fixture::new();
    let ids: Vec<String> = (0..25).map(|i| format!("svc{:02}@host", i)).collect();
    for id in &ids {
        fx.seed(id);
    }

    let mut seen = HashSet::new();
    for credential in fx.manager.credentials().unwrap() {
        assert!(seen.insert(credential.id().to_string()), "duplicate {}", credential.id());
    }

    assert_eq!(seen, ids.into_iter().collect::<HashSet<_>>());
    assert_eq!(fx.api.calls().free, 1);
    fx.assert_no_leaks();
}

#[test]
fn test_enumerate_abandoned_early_frees_buffer() {
    let fx = Fixture::new();
    for id in ["a@host", "b@host", "c@host"] {
        fx.seed(id);
    }

    {
        let mut credentials = fx.manager.credentials().unwrap();
        assert_eq!(credentials.reported_count(), 3);
        assert!(credentials.next().is_some());
        assert_eq!(fx.api.live_buffers(), 1);
    }

    assert_eq!(fx.api.calls().free, 1);
    fx.assert_no_leaks();
}

#[test]
fn test_enumerate_stops_on_decode_failure() {
    let fx = Fixture::new();
    fx.seed("a@host");
    fx.seed("c@host");
    fx.api.seed_record(MockRecord {
        target_name: vec![u16::from(b'b'), 0xD800],
        ..MockRecord::new("")
    });

    let ids: Vec<String> = fx
        .manager
        .credentials()
        .unwrap()
        .map(|c| c.id().to_string())
        .collect();

    assert_eq!(ids, vec!["a@host"]);
    assert_eq!(fx.api.calls().free, 1);
    fx.assert_no_leaks();
}

#[test]
fn test_find_frees_buffer_on_decode_failure() {
    let fx = Fixture::new();
    fx.api.seed_record(MockRecord {
        user_name: Some(vec![u16::from(b'u'), 0xD800]),
        ..MockRecord::new("svc@host")
    });

    let err = fx
        .manager
        .find("svc@host", CredentialType::Generic)
        .unwrap_err();

    assert!(matches!(err, CredStoreError::Decode(_)));
    assert_eq!(fx.api.calls().read, 1);
    assert_eq!(fx.api.calls().free, 1);
    fx.assert_no_leaks();
}

#[test]
fn test_secret_with_trailing_nul_round_trips() {
    let fx = Fixture::new();
    fx.manager
        .add(&credential("svc@host", "u1", "p1\0"))
        .unwrap();

    let found = fx
        .manager
        .find("svc@host", CredentialType::Generic)
        .unwrap()
        .unwrap();
    assert_eq!(found.secret(), "p1\0");
    fx.assert_no_leaks();
}

#[test]
fn test_add_with_far_future_timestamp() {
    let fx = Fixture::new();
    let far_future = Credential::builder("svc@host")
        .with_username("u1")
        .with_secret("p1")
        .with_last_updated(chrono::DateTime::<chrono::Utc>::MAX_UTC)
        .build()
        .unwrap();

    fx.manager.add(&far_future).unwrap();

    let found = fx
        .manager
        .find("svc@host", CredentialType::Generic)
        .unwrap()
        .unwrap();
    assert_eq!(found.secret(), "p1");
    fx.assert_no_leaks();
}

#[test]
fn test_fatal_write_frees_every_allocation() {
    let fx = Fixture::new();
    fx.api
        .inject_error(Operation::Write, ErrorCode::NoSuchLogonSession);

    let err = fx
        .manager
        .add(&credential("svc@host", "u1", "p1"))
        .unwrap_err();

    match err {
        CredStoreError::NativeFailure {
            operation, code, ..
        } => {
            assert_eq!(operation, "write");
            assert_eq!(code, ErrorCode::NoSuchLogonSession);
        }
        other => panic!("expected a native failure, got {:?}", other),
    }
    assert_eq!(fx.marshaler.allocations(), 2);
    fx.assert_no_leaks();
    assert!(fx.api.is_empty());
}

#[test]
fn test_fatal_enumerate_is_raised() {
    let fx = Fixture::new();
    fx.api
        .inject_error(Operation::Enumerate, ErrorCode::InvalidFlags);

    let err = fx.manager.credentials().unwrap_err();
    assert_eq!(err.native_code(), Some(ErrorCode::INVALID_FLAGS));
}

#[test]
fn test_release_failure_is_not_propagated() {
    let fx = Fixture::new();
    fx.seed("svc@host");
    fx.api.inject_error(Operation::Free, ErrorCode::InvalidArgument);

    let found = fx.manager.find("svc@host", CredentialType::Generic).unwrap();
    assert_eq!(found.unwrap().secret(), "p1");
    assert_eq!(fx.api.calls().free, 1);
}

#[test]
fn test_invalid_usage_makes_no_native_calls() {
    let fx = Fixture::new();
    let anonymous = Credential::builder("svc@host")
        .with_secret("p1")
        .build()
        .unwrap();

    let results = [
        fx.manager.add(&anonymous),
        fx.manager.delete_by_id("", CredentialType::Generic),
        fx.manager.find("", CredentialType::Generic).map(|_| ()),
        fx.manager
            .add(&credential("svc@host", "u1", &"s".repeat(1281))),
    ];

    for result in results {
        assert!(
            matches!(result, Err(CredStoreError::InvalidUsage(_))),
            "expected invalid usage, got {:?}",
            result
        );
    }
    assert_eq!(fx.api.calls().total(), 0);
    assert_eq!(fx.marshaler.allocations(), 0);
}

#[test]
fn test_concurrent_managers_share_store() {
    let fx = Fixture::new();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let manager = fx.manager.clone();
            std::thread::spawn(move || {
                let id = format!("worker{}@host", i);
                manager.add(&credential(&id, "u1", "p1")).unwrap();
                manager
                    .find(&id, CredentialType::Generic)
                    .unwrap()
                    .is_some()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(fx.manager.credentials().unwrap().count(), 4);
    fx.assert_no_leaks();
}

fn known_type() -> impl Strategy<Value = CredentialType> {
    prop_oneof![
        Just(CredentialType::Generic),
        Just(CredentialType::DomainPassword),
        Just(CredentialType::DomainCertificate),
        Just(CredentialType::DomainVisiblePassword),
        Just(CredentialType::GenericCertificate),
        Just(CredentialType::DomainExtended),
    ]
}

fn known_persistence() -> impl Strategy<Value = CredentialPersistence> {
    prop_oneof![
        Just(CredentialPersistence::Session),
        Just(CredentialPersistence::LocalMachine),
        Just(CredentialPersistence::Enterprise),
    ]
}

proptest! {
    #[test]
    fn prop_add_then_find_round_trips(
        id in "[a-z][a-z0-9@:./_-]{0,40}",
        username in "[A-Za-z0-9._\\\\-]{1,32}",
        secret in "\\PC{0,200}",
        cred_type in known_type(),
        persistence in known_persistence(),
    ) {
        let fx = Fixture::new();
        let original = Credential::builder(id.as_str())
            .with_username(username.as_str())
            .with_secret(secret.as_str())
            .with_type(cred_type)
            .with_persistence(persistence)
            .build()
            .unwrap();

        fx.manager.add(&original).unwrap();
        let found = fx.manager.find(&id, cred_type).unwrap().unwrap();

        prop_assert_eq!(found.id(), original.id());
        prop_assert_eq!(found.username(), original.username());
        prop_assert_eq!(found.secret(), original.secret());
        prop_assert_eq!(found.cred_type(), cred_type);
        prop_assert_eq!(found.persistence(), persistence);
        prop_assert_eq!(fx.api.live_buffers(), 0);
        prop_assert_eq!(fx.marshaler.outstanding(), 0);
    }
}
