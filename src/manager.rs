//! Credential manager: the CRUD facade over the native interop layer.

use crate::native::api::{CRED_ENUMERATE_ALL_CREDENTIALS, CRED_PRESERVE_CREDENTIAL_BLOB};
use crate::native::{
    CredentialApi, CredentialList, HeapMarshaler, IntermediateCredential, MarshalService,
    NativeContext, NativeInterop,
};
use crate::store::CredentialStore;
use crate::validation::{validate_filter, validate_id};
use crate::{
    CredStoreError, Credential, CredentialBuilder, CredentialPersistence, CredentialType, Result,
};
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

/// CRUD access to the Windows Credential Manager.
///
/// Stateless apart from its collaborators: every call allocates and frees
/// its own buffers, so a manager can be shared freely between threads.
///
/// # Example
///
/// ```
/// use credstore::native::MockCredentialApi;
/// use credstore::{Credential, CredentialManager, CredentialType};
/// use std::sync::Arc;
///
/// let manager = CredentialManager::new(Arc::new(MockCredentialApi::new()));
///
/// let credential = Credential::builder("svc@host")
///     .with_username("u1")
///     .with_secret("p1")
///     .build()?;
/// manager.add(&credential)?;
///
/// let found = manager.find("svc@host", CredentialType::Generic)?.unwrap();
/// assert_eq!(found.secret(), "p1");
///
/// manager.delete(&found)?;
/// assert!(manager.find("svc@host", CredentialType::Generic)?.is_none());
/// # Ok::<(), credstore::CredStoreError>(())
/// ```
#[derive(Clone)]
pub struct CredentialManager {
    interop: NativeInterop,
    default_type: CredentialType,
    default_persistence: CredentialPersistence,
}

impl CredentialManager {
    /// Creates a manager over `api`, allocating from the process heap.
    pub fn new(api: Arc<dyn CredentialApi>) -> Self {
        Self::with_marshaler(api, Arc::new(HeapMarshaler::new()))
    }

    /// Creates a manager over `api` and `marshaler`.
    pub fn with_marshaler(api: Arc<dyn CredentialApi>, marshaler: Arc<dyn MarshalService>) -> Self {
        Self {
            interop: NativeInterop::new(Arc::new(NativeContext::new(api, marshaler))),
            default_type: CredentialType::Generic,
            default_persistence: CredentialPersistence::LocalMachine,
        }
    }

    /// Sets the type used by [`find_default`](Self::find_default) and
    /// [`builder`](Self::builder).
    pub fn with_default_type(mut self, cred_type: CredentialType) -> Self {
        self.default_type = cred_type;
        self
    }

    /// Sets the persistence used by [`builder`](Self::builder).
    pub fn with_default_persistence(mut self, persistence: CredentialPersistence) -> Self {
        self.default_persistence = persistence;
        self
    }

    pub fn default_type(&self) -> CredentialType {
        self.default_type
    }

    pub fn default_persistence(&self) -> CredentialPersistence {
        self.default_persistence
    }

    /// Starts a credential builder using this manager's defaults.
    pub fn builder(&self, id: impl Into<String>) -> CredentialBuilder {
        Credential::builder(id)
            .with_type(self.default_type)
            .with_persistence(self.default_persistence)
    }

    /// Looks up `id` with the given type. Not found is `Ok(None)`.
    pub fn find(&self, id: &str, cred_type: CredentialType) -> Result<Option<Credential>> {
        validate_id(id)?;
        let code = known_type(cred_type)?;

        match self.interop.read(id, code, 0)? {
            Some(native) => Credential::try_from(native).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up `id` with the default type.
    pub fn find_default(&self, id: &str) -> Result<Option<Credential>> {
        self.find(id, self.default_type)
    }

    /// Enumerates credentials matching `filter`, or everything when
    /// `search_all` is set.
    ///
    /// The OS rejects a filter combined with the all-credentials flag, so
    /// `filter` is not sent when `search_all` is set.
    pub fn find_matching(&self, filter: &str, search_all: bool) -> Result<Credentials> {
        let list = if search_all {
            if !filter.is_empty() {
                tracing::debug!(operation = "enumerate", filter, "filter ignored with search_all");
            }
            self.interop.enumerate(None, CRED_ENUMERATE_ALL_CREDENTIALS)?
        } else {
            validate_filter(filter)?;
            self.interop.enumerate(Some(filter), 0)?
        };
        Ok(Credentials::new(list))
    }

    /// Enumerates every credential of the logon session.
    pub fn credentials(&self) -> Result<Credentials> {
        let list = self.interop.enumerate(None, CRED_ENUMERATE_ALL_CREDENTIALS)?;
        Ok(Credentials::new(list))
    }

    /// Creates or replaces `credential`.
    pub fn add(&self, credential: &Credential) -> Result<()> {
        self.write(credential, 0)
    }

    /// Same as [`add`](Self::add).
    pub fn update(&self, credential: &Credential) -> Result<()> {
        self.add(credential)
    }

    /// Rewrites everything but the secret of an existing credential.
    ///
    /// The secret carried by `credential` is ignored. If the target does not
    /// exist nothing is written.
    pub fn update_preserving_secret(&self, credential: &Credential) -> Result<()> {
        self.write(credential, CRED_PRESERVE_CREDENTIAL_BLOB)
    }

    /// Deletes `credential`. Missing targets succeed.
    pub fn delete(&self, credential: &Credential) -> Result<()> {
        self.delete_by_id(credential.id(), credential.cred_type())
    }

    /// Deletes `id` with `cred_type`. Missing targets succeed.
    pub fn delete_by_id(&self, id: &str, cred_type: CredentialType) -> Result<()> {
        validate_id(id)?;
        let code = known_type(cred_type)?;
        self.interop.delete(id, code, 0)
    }

    fn write(&self, credential: &Credential, flags: u32) -> Result<()> {
        let marshaler = &*self.interop.context().marshaler;
        let intermediate = IntermediateCredential::new(credential, marshaler)?;
        self.interop.write(&intermediate.native_credential(), flags)?;
        tracing::debug!(operation = "write", id = credential.id(), "credential written");
        Ok(())
    }
}

fn known_type(cred_type: CredentialType) -> Result<u32> {
    match cred_type {
        CredentialType::Unknown => Err(CredStoreError::InvalidUsage(
            "credential type cannot be Unknown".to_string(),
        )),
        known => Ok(known.code()),
    }
}

impl CredentialStore for CredentialManager {
    fn name(&self) -> &str {
        self.interop.context().api.name()
    }

    fn find(&self, id: &str, cred_type: CredentialType) -> Result<Option<Credential>> {
        CredentialManager::find(self, id, cred_type)
    }

    fn find_matching(&self, filter: &str, search_all: bool) -> Result<Credentials> {
        CredentialManager::find_matching(self, filter, search_all)
    }

    fn credentials(&self) -> Result<Credentials> {
        CredentialManager::credentials(self)
    }

    fn add(&self, credential: &Credential) -> Result<()> {
        CredentialManager::add(self, credential)
    }

    fn delete_by_id(&self, id: &str, cred_type: CredentialType) -> Result<()> {
        CredentialManager::delete_by_id(self, id, cred_type)
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("api", &self.interop.context().api.name())
            .field("default_type", &self.default_type)
            .field("default_persistence", &self.default_persistence)
            .finish()
    }
}

/// Lazy sequence of enumerated credentials.
///
/// Holds the OS buffer until it is exhausted or dropped. Records that do
/// not form a valid [`Credential`] are skipped with a warning.
#[derive(Debug)]
pub struct Credentials {
    list: CredentialList,
}

impl Credentials {
    fn new(list: CredentialList) -> Self {
        Self { list }
    }

    /// Number of records the OS reported, skipped ones included.
    pub fn reported_count(&self) -> usize {
        self.list.reported_count()
    }

    /// Frees the OS buffer and ends the sequence.
    pub fn close(&mut self) {
        self.list.close();
    }
}

impl Iterator for Credentials {
    type Item = Credential;

    fn next(&mut self) -> Option<Self::Item> {
        for native in self.list.by_ref() {
            let target = native.target_name.clone();
            match Credential::try_from(native) {
                Ok(credential) => return Some(credential),
                Err(e) => {
                    tracing::warn!(operation = "enumerate", target_name = %target, "skipping credential: {}", e);
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.list.size_hint()
    }
}

impl FusedIterator for Credentials {}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::native::mock::{MockCredentialApi, MockRecord, Operation};
    use crate::native::ErrorCode;

    fn manager() -> (Arc<MockCredentialApi>, CredentialManager) {
        let api = Arc::new(MockCredentialApi::new());
        (api.clone(), CredentialManager::new(api))
    }

    fn credential(id: &str) -> Credential {
        Credential::builder(id)
            .with_username("u1")
            .with_secret("p1")
            .build()
            .unwrap()
    }

    #[test]
    fn test_find_missing_is_none() {
        let (_api, manager) = manager();
        assert!(manager.find("svc@host", CredentialType::Generic).unwrap().is_none());
    }

    #[test]
    fn test_find_rejects_unknown_type_without_calling() {
        let (api, manager) = manager();
        let result = manager.find("svc@host", CredentialType::Unknown);
        assert!(matches!(result, Err(CredStoreError::InvalidUsage(_))));
        assert_eq!(api.calls().total(), 0);
    }

    #[test]
    fn test_find_default_uses_configured_type() {
        let (api, manager) = manager();
        let manager = manager.with_default_type(CredentialType::DomainPassword);
        api.seed(
            &credential("svc@host")
                .to_builder()
                .with_type(CredentialType::DomainPassword)
                .build()
                .unwrap(),
        );

        let found = manager.find_default("svc@host").unwrap().unwrap();
        assert_eq!(found.cred_type(), CredentialType::DomainPassword);
    }

    #[test]
    fn test_builder_uses_defaults() {
        let (_api, manager) = manager();
        let manager = manager.with_default_persistence(CredentialPersistence::Session);
        let built = manager.builder("svc@host").with_username("u1").build().unwrap();
        assert_eq!(built.persistence(), CredentialPersistence::Session);
        assert_eq!(built.cred_type(), CredentialType::Generic);
    }

    #[test]
    fn test_fatal_read_surfaces_code() {
        let (api, manager) = manager();
        api.inject_error(Operation::Read, ErrorCode::NoSuchLogonSession);

        let err = manager.find("svc@host", CredentialType::Generic).unwrap_err();
        assert_eq!(err.native_code(), Some(ErrorCode::NO_SUCH_LOGON_SESSION));
        assert!(!err.is_unknown_code());
    }

    #[test]
    fn test_null_read_buffer_is_absent() {
        let (api, manager) = manager();
        api.seed(&credential("svc@host"));
        api.set_null_read(true);

        assert!(manager.find("svc@host", CredentialType::Generic).unwrap().is_none());
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_update_replaces() {
        let (_api, manager) = manager();
        let original = credential("svc@host");
        manager.add(&original).unwrap();
        manager
            .update(&original.to_builder().with_secret("p2").build().unwrap())
            .unwrap();

        let found = manager.find("svc@host", CredentialType::Generic).unwrap().unwrap();
        assert_eq!(found.secret(), "p2");
    }

    #[test]
    fn test_update_preserving_secret() {
        let (_api, manager) = manager();
        manager.add(&credential("svc@host")).unwrap();

        let renamed = credential("svc@host")
            .to_builder()
            .with_username("u2")
            .with_secret("ignored")
            .build()
            .unwrap();
        manager.update_preserving_secret(&renamed).unwrap();

        let found = manager.find("svc@host", CredentialType::Generic).unwrap().unwrap();
        assert_eq!(found.username(), "u2");
        assert_eq!(found.secret(), "p1");
    }

    #[test]
    fn test_update_preserving_secret_of_missing_target_writes_nothing() {
        let (api, manager) = manager();
        manager
            .update_preserving_secret(&credential("svc@host"))
            .unwrap();
        assert!(api.is_empty());
    }

    #[test]
    fn test_fatal_write_is_raised() {
        let (api, manager) = manager();
        api.inject_error(Operation::Write, ErrorCode::from(5));

        let err = manager.add(&credential("svc@host")).unwrap_err();
        assert_eq!(err.native_code(), Some(5));
        assert!(err.is_unknown_code());
        assert!(err.to_string().contains("unknown error 5"));
    }

    #[test]
    fn test_find_matching_by_prefix() {
        let (api, manager) = manager();
        for id in ["git:a", "git:b", "svc@host"] {
            api.seed(&credential(id));
        }

        let mut ids: Vec<String> = manager
            .find_matching("git:*", false)
            .unwrap()
            .map(|c| c.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["git:a", "git:b"]);
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_find_matching_all_ignores_filter() {
        let (api, manager) = manager();
        for id in ["git:a", "svc@host"] {
            api.seed(&credential(id));
        }
        assert_eq!(manager.find_matching("git:*", true).unwrap().count(), 2);
    }

    #[test]
    fn test_find_matching_rejects_empty_filter() {
        let (api, manager) = manager();
        let result = manager.find_matching("", false);
        assert!(matches!(result, Err(CredStoreError::InvalidUsage(_))));
        assert_eq!(api.calls().enumerate, 0);
    }

    #[test]
    fn test_credentials_on_empty_store() {
        let (api, manager) = manager();
        assert_eq!(manager.credentials().unwrap().count(), 0);
        assert_eq!(api.calls().enumerate, 1);
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_credentials_skips_unknown_persistence() {
        let (api, manager) = manager();
        api.seed(&credential("svc@host"));
        api.seed_record(MockRecord {
            persist: 7,
            ..MockRecord::new("odd@host")
        });

        let credentials = manager.credentials().unwrap();
        assert_eq!(credentials.reported_count(), 2);
        let ids: Vec<String> = credentials.map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["svc@host"]);
        assert_eq!(api.live_buffers(), 0);
    }

    #[test]
    fn test_store_trait_delete_defaults() {
        let (api, manager) = manager();
        api.seed(&credential("svc@host"));
        let store: &dyn CredentialStore = &manager;

        assert_eq!(store.name(), "mock");
        assert!(store.exists("svc@host", CredentialType::Generic).unwrap());
        store.delete(&credential("svc@host")).unwrap();
        assert!(!store.exists("svc@host", CredentialType::Generic).unwrap());
    }
}
