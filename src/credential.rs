//! Managed credential records.

use crate::native::{FileTime, NativeCredential};
use crate::{CredStoreError, Result};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Which authentication subsystem may consume the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CredentialType {
    /// Not a type this crate understands. Never valid on a [`Credential`].
    Unknown,
    /// `CRED_TYPE_GENERIC`
    Generic,
    /// `CRED_TYPE_DOMAIN_PASSWORD`
    DomainPassword,
    /// `CRED_TYPE_DOMAIN_CERTIFICATE`
    DomainCertificate,
    /// `CRED_TYPE_DOMAIN_VISIBLE_PASSWORD`
    DomainVisiblePassword,
    /// `CRED_TYPE_GENERIC_CERTIFICATE`
    GenericCertificate,
    /// `CRED_TYPE_DOMAIN_EXTENDED`
    DomainExtended,
}

impl CredentialType {
    /// Native `CRED_TYPE_*` value.
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Generic => 1,
            Self::DomainPassword => 2,
            Self::DomainCertificate => 3,
            Self::DomainVisiblePassword => 4,
            Self::GenericCertificate => 5,
            Self::DomainExtended => 6,
        }
    }

    /// Maps a native value, falling back to [`Unknown`](Self::Unknown).
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Generic,
            2 => Self::DomainPassword,
            3 => Self::DomainCertificate,
            4 => Self::DomainVisiblePassword,
            5 => Self::GenericCertificate,
            6 => Self::DomainExtended,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Generic => write!(f, "Generic"),
            Self::DomainPassword => write!(f, "DomainPassword"),
            Self::DomainCertificate => write!(f, "DomainCertificate"),
            Self::DomainVisiblePassword => write!(f, "DomainVisiblePassword"),
            Self::GenericCertificate => write!(f, "GenericCertificate"),
            Self::DomainExtended => write!(f, "DomainExtended"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = CredStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "domainpassword" => Ok(Self::DomainPassword),
            "domaincertificate" => Ok(Self::DomainCertificate),
            "domainvisiblepassword" => Ok(Self::DomainVisiblePassword),
            "genericcertificate" => Ok(Self::GenericCertificate),
            "domainextended" => Ok(Self::DomainExtended),
            _ => Err(CredStoreError::InvalidUsage(format!(
                "unknown credential type: {}",
                s
            ))),
        }
    }
}

/// How long, and where, a credential remains available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CredentialPersistence {
    /// Not a scope this crate understands. Never valid on a [`Credential`].
    Unknown,
    /// Current logon session only
    Session,
    /// This machine, across logon sessions
    LocalMachine,
    /// Roams with the user's profile
    Enterprise,
}

impl CredentialPersistence {
    /// Native `CRED_PERSIST_*` value.
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Session => 1,
            Self::LocalMachine => 2,
            Self::Enterprise => 3,
        }
    }

    /// Maps a native value, falling back to [`Unknown`](Self::Unknown).
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Session,
            2 => Self::LocalMachine,
            3 => Self::Enterprise,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for CredentialPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Session => write!(f, "Session"),
            Self::LocalMachine => write!(f, "LocalMachine"),
            Self::Enterprise => write!(f, "Enterprise"),
        }
    }
}

impl std::str::FromStr for CredentialPersistence {
    type Err = CredStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "localmachine" => Ok(Self::LocalMachine),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(CredStoreError::InvalidUsage(format!(
                "unknown persistence: {}",
                s
            ))),
        }
    }
}

bitflags! {
    /// Characteristic flags of a credential (`CRED_FLAGS_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CredentialFlags: u32 {
        /// `CRED_FLAGS_PROMPT_NOW`
        const PROMPT_NOW = 0x2;
        /// `CRED_FLAGS_USERNAME_TARGET`
        const USERNAME_TARGET = 0x4;
    }
}

/// A credential held by the store.
///
/// Immutable once built; use [`to_builder`](Credential::to_builder) to derive
/// a modified copy. The secret is wiped from memory when the value drops and
/// is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    username: String,
    secret: Zeroizing<String>,
    characteristics: CredentialFlags,
    cred_type: CredentialType,
    persistence: CredentialPersistence,
    last_updated: DateTime<Utc>,
}

impl Credential {
    /// Starts a builder for a generic, machine-persisted credential.
    ///
    /// # Example
    ///
    /// ```
    /// use credstore::{Credential, CredentialType};
    ///
    /// let credential = Credential::builder("svc@host")
    ///     .with_username("u1")
    ///     .with_secret("p1")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(credential.id(), "svc@host");
    /// assert_eq!(credential.cred_type(), CredentialType::Generic);
    /// ```
    pub fn builder(id: impl Into<String>) -> CredentialBuilder {
        CredentialBuilder::new(id)
    }

    /// Starts a builder pre-filled with this credential's fields.
    pub fn to_builder(&self) -> CredentialBuilder {
        CredentialBuilder {
            id: self.id.clone(),
            username: self.username.clone(),
            secret: self.secret.clone(),
            characteristics: self.characteristics,
            cred_type: self.cred_type,
            persistence: self.persistence,
            last_updated: Some(self.last_updated),
        }
    }

    /// Target name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// User name, possibly empty.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Plaintext secret, possibly empty.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn characteristics(&self) -> CredentialFlags {
        self.characteristics
    }

    pub fn cred_type(&self) -> CredentialType {
        self.cred_type
    }

    pub fn persistence(&self) -> CredentialPersistence {
        self.persistence
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("characteristics", &self.characteristics)
            .field("cred_type", &self.cred_type)
            .field("persistence", &self.persistence)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.id, self.username, self.cred_type)
    }
}

impl TryFrom<NativeCredential> for Credential {
    type Error = CredStoreError;

    fn try_from(native: NativeCredential) -> Result<Self> {
        let blob = &native.credential_blob;
        if blob.len() > crate::native::api::CRED_MAX_CREDENTIAL_BLOB_SIZE {
            tracing::warn!(
                target_name = %native.target_name,
                size = blob.len(),
                "credential blob larger than the documented maximum"
            );
        }

        let units: Zeroizing<Vec<u16>> = Zeroizing::new(
            blob.chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        );
        let secret = Zeroizing::new(String::from_utf16_lossy(&units));

        Credential::builder(native.target_name)
            .with_username(native.user_name.unwrap_or_default())
            .with_secret(secret.as_str())
            .with_characteristics(CredentialFlags::from_bits_truncate(native.flags))
            .with_type(CredentialType::from_code(native.cred_type))
            .with_persistence(CredentialPersistence::from_code(native.persist))
            .with_last_updated(native.last_written.to_datetime())
            .build()
    }
}

/// Builder for [`Credential`]; [`build`](CredentialBuilder::build) enforces
/// the record's invariants.
#[derive(Clone)]
pub struct CredentialBuilder {
    id: String,
    username: String,
    secret: Zeroizing<String>,
    characteristics: CredentialFlags,
    cred_type: CredentialType,
    persistence: CredentialPersistence,
    last_updated: Option<DateTime<Utc>>,
}

impl CredentialBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: String::new(),
            secret: Zeroizing::new(String::new()),
            characteristics: CredentialFlags::empty(),
            cred_type: CredentialType::Generic,
            persistence: CredentialPersistence::LocalMachine,
            last_updated: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Zeroizing::new(secret.into());
        self
    }

    pub fn with_characteristics(mut self, characteristics: CredentialFlags) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn with_type(mut self, cred_type: CredentialType) -> Self {
        self.cred_type = cred_type;
        self
    }

    pub fn with_persistence(mut self, persistence: CredentialPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets the timestamp; defaults to now.
    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    /// Validates and builds the credential.
    ///
    /// # Errors
    ///
    /// [`CredStoreError::InvalidCredential`] if the id is empty or the type
    /// or persistence is `Unknown`.
    pub fn build(self) -> Result<Credential> {
        if self.id.is_empty() {
            return Err(CredStoreError::InvalidCredential(
                "id cannot be empty".to_string(),
            ));
        }
        if self.cred_type == CredentialType::Unknown {
            return Err(CredStoreError::InvalidCredential(format!(
                "{}: credential type is unknown",
                self.id
            )));
        }
        if self.persistence == CredentialPersistence::Unknown {
            return Err(CredStoreError::InvalidCredential(format!(
                "{}: persistence is unknown",
                self.id
            )));
        }

        Ok(Credential {
            id: self.id,
            username: self.username,
            secret: self.secret,
            characteristics: self.characteristics,
            cred_type: self.cred_type,
            persistence: self.persistence,
            last_updated: self.last_updated.unwrap_or_else(Utc::now),
        })
    }
}

/// Converts a timestamp to the native two-halves form.
pub(crate) fn file_time_of(credential: &Credential) -> FileTime {
    FileTime::from_datetime(credential.last_updated)
}
