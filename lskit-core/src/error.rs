//! Error taxonomy for local storage key provisioning.
//!
//! Every capability of the authenticated keystore has its own closed error
//! type. The provisioner matches on them exhaustively to decide between the
//! three outcomes a failure can have:
//!
//! - **fatal**: the host is told to terminate the process ([`FatalReason`])
//! - **recoverable**: the error is returned to the caller
//! - **swallowed**: failures of the migration rewrite are logged and ignored

use thiserror::Error;

/// Platform code reported by the keystore when it is not ready to be used.
pub const KEYSTORE_NOT_READY_CODE: &str = "OS-PLUG-KSTR-0010";

const AUTH_SKIPPED_MESSAGE: &str = "Authentication screen skipped";
const INSECURE_DEVICE_MESSAGE: &str = "Device is not secure";
const MIGRATION_FAILED_PREFIX: &str = "MIGRATION FAILED";

/// Failure to open the authenticated keystore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum OpenError {
    /// The user dismissed the platform authentication screen.
    #[error("authentication screen skipped")]
    AuthSkipped,
    /// The keystore reported it is not ready to be used.
    #[error("keystore not ready")]
    NotReady,
    /// The device has no secure lock screen configured.
    #[error("device is not secure")]
    InsecureDevice,
    /// A previous keystore format migration left the store inconsistent.
    #[error("keystore migration failed: {0}")]
    MigrationFailed(String),
    /// Any other platform failure.
    #[error("keystore error{}: {message}", code_suffix(.code.as_deref()))]
    Other {
        /// Platform error code, if the keystore reported one.
        code: Option<String>,
        /// Human-readable description.
        message: String,
    },
}

impl OpenError {
    /// Classifies a raw platform failure into the closed error set.
    ///
    /// Platform bridges only see codes and messages; this is the single place
    /// where those strings are interpreted.
    #[must_use]
    pub fn from_code(code: Option<&str>, message: &str) -> Self {
        // A skipped authentication wins over the not-ready code so the
        // user still gets the notice.
        if message == AUTH_SKIPPED_MESSAGE {
            return Self::AuthSkipped;
        }
        if code == Some(KEYSTORE_NOT_READY_CODE) {
            return Self::NotReady;
        }
        if message == INSECURE_DEVICE_MESSAGE {
            return Self::InsecureDevice;
        }
        if message.starts_with(MIGRATION_FAILED_PREFIX) {
            return Self::MigrationFailed(message.to_string());
        }
        Self::Other {
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }
}

fn code_suffix(code: Option<&str>) -> String {
    code.map(|c| format!(" {c}")).unwrap_or_default()
}

/// Failure to enumerate the entry names of an opened keystore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ListError {
    /// The user dismissed the platform authentication screen.
    #[error("authentication screen skipped")]
    AuthSkipped,
    /// Any other platform failure.
    #[error("failed to list keystore entries: {0}")]
    Other(String),
}

impl ListError {
    /// Classifies a raw platform message into the closed error set.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        if message == AUTH_SKIPPED_MESSAGE {
            Self::AuthSkipped
        } else {
            Self::Other(message.to_string())
        }
    }
}

/// Failure to read a keystore entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ReadError {
    /// No entry exists under the requested name.
    #[error("keystore entry not found")]
    NotFound,
    /// Any other platform failure.
    #[error("failed to read keystore entry: {0}")]
    Other(String),
}

/// Failure to write a keystore entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to write keystore entry: {0}")]
pub struct WriteError(pub String);

/// Failure of the device-security remediation flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device security remediation failed: {0}")]
pub struct RemediationError(pub String);

/// Conditions under which the application must not keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FatalReason {
    /// The user skipped authentication while opening or listing the keystore.
    AuthenticationSkipped,
    /// The keystore reported it is not ready.
    KeystoreNotReady,
    /// The device is insecure and the user declined, or remediation failed.
    DeviceNotSecured,
    /// A keystore format migration failed in an earlier run.
    MigrationFailed,
}

impl FatalReason {
    /// Blocking notice to present before terminating, if any.
    #[must_use]
    pub const fn notice(self) -> Option<&'static str> {
        match self {
            Self::AuthenticationSkipped => {
                Some("Authentication required to use this app. Relaunch the app to try again.")
            }
            Self::MigrationFailed => Some(
                "A feature on this app failed to be upgraded. Relaunch the app to try again.",
            ),
            Self::KeystoreNotReady | Self::DeviceNotSecured => None,
        }
    }
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::AuthenticationSkipped => "authentication_skipped",
            Self::KeystoreNotReady => "keystore_not_ready",
            Self::DeviceNotSecured => "device_not_secured",
            Self::MigrationFailed => "migration_failed",
        };
        f.write_str(label)
    }
}

/// Machine-distinguishable category of a [`ProvisioningError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Opening the keystore failed.
    Open,
    /// Listing keystore entries failed.
    List,
    /// Reading the existing key failed.
    Read,
    /// Persisting a newly generated key failed.
    Write,
    /// The acquisition ended in a fatal condition.
    Fatal,
}

/// Error outputs of a key acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ProvisioningError {
    /// Opening the keystore failed with a recoverable error.
    #[error(transparent)]
    Open(#[from] OpenError),
    /// Listing keystore entries failed with a recoverable error.
    #[error(transparent)]
    List(#[from] ListError),
    /// The key entry exists but could not be read.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// A freshly generated key could not be persisted.
    #[error(transparent)]
    Write(#[from] WriteError),
    /// The host was told to terminate the process.
    #[error("terminated: {0}")]
    Terminated(FatalReason),
}

impl ProvisioningError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_) => ErrorKind::Open,
            Self::List(_) => ErrorKind::List,
            Self::Read(_) => ErrorKind::Read,
            Self::Write(_) => ErrorKind::Write,
            Self::Terminated(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the acquisition ended in a fatal condition.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Result type for provisioning operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
