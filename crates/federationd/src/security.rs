//! Transport security material for mutually authenticated peer connections.
//!
//! The builder loads the trust roots, the local certificate, and the local
//! key, and checks that each source carries the expected PEM block. The
//! resulting [`SecurityConfig`] is opaque to the lifecycle core; it is handed
//! to the resource service unchanged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

const CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_BEGIN: &str = "-----BEGIN ";
const PRIVATE_KEY_SUFFIX: &str = "PRIVATE KEY-----";

/// Errors raised while assembling security configuration.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// No trust roots were supplied.
    #[error("at least one root CA certificate is required")]
    NoRootCertificates,
    /// A source could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Source that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A source lacked the PEM block it must carry.
    #[error("'{path}' does not contain a PEM {label} block")]
    MissingPemBlock {
        /// Source that was inspected.
        path: PathBuf,
        /// Kind of block that was expected.
        label: &'static str,
    },
}

/// Validated security material for the resource service.
///
/// Records the sources whose PEM blocks have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    root_cas: Vec<PathBuf>,
    certificate: PathBuf,
    key: PathBuf,
}

impl SecurityConfig {
    /// Number of trust roots.
    #[must_use]
    pub fn root_ca_count(&self) -> usize {
        self.root_cas.len()
    }

    /// File the local certificate was loaded from.
    #[must_use]
    pub fn certificate_path(&self) -> &Path {
        &self.certificate
    }

    /// File the local private key was loaded from.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key
    }
}

/// Builds [`SecurityConfig`] values during startup.
pub trait SecurityConfigBuilder {
    /// Assembles configuration from trust roots, a certificate, and a key.
    fn build(
        &self,
        root_cas: &[PathBuf],
        certificate: &Path,
        key: &Path,
    ) -> Result<SecurityConfig, SecurityError>;
}

/// Builder that reads PEM files from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PemSecurityConfigBuilder;

impl SecurityConfigBuilder for PemSecurityConfigBuilder {
    fn build(
        &self,
        root_cas: &[PathBuf],
        certificate: &Path,
        key: &Path,
    ) -> Result<SecurityConfig, SecurityError> {
        if root_cas.is_empty() {
            return Err(SecurityError::NoRootCertificates);
        }
        for path in root_cas {
            require_block(path, "certificate", contains_certificate)?;
        }
        require_block(certificate, "certificate", contains_certificate)?;
        require_block(key, "private key", contains_private_key)?;
        Ok(SecurityConfig {
            root_cas: root_cas.to_vec(),
            certificate: certificate.to_path_buf(),
            key: key.to_path_buf(),
        })
    }
}

fn require_block(
    path: &Path,
    label: &'static str,
    present: fn(&str) -> bool,
) -> Result<(), SecurityError> {
    let pem = fs::read_to_string(path).map_err(|source| SecurityError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if present(&pem) {
        Ok(())
    } else {
        Err(SecurityError::MissingPemBlock {
            path: path.to_path_buf(),
            label,
        })
    }
}

fn contains_certificate(pem: &str) -> bool {
    pem.contains(CERTIFICATE_MARKER)
}

fn contains_private_key(pem: &str) -> bool {
    pem.lines().map(str::trim).any(|line| {
        line.starts_with(PEM_BEGIN) && line.ends_with(PRIVATE_KEY_SUFFIX)
    })
}
