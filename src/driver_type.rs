// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Driver variants and driver-name parsing.
//!
//! A `Driver` resource name doubles as the CSI driver name. Its second-to-last label
//! before `.csi.ceph.com` selects the variant:
//!
//! | name | variant |
//! |---|---|
//! | `rbd.csi.ceph.com` | [`DriverType::Rbd`] |
//! | `rook-ceph.cephfs.csi.ceph.com` | [`DriverType::CephFs`] |
//! | `x.y.nfs.csi.ceph.com` | [`DriverType::Nfs`] |

use crate::errors::OperatorError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static DRIVER_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:.+\.)?(rbd|cephfs|nfs)\.csi\.ceph\.com$").unwrap()
});

/// The three Ceph CSI driver variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverType {
    Rbd,
    CephFs,
    Nfs,
}

impl DriverType {
    /// Parse the variant from a `Driver` name.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::InvalidDriverName`] when the name does not end in
    /// `(rbd|cephfs|nfs).csi.ceph.com`.
    pub fn from_driver_name(name: &str) -> Result<Self, OperatorError> {
        let invalid = || OperatorError::InvalidDriverName {
            name: name.to_string(),
        };
        let captures = DRIVER_NAME_REGEX.captures(name).ok_or_else(invalid)?;
        match captures.get(1).map(|m| m.as_str()) {
            Some("rbd") => Ok(Self::Rbd),
            Some("cephfs") => Ok(Self::CephFs),
            Some("nfs") => Ok(Self::Nfs),
            _ => Err(invalid()),
        }
    }

    /// Lowercase name used in arguments, image keys and service account names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rbd => "rbd",
            Self::CephFs => "cephfs",
            Self::Nfs => "nfs",
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "driver_type_tests.rs"]
mod driver_type_tests;
