// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Protocol-version compatibility check (major/minor/patch semantics).
use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Exact,
    CompatibleWithWarning,
    Compatible,
    Incompatible,
}

/// This binary's own protocol version: the `HEDDLE_PROTOCOL_VERSION`
/// environment variable if set, otherwise the version baked in at build
/// time from the repository's `PROTOCOL_VERSION` file.
pub fn own_version() -> String {
    std::env::var("HEDDLE_PROTOCOL_VERSION")
        .unwrap_or_else(|_| include_str!("../../../PROTOCOL_VERSION").trim().to_string())
}

fn parse(version: &str) -> anyhow::Result<(u64, u64, u64)> {
    let mut parts = version.splitn(3, '.');
    let major = parts.next().context("missing major version")?.parse()?;
    let minor = parts.next().context("missing minor version")?.parse()?;
    let patch = parts.next().context("missing patch version")?.parse()?;
    Ok((major, minor, patch))
}

/// Compare `peer` against `own`. A malformed `peer` string is treated as
/// incompatible rather than propagating a parse error — callers only need to
/// know whether to proceed.
pub fn check(own: &str, peer: &str) -> anyhow::Result<Compatibility> {
    let (own_major, own_minor, own_patch) = parse(own)?;
    let Ok((peer_major, peer_minor, peer_patch)) = parse(peer) else {
        bail!("malformed protocol_version: {peer}");
    };

    Ok(if own_major != peer_major {
        Compatibility::Incompatible
    } else if own_minor != peer_minor {
        Compatibility::CompatibleWithWarning
    } else if own_patch != peer_patch {
        Compatibility::Compatible
    } else {
        Compatibility::Exact
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_mismatch_is_incompatible() {
        assert_eq!(check("0.1.0", "1.1.0").unwrap(), Compatibility::Incompatible);
    }

    #[test]
    fn minor_mismatch_is_compatible_with_warning() {
        assert_eq!(check("0.1.0", "0.2.0").unwrap(), Compatibility::CompatibleWithWarning);
    }

    #[test]
    fn patch_mismatch_is_compatible() {
        assert_eq!(check("0.1.0", "0.1.5").unwrap(), Compatibility::Compatible);
    }

    #[test]
    fn identical_versions_are_exact() {
        assert_eq!(check("0.1.0", "0.1.0").unwrap(), Compatibility::Exact);
    }

    #[test]
    fn malformed_peer_version_errors() {
        assert!(check("0.1.0", "not-a-version").is_err());
    }
}
