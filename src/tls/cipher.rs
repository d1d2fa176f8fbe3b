//! Cipher and key exchange policy.
//!
//! Translates the two cipher policy strings and the group list from
//! [`TlsConfig`](crate::tls::TlsConfig) into the suite and group lists of
//! the engine's crypto provider. The order of the result is the server
//! preference order.
//!
//! The legacy list understands the subset of OpenSSL cipher string syntax
//! that is meaningful for the suites the engine implements:
//!
//! ```text
//! NAME     add matching suites
//! !NAME    remove matching suites and never add them again
//! -NAME    remove matching suites
//! +NAME    accepted, treated as NAME
//! ```
//!
//! where `NAME` is an OpenSSL suite name (`ECDHE-RSA-AES128-GCM-SHA256`)
//! or an alias (`HIGH`, `ECDHE`, `AESGCM`, `aRSA`, ...). Aliases for
//! algorithms the engine never offers (`RC4`, `3DES`, `aNULL`, ...) match
//! nothing. Like OpenSSL, a list is only rejected when it selects no suite.

use rustls::crypto::SupportedKxGroup;
use rustls::{CipherSuite, NamedGroup, SupportedCipherSuite};

use crate::tls::error::TlsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bulk {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
}

struct LegacySuite {
    openssl_name: &'static str,
    suite: CipherSuite,
    auth: Auth,
    bulk: Bulk,
}

const LEGACY_SUITES: &[LegacySuite] = &[
    LegacySuite {
        openssl_name: "ECDHE-ECDSA-AES256-GCM-SHA384",
        suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        auth: Auth::Ecdsa,
        bulk: Bulk::Aes256Gcm,
    },
    LegacySuite {
        openssl_name: "ECDHE-RSA-AES256-GCM-SHA384",
        suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        auth: Auth::Rsa,
        bulk: Bulk::Aes256Gcm,
    },
    LegacySuite {
        openssl_name: "ECDHE-ECDSA-CHACHA20-POLY1305",
        suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        auth: Auth::Ecdsa,
        bulk: Bulk::Chacha20Poly1305,
    },
    LegacySuite {
        openssl_name: "ECDHE-RSA-CHACHA20-POLY1305",
        suite: CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        auth: Auth::Rsa,
        bulk: Bulk::Chacha20Poly1305,
    },
    LegacySuite {
        openssl_name: "ECDHE-ECDSA-AES128-GCM-SHA256",
        suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        auth: Auth::Ecdsa,
        bulk: Bulk::Aes128Gcm,
    },
    LegacySuite {
        openssl_name: "ECDHE-RSA-AES128-GCM-SHA256",
        suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        auth: Auth::Rsa,
        bulk: Bulk::Aes128Gcm,
    },
];

/// Aliases naming algorithms the engine does not implement at all.
const NEVER_OFFERED: &[&str] = &[
    "aNULL", "eNULL", "NULL", "MD5", "RC4", "3DES", "DES", "EXPORT", "EXP", "LOW", "MEDIUM",
    "PSK", "SRP", "CAMELLIA", "SEED", "IDEA", "ARIA", "DSS", "aDSS", "kRSA", "RSA", "kDHE",
    "DHE", "EDH", "SHA1", "CBC", "AESCCM", "AESCCM8", "ADH", "AECDH",
];

fn legacy_alias(token: &str) -> Option<fn(&LegacySuite) -> bool> {
    let predicate: fn(&LegacySuite) -> bool = match token {
        "HIGH" | "ALL" | "DEFAULT" | "COMPLEMENTOFDEFAULT" | "SECURE" | "FIPS" => |_| true,
        "ECDHE" | "EECDH" | "kECDHE" | "kEECDH" | "AEAD" => |_| true,
        "SHA256" => |s| s.bulk != Bulk::Aes256Gcm,
        "SHA384" => |s| s.bulk == Bulk::Aes256Gcm,
        "aRSA" => |s| s.auth == Auth::Rsa,
        "aECDSA" | "ECDSA" => |s| s.auth == Auth::Ecdsa,
        "AESGCM" | "AES" => |s| matches!(s.bulk, Bulk::Aes128Gcm | Bulk::Aes256Gcm),
        "AES128" => |s| s.bulk == Bulk::Aes128Gcm,
        "AES256" => |s| s.bulk == Bulk::Aes256Gcm,
        "CHACHA20" => |s| s.bulk == Bulk::Chacha20Poly1305,
        _ if NEVER_OFFERED.contains(&token) => |_| false,
        _ => return None,
    };
    Some(predicate)
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split([':', ',', ' '])
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve an OpenSSL-style legacy cipher list to TLS 1.2 suite ids, in order.
pub fn parse_legacy_cipher_list(list: &str) -> Vec<CipherSuite> {
    let mut selected: Vec<CipherSuite> = Vec::new();
    let mut banned: Vec<CipherSuite> = Vec::new();

    for token in split_list(list) {
        let (op, name) = match token.as_bytes()[0] {
            b'!' | b'-' | b'+' => (token.as_bytes()[0], &token[1..]),
            _ => (b'+', token),
        };

        let matching: Vec<CipherSuite> = match LEGACY_SUITES.iter().find(|s| s.openssl_name == name) {
            Some(suite) => vec![suite.suite],
            None => match legacy_alias(name) {
                Some(predicate) => LEGACY_SUITES
                    .iter()
                    .filter(|s| predicate(s))
                    .map(|s| s.suite)
                    .collect(),
                None => {
                    tracing::debug!(token, "ignoring unknown cipher list entry");
                    continue;
                }
            },
        };

        match op {
            b'!' => {
                selected.retain(|s| !matching.contains(s));
                banned.extend(matching);
            }
            b'-' => selected.retain(|s| !matching.contains(s)),
            _ => {
                for suite in matching {
                    if !banned.contains(&suite) && !selected.contains(&suite) {
                        selected.push(suite);
                    }
                }
            }
        }
    }

    selected
}

/// Resolve a colon separated list of IANA TLS 1.3 suite names, in order.
pub fn parse_tls13_suites(list: &str) -> Result<Vec<CipherSuite>, TlsError> {
    let mut selected = Vec::new();
    for name in split_list(list) {
        let suite = match name {
            "TLS_AES_128_GCM_SHA256" => CipherSuite::TLS13_AES_128_GCM_SHA256,
            "TLS_AES_256_GCM_SHA384" => CipherSuite::TLS13_AES_256_GCM_SHA384,
            "TLS_CHACHA20_POLY1305_SHA256" => CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
            other => {
                return Err(TlsError::CipherPolicy(format!(
                    "unsupported TLS 1.3 cipher suite {other}"
                )))
            }
        };
        if !selected.contains(&suite) {
            selected.push(suite);
        }
    }
    Ok(selected)
}

fn pick(available: &[SupportedCipherSuite], wanted: &[CipherSuite]) -> Vec<SupportedCipherSuite> {
    wanted
        .iter()
        .filter_map(|id| available.iter().find(|s| s.suite() == *id).copied())
        .collect()
}

/// Build the engine suite list: TLS 1.3 suites first, then TLS 1.2 suites
/// when TLS 1.2 is enabled.
pub fn select_cipher_suites(
    available: &[SupportedCipherSuite],
    cipher_list: &str,
    tls13_ciphersuites: &str,
    tls12_enabled: bool,
) -> Result<Vec<SupportedCipherSuite>, TlsError> {
    let tls13: Vec<SupportedCipherSuite> = if tls13_ciphersuites.trim().is_empty() {
        available.iter().filter(|s| s.tls13().is_some()).copied().collect()
    } else {
        let chosen = pick(available, &parse_tls13_suites(tls13_ciphersuites)?);
        if chosen.is_empty() {
            return Err(TlsError::CipherPolicy(format!(
                "'{tls13_ciphersuites}' selects no TLS 1.3 suite"
            )));
        }
        chosen
    };

    let tls12: Vec<SupportedCipherSuite> = if !tls12_enabled {
        Vec::new()
    } else if cipher_list.trim().is_empty() {
        available.iter().filter(|s| s.tls13().is_none()).copied().collect()
    } else {
        let chosen = pick(available, &parse_legacy_cipher_list(cipher_list));
        if chosen.is_empty() {
            return Err(TlsError::CipherPolicy(format!(
                "'{cipher_list}' selects no TLS 1.2 suite"
            )));
        }
        chosen
    };

    Ok(tls13.into_iter().chain(tls12).collect())
}

fn named_group(name: &str) -> Option<NamedGroup> {
    match name.to_ascii_lowercase().as_str() {
        "x25519" => Some(NamedGroup::X25519),
        "x448" => Some(NamedGroup::X448),
        "p-256" | "secp256r1" | "prime256v1" => Some(NamedGroup::secp256r1),
        "p-384" | "secp384r1" => Some(NamedGroup::secp384r1),
        "p-521" | "secp521r1" => Some(NamedGroup::secp521r1),
        "ffdhe2048" => Some(NamedGroup::FFDHE2048),
        "ffdhe3072" => Some(NamedGroup::FFDHE3072),
        "ffdhe4096" => Some(NamedGroup::FFDHE4096),
        _ => None,
    }
}

/// Build the engine key exchange group list from a colon separated list.
///
/// Unknown names are rejected; known groups the provider does not
/// implement are skipped.
pub fn select_groups(
    available: &[&'static dyn SupportedKxGroup],
    groups: &str,
) -> Result<Vec<&'static dyn SupportedKxGroup>, TlsError> {
    if groups.trim().is_empty() {
        return Ok(available.to_vec());
    }

    let mut selected: Vec<&'static dyn SupportedKxGroup> = Vec::new();
    for name in split_list(groups) {
        let id = named_group(name)
            .ok_or_else(|| TlsError::GroupPolicy(format!("unknown group {name}")))?;
        match available.iter().find(|g| g.name() == id) {
            Some(group) if !selected.iter().any(|g| g.name() == id) => selected.push(*group),
            Some(_) => {}
            None => tracing::debug!(group = name, "key exchange group not offered by the engine"),
        }
    }

    if selected.is_empty() {
        return Err(TlsError::GroupPolicy(format!(
            "'{groups}' selects no supported group"
        )));
    }
    Ok(selected)
}
