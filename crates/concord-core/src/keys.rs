//! Provider public key table.
//!
//! Maps a provider id to the P-256 key it signs replies with. The relay's known providers
//! ship built in; configuration can add providers or replace a built-in key. A provider
//! missing from the table is never trusted, but that only filters its replies out.

use crate::crypto::{CryptoError, ProviderKey};
use std::collections::{BTreeMap, HashMap};

/// Keys of the providers served by the public relay.
pub const BUILTIN_KEYS: &[(&str, &str)] = &[
    (
        "p2p-01",
        "0445763ed8e33e86b9270db41bcff900717e55b08d69c5435fb1ce7ae4e9b26372cd6a304403120027a383877ebc3fd00ae9f12adfdcef0e05c14f8b3c6c9a7be5",
    ),
    (
        "attestant",
        "04baaf702a61308ecfbaf30e25aa1163d823f51edad0441698a866138d8e6bd808d69bef73ed58ec7181d66915606da8634568b4dfa5ac0533094e4d13e43951a2",
    ),
    (
        "p-ops",
        "0452c2216dac3ab4706a892760279d7141293b39fb081948188697d5487a987cb1968ccc300953f5c21bfe4553163b11eff39779392f4ce10f6b05792a7a596006",
    ),
    (
        "stakesquid",
        "044d40cb6f42e5a62dbf55fef6d137a8936d2fc105205b62a9af396a1d9cf0d0633ea1fbef9e16b7208e648e63858f5da1fe51ae879ef79a3b769d74995f810816",
    ),
    (
        "test",
        "04d0326a340b2590e37184a0fe4a3c95b8d4016a7196db46591ceb085adb203d062bc8c38758a9d7e38a66d752bd5871c1c005c802724aa6825f75adbca49582c8",
    ),
];

#[derive(Clone, Debug)]
struct KeyEntry {
    hex: String,
    key: ProviderKey,
}

/// Provider id to public key lookup.
///
/// Read-only once built; [`crate::client::RelayClient::update_keys`] swaps in a whole new
/// table instead of mutating this one.
#[derive(Clone, Debug, Default)]
pub struct PublicKeyTable {
    keys: HashMap<String, KeyEntry>,
}

impl PublicKeyTable {
    /// An empty table. Every signed reply fails verification against it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table of the relay's built-in providers.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (provider_id, hex_key) in BUILTIN_KEYS {
            // Built-in keys are valid points; skip rather than panic if one is not.
            if let Err(e) = table.insert(provider_id, hex_key) {
                tracing::error!(provider_id = %provider_id, error = %e, "invalid built-in key");
            }
        }
        table
    }

    /// Builds a table from hex keys, rejecting the first invalid one.
    pub fn from_hex_map<'a, I>(entries: I) -> Result<Self, CryptoError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut table = Self::empty();
        for (provider_id, hex_key) in entries {
            table.insert(provider_id, hex_key)?;
        }
        Ok(table)
    }

    /// Built-in keys extended and overridden by `overrides`.
    pub fn builtin_with<'a, I>(overrides: I) -> Result<Self, CryptoError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut table = Self::builtin();
        for (provider_id, hex_key) in overrides {
            table.insert(provider_id, hex_key)?;
        }
        Ok(table)
    }

    /// Adds or replaces a provider key.
    pub fn insert(&mut self, provider_id: &str, hex_key: &str) -> Result<(), CryptoError> {
        let hex = hex_key.trim().to_ascii_lowercase();
        let key = ProviderKey::from_hex(&hex)?;
        self.keys.insert(provider_id.to_string(), KeyEntry { hex, key });
        Ok(())
    }

    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&ProviderKey> {
        self.keys.get(provider_id).map(|entry| &entry.key)
    }

    #[must_use]
    pub fn contains(&self, provider_id: &str) -> bool {
        self.keys.contains_key(provider_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Provider ids with their hex keys, sorted by provider id.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<&str, &str> {
        self.keys.iter().map(|(id, entry)| (id.as_str(), entry.hex.as_str())).collect()
    }
}
