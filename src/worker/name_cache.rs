use std::collections::HashMap;

use ethers_core::types::Address;

/// Bidirectional name <-> address map
///
/// Names are matched case-insensitively but returned as registered. Each name maps to at most
/// one address and each address to at most one name: inserting a pair evicts whatever either
/// side was previously paired with.
#[derive(Debug, Clone, Default)]
pub struct NameCache {
    by_name: HashMap<String, Address>,
    by_address: HashMap<Address, String>,
}

impl NameCache {
    pub fn insert(&mut self, name: &str, address: Address) {
        let key = name.to_lowercase();

        if let Some(previous) = self.by_address.remove(&address) {
            self.by_name.remove(&previous.to_lowercase());
        }
        if let Some(owner) = self.by_name.remove(&key) {
            self.by_address.remove(&owner);
        }

        self.by_name.insert(key, address);
        self.by_address.insert(address, name.to_owned());
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn name_of(&self, address: &Address) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_address.clear();
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.by_name.len(), self.by_address.len());
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(name, address)` pairs in arbitrary order
    pub fn entries(&self) -> impl Iterator<Item = (&str, Address)> + '_ {
        self.by_address
            .iter()
            .map(|(address, name)| (name.as_str(), *address))
    }
}
