//! Registry of accounts and their derived addresses.
//!
//! The registry is shared between the notification pipeline (which queues incoming
//! blocks from node receive tasks), the balance loop, and callers issuing queries or
//! transactions. All access goes through one `RwLock`; every read-modify-write happens
//! inside a single lock scope and the lock is never held across an `.await`.

use crate::wallet::WalletError;

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Produces the address at a given derivation index.
pub trait AddressDerivation: Send + Sync {
	fn derive(&self, index: u32) -> Result<String, WalletError>;
}

/// Derivation backed by an explicit list of addresses.
///
/// Used for watch-only accounts whose addresses were derived elsewhere.
#[derive(Debug, Clone)]
pub struct WatchList {
	addresses: Vec<String>,
}

impl WatchList {
	pub fn new(addresses: Vec<String>) -> Self {
		Self { addresses }
	}
}

impl AddressDerivation for WatchList {
	fn derive(&self, index: u32) -> Result<String, WalletError> {
		self.addresses.get(index as usize).cloned().ok_or_else(|| {
			WalletError::Derivation(format!(
				"Watch list has {} address(es), index {} requested",
				self.addresses.len(),
				index
			))
		})
	}
}

/// State held for one derived address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
	pub address: String,
	pub index: u32,
	/// Confirmed balance in raw.
	pub balance: u128,
	/// Balance sent to this address but not yet claimed, in raw.
	pub pending_balance: u128,
	pub representative: Option<String>,
	/// Hashes of incoming send blocks awaiting a receive block, oldest first.
	pub unclaimed: VecDeque<String>,
}

impl Address {
	fn new(address: String, index: u32) -> Self {
		Self {
			address,
			index,
			balance: 0,
			pending_balance: 0,
			representative: None,
			unclaimed: VecDeque::new(),
		}
	}
}

struct Account {
	derivation: Box<dyn AddressDerivation>,
	addresses: Vec<Address>,
}

#[derive(Default)]
struct RegistryInner {
	accounts: Vec<Account>,
	/// address string -> (account position, address position)
	by_address: HashMap<String, (usize, usize)>,
}

impl RegistryInner {
	fn get_mut(&mut self, address: &str) -> Result<&mut Address, WalletError> {
		let (account, slot) = *self
			.by_address
			.get(address)
			.ok_or_else(|| WalletError::UnknownAddress(address.to_string()))?;
		Ok(&mut self.accounts[account].addresses[slot])
	}
}

#[derive(Default)]
pub struct AddressRegistry {
	inner: RwLock<RegistryInner>,
}

impl AddressRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add an account and derive its first address. Returns the account's position.
	pub fn add_account(&self, derivation: Box<dyn AddressDerivation>) -> Result<usize, WalletError> {
		let first = derivation.derive(0)?;
		let mut inner = self.inner.write();
		let position = inner.accounts.len();
		debug!("Adding account {} with first address {}", position, first);
		inner.by_address.insert(first.clone(), (position, 0));
		inner.accounts.push(Account {
			derivation,
			addresses: vec![Address::new(first, 0)],
		});
		Ok(position)
	}

	pub fn account_count(&self) -> usize {
		self.inner.read().accounts.len()
	}

	/// The address at `index` of `account`, deriving any missing addresses up to it.
	pub fn address_for_index(&self, account: usize, index: u32) -> Result<String, WalletError> {
		let mut inner = self.inner.write();
		let inner = &mut *inner;
		let entry = inner
			.accounts
			.get_mut(account)
			.ok_or_else(|| WalletError::Derivation(format!("No account at position {}", account)))?;

		while entry.addresses.len() <= index as usize {
			let next = entry.addresses.len() as u32;
			let derived = entry.derivation.derive(next)?;
			debug!("Derived address {} at index {}", derived, next);
			inner
				.by_address
				.insert(derived.clone(), (account, entry.addresses.len()));
			entry.addresses.push(Address::new(derived, next));
		}

		Ok(entry.addresses[index as usize].address.clone())
	}

	/// Every derived address, in account then index order.
	pub fn addresses(&self) -> Vec<String> {
		self.inner
			.read()
			.accounts
			.iter()
			.flat_map(|account| account.addresses.iter().map(|a| a.address.clone()))
			.collect()
	}

	pub fn owns(&self, address: &str) -> bool {
		self.inner.read().by_address.contains_key(address)
	}

	/// A copy of the address's current state.
	pub fn snapshot(&self, address: &str) -> Option<Address> {
		let inner = self.inner.read();
		let (account, slot) = *inner.by_address.get(address)?;
		Some(inner.accounts[account].addresses[slot].clone())
	}

	pub fn set_balance(&self, address: &str, balance: u128, pending: u128) -> Result<(), WalletError> {
		let mut inner = self.inner.write();
		let entry = inner.get_mut(address)?;
		entry.balance = balance;
		entry.pending_balance = pending;
		Ok(())
	}

	pub fn set_representative(&self, address: &str, representative: &str) -> Result<(), WalletError> {
		let mut inner = self.inner.write();
		inner.get_mut(address)?.representative = Some(representative.to_string());
		Ok(())
	}

	/// Queue an incoming block hash for claiming. Returns false if it was already queued.
	pub fn record_unclaimed(&self, address: &str, hash: &str) -> Result<bool, WalletError> {
		let mut inner = self.inner.write();
		let entry = inner.get_mut(address)?;
		if entry.unclaimed.iter().any(|queued| queued == hash) {
			return Ok(false);
		}
		entry.unclaimed.push_back(hash.to_string());
		Ok(true)
	}

	/// Remove and return the oldest unclaimed hash for `address`.
	pub fn take_unclaimed(&self, address: &str) -> Result<Option<String>, WalletError> {
		let mut inner = self.inner.write();
		Ok(inner.get_mut(address)?.unclaimed.pop_front())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> AddressRegistry {
		let registry = AddressRegistry::new();
		registry
			.add_account(Box::new(WatchList::new(vec![
				"xrb_1first".to_string(),
				"xrb_1second".to_string(),
			])))
			.unwrap();
		registry
	}

	#[test]
	fn test_first_address_is_derived_on_add() {
		let registry = registry();
		assert_eq!(registry.addresses(), vec!["xrb_1first".to_string()]);
		assert!(registry.owns("xrb_1first"));
		assert!(!registry.owns("xrb_1second"));
	}

	#[test]
	fn test_addresses_grow_on_demand() {
		let registry = registry();
		assert_eq!(registry.address_for_index(0, 1).unwrap(), "xrb_1second");
		assert!(registry.owns("xrb_1second"));
		assert_eq!(registry.snapshot("xrb_1second").unwrap().index, 1);
		assert!(matches!(
			registry.address_for_index(0, 2),
			Err(WalletError::Derivation(_))
		));
		assert!(matches!(
			registry.address_for_index(3, 0),
			Err(WalletError::Derivation(_))
		));
	}

	#[test]
	fn test_unclaimed_queue_is_fifo_without_duplicates() {
		let registry = registry();
		assert!(registry.record_unclaimed("xrb_1first", "A").unwrap());
		assert!(registry.record_unclaimed("xrb_1first", "B").unwrap());
		assert!(!registry.record_unclaimed("xrb_1first", "A").unwrap());

		assert_eq!(registry.take_unclaimed("xrb_1first").unwrap(), Some("A".to_string()));
		assert_eq!(registry.take_unclaimed("xrb_1first").unwrap(), Some("B".to_string()));
		assert_eq!(registry.take_unclaimed("xrb_1first").unwrap(), None);
	}

	#[test]
	fn test_unknown_address_is_an_error() {
		let registry = registry();
		assert!(matches!(
			registry.set_balance("xrb_1nobody", 1, 0),
			Err(WalletError::UnknownAddress(_))
		));
		assert!(registry.snapshot("xrb_1nobody").is_none());
	}

	#[test]
	fn test_balance_and_representative_updates() {
		let registry = registry();
		registry.set_balance("xrb_1first", 100, 7).unwrap();
		registry.set_representative("xrb_1first", "xrb_1rep").unwrap();

		let snapshot = registry.snapshot("xrb_1first").unwrap();
		assert_eq!(snapshot.balance, 100);
		assert_eq!(snapshot.pending_balance, 7);
		assert_eq!(snapshot.representative.as_deref(), Some("xrb_1rep"));
	}
}
