use crate::{data::Database, error::StorageError};
use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{Arc, RwLock},
};

/// Changes of a single open transaction. `None` marks a deletion.
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

#[derive(Default)]
struct Layers {
	committed: BTreeMap<Vec<u8>, Vec<u8>>,
	transactions: Vec<Overlay>,
}

impl Layers {
	fn apply(&mut self, key: &[u8], value: Option<Vec<u8>>) {
		match (self.transactions.last_mut(), value) {
			(Some(overlay), value) => {
				overlay.insert(key.to_vec(), value);
			},
			(None, Some(value)) => {
				self.committed.insert(key.to_vec(), value);
			},
			(None, None) => {
				self.committed.remove(key);
			},
		}
	}
}

#[derive(Clone, Default)]
pub struct MemoryDB {
	layers: Arc<RwLock<Layers>>,
}

impl Database for MemoryDB {
	fn get_raw(&self, key: &[u8]) -> Option<Vec<u8>> {
		let layers = self.layers.read().expect("Lock acquired");
		for overlay in layers.transactions.iter().rev() {
			if let Some(value) = overlay.get(key) {
				return value.clone();
			}
		}
		layers.committed.get(key).cloned()
	}

	fn put_raw(&self, key: &[u8], value: Vec<u8>) {
		let mut layers = self.layers.write().expect("Lock acquired");
		layers.apply(key, Some(value));
	}

	fn delete_raw(&self, key: &[u8]) {
		let mut layers = self.layers.write().expect("Lock acquired");
		layers.apply(key, None);
	}

	fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
		let layers = self.layers.read().expect("Lock acquired");
		let mut keys = layers
			.committed
			.keys()
			.filter(|key| key.starts_with(prefix))
			.cloned()
			.collect::<BTreeSet<_>>();

		for overlay in &layers.transactions {
			for (key, value) in overlay.iter().filter(|(key, _)| key.starts_with(prefix)) {
				match value {
					Some(_) => keys.insert(key.clone()),
					None => keys.remove(key),
				};
			}
		}
		keys.into_iter().collect()
	}

	fn start_transaction(&self) {
		let mut layers = self.layers.write().expect("Lock acquired");
		layers.transactions.push(Overlay::new());
	}

	fn commit_transaction(&self) -> Result<(), StorageError> {
		let mut layers = self.layers.write().expect("Lock acquired");
		let overlay = layers
			.transactions
			.pop()
			.ok_or(StorageError::NoOpenTransaction)?;

		for (key, value) in overlay {
			layers.apply(&key, value);
		}
		Ok(())
	}

	fn rollback_transaction(&self) -> Result<(), StorageError> {
		let mut layers = self.layers.write().expect("Lock acquired");
		layers
			.transactions
			.pop()
			.map(|_| ())
			.ok_or(StorageError::NoOpenTransaction)
	}
}
