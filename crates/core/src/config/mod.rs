//! Tiered configuration: batch defaults, cluster overrides, user options.
//!
//! A [`ConfigCatalog`] names every known batch server and cluster and carries a
//! table of defaults for each. [`ConfigCatalog::resolve`] flattens the three
//! tiers into a [`ResolvedContext`]; a later tier overwrites an earlier one on
//! key collision.
//!
//! The built-in catalog is embedded at compile time. A user catalog file of the
//! same shape can be layered on top with [`ConfigCatalog::load_layered`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result, ValidationError};

mod context;

pub use context::{DEFAULT_TEMPLATE, PHONE_HOME_KEY, ResolvedContext, TEMPLATE_KEY, coerce};

/// One tier's key/value table.
pub type ConfigTable = Map<String, Value>;

/// Batch server the session is submitted to when none is given.
pub const DEFAULT_BATCH: &str = "oxymoron";
/// Cluster the session runs on when none is given.
pub const DEFAULT_CLUSTER: &str = "glenn";

const BUILTIN_CATALOG: &str = include_str!("builtin.json");

static BUILTIN: LazyLock<std::result::Result<ConfigCatalog, String>> =
	LazyLock::new(|| serde_json::from_str(BUILTIN_CATALOG).map_err(|e| e.to_string()));

/// Known batch servers and clusters with their default tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigCatalog {
	#[serde(default)]
	pub batch: BTreeMap<String, ConfigTable>,
	#[serde(default)]
	pub cluster: BTreeMap<String, ConfigTable>,
}

impl ConfigCatalog {
	/// The catalog compiled into this crate.
	pub fn builtin() -> Result<Self> {
		BUILTIN
			.clone()
			.map_err(|e| Error::Config(format!("invalid built-in catalog: {e}")))
	}

	/// Parses a catalog from JSON text.
	pub fn from_json(text: &str) -> Result<Self> {
		serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid catalog: {e}")))
	}

	/// Reads a catalog file.
	pub fn load(path: &Path) -> Result<Self> {
		let text = fs::read_to_string(path)
			.map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
		Self::from_json(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
	}

	/// Built-in catalog with a user catalog merged over it.
	///
	/// An explicit `path` must exist. Without one, the default location is used
	/// when a file is present there.
	pub fn load_layered(path: Option<&Path>) -> Result<Self> {
		let mut catalog = Self::builtin()?;
		let user_path = match path {
			Some(p) => Some(p.to_path_buf()),
			None => Self::default_path().filter(|p| p.is_file()),
		};
		if let Some(user_path) = user_path {
			debug!(target = "vnc.config", path = %user_path.display(), "layering user catalog");
			catalog.merge(&Self::load(&user_path)?);
		}
		Ok(catalog)
	}

	/// `vnc/catalog.json` under the platform config dir (`$XDG_CONFIG_HOME` on Linux).
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("vnc").join("catalog.json"))
	}

	/// Merges `other` into `self`, key by key within each id's table.
	pub fn merge(&mut self, other: &ConfigCatalog) {
		merge_tables(&mut self.batch, &other.batch);
		merge_tables(&mut self.cluster, &other.cluster);
	}

	pub fn has_batch(&self, id: &str) -> bool {
		self.batch.contains_key(id)
	}

	pub fn has_cluster(&self, id: &str) -> bool {
		self.cluster.contains_key(id)
	}

	pub fn batches(&self) -> impl Iterator<Item = &str> {
		self.batch.keys().map(String::as_str)
	}

	pub fn clusters(&self) -> impl Iterator<Item = &str> {
		self.cluster.keys().map(String::as_str)
	}

	/// Flattens batch defaults, cluster overrides and `user` options, in that
	/// order, into one context.
	///
	/// # Errors
	///
	/// [`ValidationError::UnknownBatchType`] or [`ValidationError::UnknownCluster`]
	/// when either id is not in the catalog. Both ids are checked before any
	/// merging happens.
	pub fn resolve(
		&self,
		batch: &str,
		cluster: &str,
		user: &ConfigTable,
	) -> std::result::Result<ResolvedContext, ValidationError> {
		let batch_defaults = self
			.batch
			.get(batch)
			.ok_or_else(|| ValidationError::UnknownBatchType(batch.to_string()))?;
		let cluster_overrides = self
			.cluster
			.get(cluster)
			.ok_or_else(|| ValidationError::UnknownCluster(cluster.to_string()))?;

		let mut values = BTreeMap::new();
		for tier in [batch_defaults, cluster_overrides, user] {
			for (key, value) in tier {
				values.insert(key.clone(), coerce(value));
			}
		}
		Ok(ResolvedContext::from_values(values))
	}
}

fn merge_tables(into: &mut BTreeMap<String, ConfigTable>, from: &BTreeMap<String, ConfigTable>) {
	for (id, table) in from {
		let target = into.entry(id.clone()).or_default();
		for (key, value) in table {
			target.insert(key.clone(), value.clone());
		}
	}
}
