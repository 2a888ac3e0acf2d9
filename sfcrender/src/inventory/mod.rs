//! # Inventory collaborator
//!
//! Read access to function instances, forwarders, chains and path specs, plus the monitoring
//! samples of the instances. Editing the inventory is not the renderer's business; the in-memory
//! implementation exposes mutators only so tests and the demo binary can set up a topology.

mod snapshot;

pub use snapshot::InventorySnapshot;

use crate::model::{
    Chain, Forwarder, FunctionGroup, FunctionInstance, FunctionType, FunctionTypeDef, LoadSample,
    PathSpec,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),
    #[error("Cannot parse inventory document: {0}")]
    Parse(String),
}

/// Read access to the inventory.
pub trait Inventory: Send + Sync {
    fn functions(&self) -> Result<Vec<FunctionInstance>, InventoryError>;
    fn forwarders(&self) -> Result<Vec<Forwarder>, InventoryError>;
    fn function_types(&self) -> Result<Vec<FunctionTypeDef>, InventoryError>;
    fn groups(&self) -> Result<Vec<FunctionGroup>, InventoryError>;
    fn function(&self, name: &str) -> Result<Option<FunctionInstance>, InventoryError>;
    fn forwarder(&self, name: &str) -> Result<Option<Forwarder>, InventoryError>;
    fn function_type(&self, name: &FunctionType) -> Result<Option<FunctionTypeDef>, InventoryError>;
    fn chain(&self, name: &str) -> Result<Option<Chain>, InventoryError>;
    fn path_spec(&self, name: &str) -> Result<Option<PathSpec>, InventoryError>;
    /// Most recent monitoring sample of a function instance.
    fn monitoring(&self, name: &str) -> Result<Option<LoadSample>, InventoryError>;
}

/// Serializable content of an [`InMemoryInventory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub function_types: Vec<FunctionTypeDef>,
    #[serde(default)]
    pub functions: Vec<FunctionInstance>,
    #[serde(default)]
    pub forwarders: Vec<Forwarder>,
    #[serde(default)]
    pub groups: Vec<FunctionGroup>,
    #[serde(default)]
    pub chains: Vec<Chain>,
    #[serde(default)]
    pub path_specs: Vec<PathSpec>,
    #[serde(default)]
    pub monitoring: BTreeMap<String, LoadSample>,
}

#[derive(Debug, Default)]
struct Tables {
    types: BTreeMap<FunctionType, FunctionTypeDef>,
    functions: BTreeMap<String, FunctionInstance>,
    forwarders: BTreeMap<String, Forwarder>,
    groups: BTreeMap<String, FunctionGroup>,
    chains: BTreeMap<String, Chain>,
    path_specs: BTreeMap<String, PathSpec>,
    monitoring: BTreeMap<String, LoadSample>,
}

/// Inventory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: InventoryDocument) -> Self {
        let inv = Self::new();
        doc.function_types.into_iter().for_each(|t| inv.add_function_type(t));
        doc.functions.into_iter().for_each(|f| inv.add_function(f));
        doc.forwarders.into_iter().for_each(|f| inv.add_forwarder(f));
        doc.groups.into_iter().for_each(|g| inv.add_group(g));
        doc.chains.into_iter().for_each(|c| inv.add_chain(c));
        doc.path_specs.into_iter().for_each(|p| inv.add_path_spec(p));
        doc.monitoring.into_iter().for_each(|(n, s)| inv.set_monitoring(&n, s));
        inv
    }

    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        let doc: InventoryDocument =
            serde_json::from_str(json).map_err(|e| InventoryError::Parse(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    /// Register a function type. Instance names already known for the type are kept.
    pub fn add_function_type(&self, def: FunctionTypeDef) {
        let mut tables = self.tables.write();
        let entry = tables.types.entry(def.name.clone()).or_insert_with(|| FunctionTypeDef {
            name: def.name.clone(),
            ..Default::default()
        });
        entry.bidirectional = def.bidirectional;
        for instance in def.instances {
            if !entry.instances.contains(&instance) {
                entry.instances.push(instance);
            }
        }
    }

    /// Add or replace a function instance and register it with its type.
    pub fn add_function(&self, function: FunctionInstance) {
        let mut tables = self.tables.write();
        let def = tables.types.entry(function.function_type.clone()).or_insert_with(|| {
            FunctionTypeDef { name: function.function_type.clone(), ..Default::default() }
        });
        if !def.instances.contains(&function.name) {
            def.instances.push(function.name.clone());
        }
        tables.functions.insert(function.name.clone(), function);
    }

    pub fn remove_function(&self, name: &str) -> Option<FunctionInstance> {
        let mut tables = self.tables.write();
        let removed = tables.functions.remove(name)?;
        if let Some(def) = tables.types.get_mut(&removed.function_type) {
            def.instances.retain(|n| n != name);
        }
        tables.monitoring.remove(name);
        Some(removed)
    }

    pub fn add_forwarder(&self, forwarder: Forwarder) {
        self.tables.write().forwarders.insert(forwarder.name.clone(), forwarder);
    }

    pub fn remove_forwarder(&self, name: &str) -> Option<Forwarder> {
        self.tables.write().forwarders.remove(name)
    }

    pub fn add_group(&self, group: FunctionGroup) {
        self.tables.write().groups.insert(group.name.clone(), group);
    }

    pub fn add_chain(&self, chain: Chain) {
        self.tables.write().chains.insert(chain.name.clone(), chain);
    }

    pub fn add_path_spec(&self, path_spec: PathSpec) {
        self.tables.write().path_specs.insert(path_spec.name.clone(), path_spec);
    }

    pub fn set_monitoring(&self, function: &str, sample: LoadSample) {
        self.tables.write().monitoring.insert(function.to_string(), sample);
    }

    /// Make every read fail, as if the backing datastore went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), InventoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(InventoryError::Unavailable("inventory marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Inventory for InMemoryInventory {
    fn functions(&self) -> Result<Vec<FunctionInstance>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().functions.values().cloned().collect())
    }

    fn forwarders(&self) -> Result<Vec<Forwarder>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().forwarders.values().cloned().collect())
    }

    fn function_types(&self) -> Result<Vec<FunctionTypeDef>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().types.values().cloned().collect())
    }

    fn groups(&self) -> Result<Vec<FunctionGroup>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().groups.values().cloned().collect())
    }

    fn function(&self, name: &str) -> Result<Option<FunctionInstance>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().functions.get(name).cloned())
    }

    fn forwarder(&self, name: &str) -> Result<Option<Forwarder>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().forwarders.get(name).cloned())
    }

    fn function_type(&self, name: &FunctionType) -> Result<Option<FunctionTypeDef>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().types.get(name).cloned())
    }

    fn chain(&self, name: &str) -> Result<Option<Chain>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().chains.get(name).cloned())
    }

    fn path_spec(&self, name: &str) -> Result<Option<PathSpec>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().path_specs.get(name).cloned())
    }

    fn monitoring(&self, name: &str) -> Result<Option<LoadSample>, InventoryError> {
        self.check()?;
        Ok(self.tables.read().monitoring.get(name).copied())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_functions_register_with_their_type() {
        let inv = InMemoryInventory::new();
        inv.add_function(FunctionInstance::new("fw-1", "firewall"));
        inv.add_function(FunctionInstance::new("fw-2", "firewall"));
        let def = inv.function_type(&"firewall".into()).unwrap().unwrap();
        assert_eq!(def.instances, vec!["fw-1".to_string(), "fw-2".to_string()]);

        inv.remove_function("fw-1");
        let def = inv.function_type(&"firewall".into()).unwrap().unwrap();
        assert_eq!(def.instances, vec!["fw-2".to_string()]);
    }

    #[test]
    fn test_unavailable_inventory_fails_reads() {
        let inv = InMemoryInventory::new();
        inv.set_unavailable(true);
        assert!(inv.functions().is_err());
        inv.set_unavailable(false);
        assert!(inv.functions().is_ok());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "functions": [
                {"name": "fw-1", "function_type": "firewall", "attachments": [{"forwarder": "sff-1"}]}
            ],
            "forwarders": [
                {"name": "sff-1", "locators": [{"name": "eth0", "address": "10.0.0.1"}]}
            ],
            "chains": [{"name": "c", "entries": [{"name": "fw", "function_type": "firewall"}]}],
            "path_specs": [{"name": "p", "chain": "c", "symmetric": true}],
            "monitoring": {"fw-1": {"cpu": 12.5, "memory": 30.0}}
        }"#;
        let inv = InMemoryInventory::from_json(json).unwrap();
        assert_eq!(inv.function("fw-1").unwrap().unwrap().attachments[0].forwarder, "sff-1");
        assert_eq!(inv.path_spec("p").unwrap().unwrap().symmetric, Some(true));
        assert_eq!(inv.monitoring("fw-1").unwrap(), Some(LoadSample::new(12.5, 30.0)));
        assert!(inv.chain("missing").unwrap().is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(InMemoryInventory::from_json("{"), Err(InventoryError::Parse(_))));
    }
}
