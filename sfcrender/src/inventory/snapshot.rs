use super::{Inventory, InventoryError};
use crate::model::{
    Forwarder, FunctionGroup, FunctionInstance, FunctionType, FunctionTypeDef, LoadSample,
};
use std::collections::{BTreeMap, HashMap};

/// Point-in-time copy of the inventory, taken once per scheduling operation.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    functions: BTreeMap<String, FunctionInstance>,
    forwarders: BTreeMap<String, Forwarder>,
    types: BTreeMap<FunctionType, FunctionTypeDef>,
    groups: BTreeMap<String, FunctionGroup>,
    loads: HashMap<String, LoadSample>,
}

impl InventorySnapshot {
    /// Read everything the scheduler may need. Fails as a whole if any read fails.
    pub fn load(inventory: &dyn Inventory) -> Result<Self, InventoryError> {
        let mut snapshot = Self::default();
        for function in inventory.functions()? {
            if let Some(sample) = inventory.monitoring(&function.name)? {
                snapshot.loads.insert(function.name.clone(), sample);
            }
            snapshot.functions.insert(function.name.clone(), function);
        }
        for forwarder in inventory.forwarders()? {
            snapshot.forwarders.insert(forwarder.name.clone(), forwarder);
        }
        for def in inventory.function_types()? {
            snapshot.types.insert(def.name.clone(), def);
        }
        for group in inventory.groups()? {
            snapshot.groups.insert(group.name.clone(), group);
        }
        Ok(snapshot)
    }

    /// Build a snapshot directly from records.
    pub fn from_parts(
        functions: Vec<FunctionInstance>,
        forwarders: Vec<Forwarder>,
        types: Vec<FunctionTypeDef>,
        loads: Vec<(String, LoadSample)>,
    ) -> Self {
        Self {
            functions: functions.into_iter().map(|f| (f.name.clone(), f)).collect(),
            forwarders: forwarders.into_iter().map(|f| (f.name.clone(), f)).collect(),
            types: types.into_iter().map(|t| (t.name.clone(), t)).collect(),
            groups: BTreeMap::new(),
            loads: loads.into_iter().collect(),
        }
    }

    /// Add function groups to a snapshot built with [`InventorySnapshot::from_parts`].
    pub fn with_groups(mut self, groups: Vec<FunctionGroup>) -> Self {
        self.groups.extend(groups.into_iter().map(|g| (g.name.clone(), g)));
        self
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionInstance> {
        self.functions.values()
    }

    pub fn forwarders(&self) -> impl Iterator<Item = &Forwarder> {
        self.forwarders.values()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInstance> {
        self.functions.get(name)
    }

    pub fn forwarder(&self, name: &str) -> Option<&Forwarder> {
        self.forwarders.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&FunctionGroup> {
        self.groups.get(name)
    }

    pub fn function_type(&self, name: &FunctionType) -> Option<&FunctionTypeDef> {
        self.types.get(name)
    }

    pub fn load_sample(&self, function: &str) -> Option<LoadSample> {
        self.loads.get(function).copied()
    }

    /// Instance names registered for a type, in registration order. Names may refer to instances
    /// that no longer exist. Without a type record, all instances of that type are returned.
    pub fn candidates(&self, function_type: &FunctionType) -> Vec<String> {
        match self.types.get(function_type) {
            Some(def) => def.instances.clone(),
            None => self
                .functions
                .values()
                .filter(|f| &f.function_type == function_type)
                .map(|f| f.name.clone())
                .collect(),
        }
    }

    /// Candidates of a type that currently exist.
    pub fn existing_candidates(&self, function_type: &FunctionType) -> Vec<&FunctionInstance> {
        self.candidates(function_type).iter().filter_map(|n| self.functions.get(n)).collect()
    }

    /// The forwarder hosting a function instance: the first existing forwarder of its
    /// attachments, or else the first forwarder listing it in its function dictionary.
    pub fn hosting_forwarder(&self, function: &str) -> Option<&Forwarder> {
        if let Some(instance) = self.functions.get(function) {
            for attachment in &instance.attachments {
                if let Some(forwarder) = self.forwarders.get(&attachment.forwarder) {
                    return Some(forwarder);
                }
            }
        }
        self.forwarders.values().find(|f| f.functions.contains_key(function))
    }

    /// Function representing a group when a position in the topology is needed.
    pub fn group_anchor(&self, group: &str) -> Option<&FunctionInstance> {
        self.groups.get(group)?.members.iter().find_map(|m| self.functions.get(m))
    }
}
