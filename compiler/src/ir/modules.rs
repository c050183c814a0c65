//! IR Modules
//!
//! This module defines the top-level compilation unit: a set of functions,
//! bodies held back for lazy materialization, and the named metadata tables
//! through which a module advertises its entry points to the runtime.

use super::{IrFunction, IrFunctionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IR module - represents a compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name
    pub name: String,

    /// Functions known to this module. A function whose body is still in
    /// `lazy_bodies` appears here as a declaration.
    pub functions: BTreeMap<IrFunctionId, IrFunction>,

    /// Bodies not yet materialized, keyed by the id of their declaration
    pub lazy_bodies: BTreeMap<IrFunctionId, IrFunction>,

    /// Named metadata: append-only, order-preserving string tables
    pub named_metadata: IndexMap<String, Vec<String>>,

    /// Next available function ID
    pub next_function_id: u32,
}

impl IrModule {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: BTreeMap::new(),
            lazy_bodies: BTreeMap::new(),
            named_metadata: IndexMap::new(),
            next_function_id: 0,
        }
    }

    /// Add a function to the module
    pub fn add_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = function.id;
        self.functions.insert(id, function);
        self.next_function_id = self.next_function_id.max(id.0 + 1);
        id
    }

    /// Add a function whose body is only realized on first use
    pub fn add_lazy_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = self.add_function(function.to_declaration());
        if !function.is_declaration() {
            self.lazy_bodies.insert(id, function);
        }
        id
    }

    /// Allocate a new function ID
    pub fn alloc_function_id(&mut self) -> IrFunctionId {
        let id = IrFunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    /// Get a function by id, regardless of materialization state
    pub fn get_function(&self, id: IrFunctionId) -> Option<&IrFunction> {
        self.functions.get(&id)
    }

    pub fn get_function_mut(&mut self, id: IrFunctionId) -> Option<&mut IrFunction> {
        self.functions.get_mut(&id)
    }

    /// Id of the function named `name`, materialized or not
    pub fn function_id(&self, name: &str) -> Option<IrFunctionId> {
        self.functions
            .values()
            .find(|f| f.name == name)
            .map(|f| f.id)
    }

    /// Look up a callable entry point by name.
    ///
    /// Returns `None` if the symbol is unknown or its body has not been
    /// materialized yet; call [`IrModule::materialize`] first.
    pub fn get_function_by_name(&self, name: &str) -> Option<&IrFunction> {
        self.functions
            .values()
            .find(|f| f.name == name && !self.lazy_bodies.contains_key(&f.id))
    }

    /// Whether a function with this name has a body waiting to be realized
    pub fn is_materializable(&self, name: &str) -> bool {
        self.function_id(name)
            .is_some_and(|id| self.lazy_bodies.contains_key(&id))
    }

    /// Realize the body of `name` if it is still pending.
    ///
    /// Idempotent. Returns whether the function is available afterwards.
    pub fn materialize(&mut self, name: &str) -> bool {
        let Some(id) = self.function_id(name) else {
            return false;
        };
        if let Some(body) = self.lazy_bodies.remove(&id) {
            self.functions.insert(id, body);
        }
        true
    }

    /// Whether any symbol in the module uses this name
    pub fn has_symbol(&self, name: &str) -> bool {
        self.function_id(name).is_some()
    }

    /// Entries of a named metadata table (empty if the table does not exist)
    pub fn named_metadata(&self, key: &str) -> &[String] {
        self.named_metadata
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Append one record to a named metadata table, creating it if needed
    pub fn append_named_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.named_metadata
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// Verify module integrity
    pub fn verify(&self) -> Result<(), String> {
        for (id, function) in &self.functions {
            function
                .verify()
                .map_err(|e| format!("Function {} error: {}", id, e))?;
        }

        for id in self.lazy_bodies.keys() {
            if !self.functions.contains_key(id) {
                return Err(format!("Lazy body {} has no declaration", id));
            }
        }

        Ok(())
    }

    /// Get module statistics
    pub fn stats(&self) -> ModuleStats {
        ModuleStats {
            function_count: self.functions.len(),
            lazy_count: self.lazy_bodies.len(),
            metadata_tables: self.named_metadata.len(),
        }
    }
}

/// Module statistics
#[derive(Debug, PartialEq, Eq)]
pub struct ModuleStats {
    pub function_count: usize,
    pub lazy_count: usize,
    pub metadata_tables: usize,
}
