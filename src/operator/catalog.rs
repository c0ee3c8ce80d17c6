use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};

use super::definition::{OperatorDecl, OperatorDefinition};
use super::operator::Operator;

/// Process-lifetime registry of operators, addressable by name or symbol.
#[derive(Default)]
pub struct OperatorCatalog {
    // names and symbols share one key space
    entries: DashMap<String, Arc<OperatorDefinition>>,
}

impl OperatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "debug", skip(self, decl, operator), fields(operator = %decl.name))]
    pub fn register(
        &self,
        decl: OperatorDecl,
        operator: Arc<dyn Operator>,
    ) -> EngineResult<Arc<OperatorDefinition>> {
        let definition = Arc::new(OperatorDefinition::from_decl(decl, operator)?);
        let name = definition.name().to_string();

        if let Some(symbol) = definition.symbol() {
            if symbol == name || self.entries.contains_key(symbol) {
                return Err(EngineError::DuplicateOperator(symbol.to_string()));
            }
        }

        match self.entries.entry(name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateOperator(name)),
            Entry::Vacant(slot) => {
                slot.insert(definition.clone());
            }
        }

        if let Some(symbol) = definition.symbol() {
            // the entry guard must be gone before the name is rolled back
            let inserted = match self.entries.entry(symbol.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(definition.clone());
                    true
                }
            };
            if !inserted {
                self.entries.remove(&name);
                return Err(EngineError::DuplicateOperator(symbol.to_string()));
            }
        }

        debug!(
            arity = %definition.arity(),
            laziness = %definition.laziness(),
            cache = %definition.cache_policy(),
            "operator registered"
        );
        Ok(definition)
    }

    pub fn resolve(&self, name_or_symbol: &str) -> EngineResult<Arc<OperatorDefinition>> {
        self.entries
            .get(name_or_symbol)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownOperator(name_or_symbol.to_string()))
    }

    pub fn contains(&self, name_or_symbol: &str) -> bool {
        self.entries.contains_key(name_or_symbol)
    }

    /// Registered operator names, sorted. Symbols are not listed.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key() == entry.value().name())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
