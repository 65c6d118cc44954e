//! Effect registry for managing available effects
//!
//! The registry holds all registered effect definitions and provides
//! methods to query them and create effect instances by type.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{Effect, EffectDefinition};
use super::types::ParameterInfo;

/// Registry of available effects
///
/// Effects are registered at startup and can be queried by type or category.
/// The registry owns the effect definitions and provides factory methods.
pub struct EffectRegistry {
    /// Effect definitions by type identifier
    effects: HashMap<String, Arc<dyn EffectDefinition>>,
    /// Effect types in registration order
    order: Vec<String>,
    /// Effect types grouped by category
    categories: HashMap<String, Vec<String>>,
    /// Ordered list of categories for display
    category_order: Vec<String>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            effects: HashMap::new(),
            order: Vec::new(),
            categories: HashMap::new(),
            category_order: Vec::new(),
        }
    }

    /// Create a registry holding every built-in effect
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtin_effects(&mut registry);
        registry
    }

    /// Register an effect definition, replacing any with the same type
    pub fn register(&mut self, definition: impl EffectDefinition + 'static) {
        let effect_type = definition.effect_type().to_string();
        let category = definition.category().to_string();

        if self.effects.contains_key(&effect_type) {
            log::warn!("Replacing registered effect '{}'", effect_type);
            for types in self.categories.values_mut() {
                types.retain(|t| t != &effect_type);
            }
            self.order.retain(|t| t != &effect_type);
        }

        if !self.categories.contains_key(&category) {
            self.category_order.push(category.clone());
        }
        self.categories
            .entry(category)
            .or_default()
            .push(effect_type.clone());

        self.order.push(effect_type.clone());
        self.effects.insert(effect_type, Arc::new(definition));
    }

    /// Get an effect definition by type
    pub fn get(&self, effect_type: &str) -> Option<Arc<dyn EffectDefinition>> {
        self.effects.get(effect_type).cloned()
    }

    /// Check if an effect type is registered
    pub fn contains(&self, effect_type: &str) -> bool {
        self.effects.contains_key(effect_type)
    }

    /// Get all registered effect types in registration order
    pub fn effect_types(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Get all effect definitions in registration order
    pub fn effects(&self) -> impl Iterator<Item = &Arc<dyn EffectDefinition>> {
        self.order.iter().filter_map(|t| self.effects.get(t))
    }

    /// Get the number of registered effects
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Get all category names in display order
    pub fn categories(&self) -> &[String] {
        &self.category_order
    }

    /// Get all effect types in a category
    pub fn effects_in_category(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(|v| v.as_slice())
    }

    /// Get the display name for an effect type
    pub fn display_name(&self, effect_type: &str) -> Option<&'static str> {
        self.get(effect_type).map(|def| def.display_name())
    }

    /// Create a new, uninitialized instance of an effect
    pub fn create(&self, effect_type: &str) -> Option<Box<dyn Effect>> {
        self.get(effect_type).map(|def| def.create())
    }

    /// Describe the parameters a fresh instance of an effect would have
    pub fn default_parameters(&self, effect_type: &str) -> Option<Vec<ParameterInfo>> {
        self.create(effect_type).map(|effect| effect.parameters().infos())
    }

    /// Get all effects matching a filter
    pub fn search(&self, query: &str) -> Vec<Arc<dyn EffectDefinition>> {
        let query_lower = query.to_lowercase();
        self.effects()
            .filter(|def| {
                def.display_name().to_lowercase().contains(&query_lower)
                    || def.effect_type().to_lowercase().contains(&query_lower)
                    || def.category().to_lowercase().contains(&query_lower)
            })
            .cloned()
            .collect()
    }
}
