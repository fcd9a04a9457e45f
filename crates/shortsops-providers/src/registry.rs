//! Renderer lookup by provider selector.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::VideoRenderer;

/// Renderers keyed by the selector carried in render jobs.
#[derive(Default, Clone)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn VideoRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, renderer: Arc<dyn VideoRenderer>) -> Self {
        self.register(name, renderer);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, renderer: Arc<dyn VideoRenderer>) {
        self.renderers.insert(name.into().to_lowercase(), renderer);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<dyn VideoRenderer>> {
        self.renderers.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.renderers.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.renderers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
