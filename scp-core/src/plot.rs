use std::collections::HashMap;

use serde::{Serialize, ser::SerializeMap};

pub mod dot_plot;
pub mod expression;
pub mod range;
pub mod traces;

/// Colorscales the plotting client knows by name.
pub const COLORSCALE_THEMES: [&str; 16] = [
    "Blackbody", "Bluered", "Blues", "Earth", "Electric", "Greens", "Hot", "Jet", "Picnic",
    "Portland", "Rainbow", "RdBu", "Reds", "Viridis", "YlGnBu", "YlOrRd",
];

pub const DEFAULT_COLORSCALE: &str = "Reds";

/// Per-study marker settings folded into every trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotStyle {
    pub point_size: f64,
    pub show_borders: bool,
    pub expression_label: String,
}

impl PlotStyle {
    #[must_use]
    pub fn border_width(&self) -> f64 {
        if self.show_borders { 0.5 } else { 0.0 }
    }
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            point_size: 3.0,
            show_borders: true,
            expression_label: "Expression".to_string(),
        }
    }
}

/// Traces keyed by name. Serializes as a JSON object whose keys keep insertion
/// order, which is the order the client draws legends in.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceMap<T> {
    entries: Vec<(String, T)>,
    positions: HashMap<String, usize>,
}

impl<T> Default for TraceMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T> TraceMap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, trace: T) {
        match self.positions.get(key) {
            Some(&index) => self.entries[index].1 = trace,
            None => {
                self.push(key, trace);
            }
        }
    }

    fn push(&mut self, key: &str, trace: T) -> usize {
        self.entries.push((key.to_string(), trace));
        let index = self.entries.len() - 1;
        self.positions.insert(key.to_string(), index);

        index
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.positions.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.positions.get(key).map(|&i| &mut self.entries[i].1)
    }

    /// Returns the trace under `key`, creating it with `init` if absent.
    pub fn entry(&mut self, key: &str, init: impl FnOnce() -> T) -> &mut T {
        let index = match self.positions.get(key) {
            Some(&index) => index,
            None => self.push(key, init()),
        };

        &mut self.entries[index].1
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|(_, t)| keep(t));
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, t)| t)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, t)| t)
    }
}

impl<T: Serialize> Serialize for TraceMap<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, trace) in &self.entries {
            map.serialize_entry(key, trace)?;
        }

        map.end()
    }
}
