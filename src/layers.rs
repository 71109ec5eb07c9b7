use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: u64,
    pub name: String,
    pub order: i32,
    pub visible: bool,
    pub locked: bool,
}

pub const DEFAULT_LAYER_NAME: &str = "Layer 1";

/// Ordered, named containers that group annotations. Kept sorted by `order`
/// ascending (lowest painted first). Orders are unique at any instant.
#[derive(Clone, Debug, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
    active: Option<u64>,
    next_id: u64,
}

impl LayerRegistry {
    pub fn from_loaded(mut layers: Vec<Layer>) -> Self {
        layers.sort_by_key(|l| l.order);
        let next_id = layers.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        let active = layers.first().map(|l| l.id);
        Self {
            layers,
            active,
            next_id,
        }
    }

    /// Explicit first-load initialization: materializes the default layer
    /// when the evaluation has none yet. Returns the created layer so the
    /// caller can persist it.
    pub fn ensure_default(&mut self) -> Option<Layer> {
        if self.layers.is_empty() {
            self.create(DEFAULT_LAYER_NAME)
        } else {
            None
        }
    }

    /// Assigns the next paint order; the evaluation's first layer becomes
    /// active automatically. Rejects names that trim to empty.
    pub fn create(&mut self, name: &str) -> Option<Layer> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let order = self.layers.iter().map(|l| l.order).max().map_or(0, |o| o + 1);
        let layer = Layer {
            id: self.allocate_id(),
            name: name.to_string(),
            order,
            visible: true,
            locked: false,
        };
        self.layers.push(layer.clone());
        if self.active.is_none() {
            self.active = Some(layer.id);
        }
        Some(layer)
    }

    pub fn rename(&mut self, id: u64, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Returns the new visibility, or `None` for an unknown layer.
    pub fn toggle_visibility(&mut self, id: u64) -> Option<bool> {
        let layer = self.layers.iter_mut().find(|l| l.id == id)?;
        layer.visible = !layer.visible;
        Some(layer.visible)
    }

    /// Returns the new lock state, or `None` for an unknown layer.
    pub fn toggle_lock(&mut self, id: u64) -> Option<bool> {
        let layer = self.layers.iter_mut().find(|l| l.id == id)?;
        layer.locked = !layer.locked;
        Some(layer.locked)
    }

    /// Removes the layer. If it was active, the first remaining layer (by
    /// paint order) becomes active, or none. Cascading the owned
    /// annotations is the caller's job.
    pub fn delete(&mut self, id: u64) -> Option<Layer> {
        let idx = self.layers.iter().position(|l| l.id == id)?;
        let removed = self.layers.remove(idx);
        if self.active == Some(id) {
            self.active = self.layers.first().map(|l| l.id);
        }
        Some(removed)
    }

    /// Best-effort reorder: swaps paint order with the neighbor in the given
    /// direction. Order uniqueness is preserved by the swap.
    pub fn move_by(&mut self, id: u64, delta: i32) -> bool {
        let Some(idx) = self.layers.iter().position(|l| l.id == id) else {
            return false;
        };
        let target = idx as i64 + delta as i64;
        if target < 0 || target as usize >= self.layers.len() {
            return false;
        }
        let target = target as usize;
        let (a, b) = (self.layers[idx].order, self.layers[target].order);
        self.layers[idx].order = b;
        self.layers[target].order = a;
        self.layers.sort_by_key(|l| l.order);
        true
    }

    pub fn set_active(&mut self, id: u64) -> bool {
        if self.layers.iter().any(|l| l.id == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<u64> {
        self.active
    }

    pub fn get(&self, id: u64) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_ascending_orders_and_first_becomes_active() {
        let mut registry = LayerRegistry::default();
        let a = registry.create("Base").unwrap();
        let b = registry.create("Marks").unwrap();
        assert_eq!(a.order, 0);
        assert_eq!(b.order, 1);
        assert_eq!(registry.active_id(), Some(a.id));
    }

    #[test]
    fn create_rejects_blank_names() {
        let mut registry = LayerRegistry::default();
        assert!(registry.create("   ").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn rename_trims_and_rejects_empty() {
        let mut registry = LayerRegistry::default();
        let layer = registry.create("Base").unwrap();
        assert!(registry.rename(layer.id, "  Occlusal  "));
        assert_eq!(registry.get(layer.id).unwrap().name, "Occlusal");
        assert!(!registry.rename(layer.id, "  "));
        assert_eq!(registry.get(layer.id).unwrap().name, "Occlusal");
    }

    #[test]
    fn delete_reassigns_active_to_first_remaining() {
        let mut registry = LayerRegistry::default();
        let a = registry.create("A").unwrap();
        let b = registry.create("B").unwrap();
        registry.set_active(b.id);
        registry.delete(b.id);
        assert_eq!(registry.active_id(), Some(a.id));
        registry.delete(a.id);
        assert_eq!(registry.active_id(), None);
    }

    #[test]
    fn ensure_default_materializes_exactly_once() {
        let mut registry = LayerRegistry::default();
        let created = registry.ensure_default().unwrap();
        assert_eq!(created.name, DEFAULT_LAYER_NAME);
        assert_eq!(created.order, 0);
        assert!(registry.ensure_default().is_none());
        assert_eq!(registry.layers().len(), 1);
    }

    #[test]
    fn move_by_swaps_orders_and_keeps_them_unique() {
        let mut registry = LayerRegistry::default();
        let a = registry.create("A").unwrap();
        let b = registry.create("B").unwrap();
        assert!(registry.move_by(a.id, 1));
        let orders: Vec<(u64, i32)> = registry.layers().iter().map(|l| (l.id, l.order)).collect();
        assert_eq!(orders, vec![(b.id, 0), (a.id, 1)]);
        // Out of range is a no-op.
        assert!(!registry.move_by(a.id, 1));
    }

    #[test]
    fn toggles_report_new_state() {
        let mut registry = LayerRegistry::default();
        let layer = registry.create("A").unwrap();
        assert_eq!(registry.toggle_visibility(layer.id), Some(false));
        assert_eq!(registry.toggle_lock(layer.id), Some(true));
        assert_eq!(registry.toggle_visibility(99), None);
    }

    #[test]
    fn from_loaded_sorts_by_order() {
        let layers = vec![
            Layer {
                id: 7,
                name: "Top".into(),
                order: 2,
                visible: true,
                locked: false,
            },
            Layer {
                id: 3,
                name: "Bottom".into(),
                order: 0,
                visible: true,
                locked: false,
            },
        ];
        let registry = LayerRegistry::from_loaded(layers);
        assert_eq!(registry.layers()[0].id, 3);
        assert_eq!(registry.active_id(), Some(3));
        // New layers never collide with loaded ids.
        let mut registry = registry;
        let fresh = registry.create("New").unwrap();
        assert_eq!(fresh.id, 8);
        assert_eq!(fresh.order, 3);
    }
}
