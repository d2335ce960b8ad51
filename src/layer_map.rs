//! Frame tree nodes. A [`LayerMap`] pairs a reference frame with the
//! layers drawn in it and the names of its child frames.

use crate::layer::LayerId;
use crate::reference_frame::ReferenceFrame;

/// One node of the frame tree. Children and parent are frame names
/// resolved through the owning set's `all_maps`; layers are ids into its
/// `layer_list`, in draw order.
#[derive(Clone, Debug)]
pub struct LayerMap {
    pub frame: ReferenceFrame,
    pub child_maps: Vec<String>,
    pub parent: Option<String>,
    pub layers: Vec<LayerId>,
    pub enabled: bool,
    pub open: bool,
    pub loaded_from_tour: bool,
}

impl LayerMap {
    pub fn new(frame: ReferenceFrame) -> Self {
        Self {
            frame,
            child_maps: Vec::new(),
            parent: None,
            layers: Vec::new(),
            enabled: true,
            open: false,
            loaded_from_tour: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.frame.name
    }

    pub fn add_child(&mut self, name: &str) {
        if !self.child_maps.iter().any(|c| c == name) {
            self.child_maps.push(name.to_string());
        }
    }

    pub fn remove_child(&mut self, name: &str) -> bool {
        let before = self.child_maps.len();
        self.child_maps.retain(|c| c != name);
        self.child_maps.len() != before
    }

    /// Nothing to draw: no layers, no children, and no marker or path of
    /// its own.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
            && self.child_maps.is_empty()
            && !self.frame.show_as_point
            && !self.frame.show_orbit_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference_frame::Reference;

    #[test]
    fn test_children_are_a_set() {
        let mut m = LayerMap::new(ReferenceFrame::new("Earth", Reference::Earth));
        m.add_child("Moon");
        m.add_child("Moon");
        m.add_child("ISS");
        assert_eq!(m.child_maps, vec!["Moon", "ISS"]);
        assert!(m.remove_child("Moon"));
        assert!(!m.remove_child("Moon"));
    }

    #[test]
    fn test_emptiness_counts_markers() {
        let mut m = LayerMap::new(ReferenceFrame::new("Lander", Reference::Custom));
        assert!(m.is_empty());
        m.frame.show_orbit_path = true;
        assert!(!m.is_empty());
    }
}
