use serde::{Deserialize, Serialize};

/// Stable identifier for a node within one snapshot. Ids are not
/// comparable across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl UiBounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Geometric center, the point handed to input synthesis.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// One element of a snapshot, with the attributes the search path reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiNode {
    pub id: NodeId,
    pub role: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub value: Option<String>,
    pub help: Option<String>,
    pub enabled: bool,
    pub bounds: Option<UiBounds>,
    pub children: Vec<NodeId>,
}

impl UiNode {
    /// Look up a searchable attribute by its AX name. Returns `None` for
    /// absent or empty values so the attribute-priority walk can skip
    /// them.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let value = match name {
            "AXTitle" => self.title.as_deref(),
            "AXDescription" => self.description.as_deref(),
            "AXValue" => self.value.as_deref(),
            "AXHelp" => self.help.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn center(&self) -> Option<(f64, f64)> {
        self.bounds.map(|b| b.center())
    }
}
