//! Embedded SKU structures.
//!
//! An item may carry an inline XML document describing its variants:
//!
//! ```xml
//! <SKUs>
//!   <SKU id="A"><Name>Small</Name><SkuData><Color>red</Color></SkuData></SKU>
//! </SKUs>
//! ```

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::xml::Element;

/// One embedded variant record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuRecord {
    pub id: String,
    /// Text of the `Name` element, when the element is present.
    pub name: Option<String>,
    /// Per-variant override fields, in document order.
    pub data: Vec<(String, String)>,
}

/// Parse an embedded SKU document.
///
/// Records without an `id` attribute are skipped. Empty or malformed input
/// yields no records.
pub fn parse_skus(xml: &str, data_element: &str) -> Vec<SkuRecord> {
    if xml.trim().is_empty() {
        return Vec::new();
    }

    let root = match Element::parse(xml) {
        Ok(root) => root,
        Err(e) => {
            warn!("Ignoring malformed SKU data: {}", e);
            return Vec::new();
        }
    };

    root.elements()
        .filter_map(|sku| {
            let id = match sku.attr("id") {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    debug!("Skipping SKU element without id");
                    return None;
                }
            };

            let name = sku.child("Name").map(|n| n.text());

            let data = sku
                .child(data_element)
                .map(|d| d.elements().map(|e| (e.name.clone(), e.text())).collect())
                .unwrap_or_default();

            Some(SkuRecord { id, name, data })
        })
        .collect()
}

/// Codes only present in one revision of an embedded SKU structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkuDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SkuDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compares two revisions of an embedded SKU structure.
#[derive(Debug, Clone)]
pub struct SkuDiffer {
    data_element: String,
}

impl SkuDiffer {
    pub fn new(data_element: impl Into<String>) -> Self {
        Self {
            data_element: data_element.into(),
        }
    }

    /// Compute added and removed SKU ids. Absent or malformed XML on either
    /// side counts as an empty collection.
    pub fn diff(&self, old_xml: Option<&str>, new_xml: Option<&str>) -> SkuDiff {
        let old = self.ids(old_xml);
        let new = self.ids(new_xml);

        SkuDiff {
            added: new.difference(&old).cloned().collect(),
            removed: old.difference(&new).cloned().collect(),
        }
    }

    fn ids(&self, xml: Option<&str>) -> BTreeSet<String> {
        xml.map(|x| parse_skus(x, &self.data_element))
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }
}

impl Default for SkuDiffer {
    fn default() -> Self {
        Self::new("SkuData")
    }
}
