//! Data the 3D viewer needs to load models and focus on a clash.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::model::{ClashElement, ClashRecord, Location};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelUrns {
    pub urns: Vec<String>,
    pub count: usize,
}

/// Distinct, non-empty element URNs across `records`, sorted.
pub fn model_urns<'a, I>(records: I) -> ModelUrns
where
    I: IntoIterator<Item = &'a ClashRecord>,
{
    let urns: BTreeSet<&str> = records
        .into_iter()
        .flat_map(|r| r.elements.iter())
        .map(|e| e.urn.as_str())
        .filter(|urn| !urn.is_empty())
        .collect();
    let urns: Vec<String> = urns.into_iter().map(str::to_string).collect();
    ModelUrns {
        count: urns.len(),
        urns,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerElement {
    pub urn: String,
    pub guid: String,
    pub name: String,
}

impl From<&ClashElement> for ViewerElement {
    fn from(element: &ClashElement) -> Self {
        Self {
            urn: element.urn.clone(),
            guid: element.guid.clone(),
            name: element.name.clone(),
        }
    }
}

/// Both elements of a clash and where they meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerClash {
    pub clash_id: String,
    pub element_a: Option<ViewerElement>,
    pub element_b: Option<ViewerElement>,
    pub location: Location,
}

impl From<&ClashRecord> for ViewerClash {
    fn from(record: &ClashRecord) -> Self {
        Self {
            clash_id: record.id.clone(),
            element_a: record.elements.first().map(ViewerElement::from),
            element_b: record.elements.get(1).map(ViewerElement::from),
            location: record.location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clash::fixtures::record;
    use crate::model::{Severity, Status};
    use pretty_assertions::assert_eq;

    #[test]
    fn urns_are_unique_and_skip_blanks() {
        let a = record("c1", Severity::High, Status::Open);
        let mut b = record("c2", Severity::Low, Status::Open);
        b.elements[0].urn = "urn:c".to_string();
        b.elements[1].urn.clear();

        let urns = model_urns([&a, &b]);
        assert_eq!(urns.urns, vec!["urn:a", "urn:b", "urn:c"]);
        assert_eq!(urns.count, 3);
        assert_eq!(model_urns(std::iter::empty()).count, 0);
    }

    #[test]
    fn viewer_clash_carries_both_elements_and_location() {
        let mut clash = record("c1", Severity::High, Status::Open);
        clash.location = Location {
            x: 1.5,
            y: -2.0,
            z: 3.25,
        };

        let view = ViewerClash::from(&clash);
        assert_eq!(view.clash_id, "c1");
        assert_eq!(view.element_a.as_ref().map(|e| e.guid.as_str()), Some("guid-a"));
        assert_eq!(view.element_b.as_ref().map(|e| e.name.as_str()), Some("Beams-2002"));
        assert_eq!(view.location.z, 3.25);

        clash.elements.truncate(1);
        assert_eq!(ViewerClash::from(&clash).element_b, None);
    }
}
