use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAssociation {
    pub name: String,
    /// `None` when the tag is created by this plan first.
    pub tag_id: Option<String>,
}

/// Store calls needed to move a note from its current tag names to the
/// desired ones. Names present on both sides never appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPlan {
    pub note_id: String,
    pub current: BTreeMap<String, String>,
    pub to_create: Vec<String>,
    pub to_associate: Vec<PlannedAssociation>,
    pub to_disassociate: Vec<(String, String)>,
}

impl TagPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_associate.is_empty() && self.to_disassociate.is_empty()
    }

    pub fn resulting_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.current.keys().cloned().collect();
        for (name, _) in &self.to_disassociate {
            names.remove(name);
        }
        names.extend(self.to_associate.iter().map(|a| a.name.clone()));
        names
    }
}

/// Diffs a note's current tag names against the desired ones.
///
/// `known_by_name` maps the owner's tag names to ids. Desired names missing
/// from it are planned as creations. Lookups are exact; no case folding.
pub fn reconcile(
    note_id: &str,
    current: &BTreeSet<String>,
    desired: &BTreeSet<String>,
    known_by_name: &HashMap<String, String>,
) -> TagPlan {
    let mut plan = TagPlan {
        note_id: note_id.to_string(),
        ..TagPlan::default()
    };

    for name in current {
        match known_by_name.get(name) {
            Some(id) => {
                plan.current.insert(name.clone(), id.clone());
            }
            None => tracing::warn!(note_id, tag = %name, "current tag has no known id"),
        }
    }

    for name in desired.difference(current) {
        let tag_id = known_by_name.get(name).cloned();
        if tag_id.is_none() {
            plan.to_create.push(name.clone());
        }
        plan.to_associate.push(PlannedAssociation {
            name: name.clone(),
            tag_id,
        });
    }

    for name in current.difference(desired) {
        if let Some(id) = plan.current.get(name) {
            plan.to_disassociate.push((name.clone(), id.clone()));
        }
    }

    plan
}
