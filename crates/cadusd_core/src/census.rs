//! Usage census: which definitions are actually instantiated.
//!
//! Runs once over the whole document before anything is written. Hidden
//! instances and groups (or ones on invisible layers) do not count, so a
//! definition that is only reachable through hidden entities is never
//! emitted.

use std::collections::{BTreeSet, HashMap};

use crate::source::{DefinitionId, EntityList, SourceDocument, SourceResult};

/// Result of the usage census.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Census {
    /// Transitively used definitions
    pub used: BTreeSet<DefinitionId>,

    /// Visible instances and groups reachable from the root, counting every
    /// path through nested definitions. Only used for progress reporting.
    pub reachable_entities: u64,
}

impl Census {
    /// Walk the document from its root entities.
    pub fn run<D: SourceDocument + ?Sized>(doc: &D) -> SourceResult<Self> {
        let mut walker = CensusWalker {
            doc,
            used: BTreeSet::new(),
            subtree_counts: HashMap::new(),
        };
        let root = doc.root_entities()?;
        let reachable_entities = walker.visit(&root)?;
        Ok(Self {
            used: walker.used,
            reachable_entities,
        })
    }

    pub fn is_used(&self, id: DefinitionId) -> bool {
        self.used.contains(&id)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }
}

struct CensusWalker<'a, D: SourceDocument + ?Sized> {
    doc: &'a D,
    used: BTreeSet<DefinitionId>,
    /// Reachable-entity count of each definition's own subtree
    subtree_counts: HashMap<DefinitionId, u64>,
}

impl<D: SourceDocument + ?Sized> CensusWalker<'_, D> {
    fn visit(&mut self, entities: &EntityList) -> SourceResult<u64> {
        let mut count = 0;

        for &id in &entities.instances {
            let instance = self.doc.instance(id)?;
            if !instance.visibility.is_visible() {
                continue;
            }
            count += 1 + self.visit_definition(instance.definition)?;
        }

        for &id in &entities.groups {
            let group = self.doc.group(id)?;
            if !group.visibility.is_visible() {
                continue;
            }
            count += 1 + self.visit(&group.entities)?;
        }

        Ok(count)
    }

    fn visit_definition(&mut self, id: DefinitionId) -> SourceResult<u64> {
        if let Some(&count) = self.subtree_counts.get(&id) {
            return Ok(count);
        }
        if !self.used.insert(id) {
            // Already on the current path: a self-referencing definition.
            log::warn!("Definition {} contains itself; not descending again", id);
            return Ok(0);
        }
        let definition = self.doc.definition(id)?;
        let count = self.visit(&definition.entities)?;
        self.subtree_counts.insert(id, count);
        Ok(count)
    }
}
