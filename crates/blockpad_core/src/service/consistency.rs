//! Page tree consistency checks and repair.
//!
//! # Responsibility
//! - Detect violations of the block tree invariants on one page.
//! - Rewrite `parent_id`, `child_ids` and `position` so a damaged page is
//!   consistent again.
//!
//! # Invariants
//! - Repair treats `parent_id` as authoritative and rebuilds `child_ids`
//!   from it, keeping listed order where it is still valid.
//! - Repair never deletes blocks; unreachable blocks become roots.
//! - Repair runs in one unit of work.

use crate::model::block::{Block, BlockId, BlockPatch};
use crate::model::page::PageId;
use crate::repo::block_store::BlockStore;
use crate::repo::error::StoreResult;
use crate::service::tree_engine::normalize_group_in;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// One broken tree invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `parent_id` lists a child that is missing or names another parent.
    DanglingChildRef { parent_id: BlockId, child_id: BlockId },
    /// A block's parent does not list it in `child_ids`.
    MissingChildRef { parent_id: BlockId, child_id: BlockId },
    /// A child id is listed more than once across all `child_ids`.
    DuplicateChildRef { child_id: BlockId, occurrences: usize },
    /// `parent_id` names no block on the same page.
    MissingParent { block_id: BlockId, parent_id: BlockId },
    /// Following `parent_id` from these blocks loops back.
    Cycle { block_ids: Vec<BlockId> },
    /// Sibling positions are not a permutation of `0..n-1`.
    PositionGap {
        parent_id: Option<BlockId>,
        positions: Vec<i64>,
    },
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingChildRef {
                parent_id,
                child_id,
            } => write!(f, "{parent_id} lists {child_id}, which is not its child"),
            Self::MissingChildRef {
                parent_id,
                child_id,
            } => write!(f, "{child_id} names parent {parent_id}, which does not list it"),
            Self::DuplicateChildRef {
                child_id,
                occurrences,
            } => write!(f, "{child_id} is listed {occurrences} times"),
            Self::MissingParent {
                block_id,
                parent_id,
            } => write!(f, "{block_id} names missing parent {parent_id}"),
            Self::Cycle { block_ids } => write!(f, "parent cycle through {} blocks", block_ids.len()),
            Self::PositionGap {
                parent_id,
                positions,
            } => match parent_id {
                Some(parent_id) => write!(f, "children of {parent_id} have positions {positions:?}"),
                None => write!(f, "root blocks have positions {positions:?}"),
            },
        }
    }
}

/// Violations found on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub page_id: PageId,
    pub block_count: usize,
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks every tree invariant of one page without writing.
pub fn verify_page<S: BlockStore>(store: &S, page_id: PageId) -> StoreResult<ConsistencyReport> {
    store.require_page(page_id)?;
    let blocks = store.get_all_page_blocks(page_id)?;
    let report = ConsistencyReport {
        page_id,
        block_count: blocks.len(),
        violations: find_violations(&blocks),
    };
    info!(
        "event=page_verify module=consistency status=ok page_id={} blocks={} violations={}",
        page_id,
        report.block_count,
        report.violations.len()
    );
    Ok(report)
}

/// Repairs a page and returns the violations found before repair.
pub fn repair_page<S: BlockStore>(store: &S, page_id: PageId) -> StoreResult<ConsistencyReport> {
    let report = store.atomically(|store| {
        let report = verify_page(store, page_id)?;
        if report.is_consistent() {
            return Ok(report);
        }

        let blocks = store.get_all_page_blocks(page_id)?;
        let parents = effective_parents(&blocks);

        for block in &blocks {
            let parent_id = parents.get(&block.id).copied().flatten();
            let child_ids = rebuilt_child_ids(block, &blocks, &parents);
            let patch = BlockPatch {
                parent_id: (parent_id != block.parent_id).then_some(parent_id),
                child_ids: (child_ids != block.child_ids).then_some(child_ids),
                ..BlockPatch::default()
            };
            if !patch.is_empty() {
                store.update_block(block.id, &patch)?;
            }
        }

        normalize_group_in(store, page_id, None)?;
        let parent_groups: HashSet<BlockId> = parents.values().flatten().copied().collect();
        for parent_id in parent_groups {
            normalize_group_in(store, page_id, Some(parent_id))?;
        }
        Ok(report)
    })?;

    if !report.is_consistent() {
        warn!(
            "event=page_repair module=consistency status=ok page_id={} repaired={}",
            page_id,
            report.violations.len()
        );
    }
    Ok(report)
}

fn find_violations(blocks: &[Block]) -> Vec<Violation> {
    let by_id: HashMap<BlockId, &Block> = blocks.iter().map(|block| (block.id, block)).collect();
    let mut violations = Vec::new();

    let mut occurrences: HashMap<BlockId, usize> = HashMap::new();
    for parent in blocks {
        for child_id in &parent.child_ids {
            *occurrences.entry(*child_id).or_default() += 1;
            let is_child = by_id
                .get(child_id)
                .is_some_and(|child| child.parent_id == Some(parent.id));
            if !is_child {
                violations.push(Violation::DanglingChildRef {
                    parent_id: parent.id,
                    child_id: *child_id,
                });
            }
        }
    }
    for block in blocks {
        if let Some(count) = occurrences.get(&block.id).filter(|count| **count > 1) {
            violations.push(Violation::DuplicateChildRef {
                child_id: block.id,
                occurrences: *count,
            });
        }
    }

    for block in blocks {
        let Some(parent_id) = block.parent_id else {
            continue;
        };
        match by_id.get(&parent_id) {
            None => violations.push(Violation::MissingParent {
                block_id: block.id,
                parent_id,
            }),
            Some(parent) if !parent.child_ids.contains(&block.id) => {
                violations.push(Violation::MissingChildRef {
                    parent_id,
                    child_id: block.id,
                })
            }
            Some(_) => {}
        }
    }

    for cycle in find_cycles(blocks) {
        violations.push(Violation::Cycle { block_ids: cycle });
    }

    let mut groups: HashMap<Option<BlockId>, Vec<i64>> = HashMap::new();
    for block in blocks {
        groups.entry(block.parent_id).or_default().push(block.position);
    }
    let mut gaps: Vec<Violation> = groups
        .into_iter()
        .filter_map(|(parent_id, mut positions)| {
            positions.sort_unstable();
            let dense = positions
                .iter()
                .enumerate()
                .all(|(index, position)| *position == index as i64);
            (!dense).then_some(Violation::PositionGap {
                parent_id,
                positions,
            })
        })
        .collect();
    gaps.sort_by_key(|gap| match gap {
        Violation::PositionGap { parent_id, .. } => *parent_id,
        _ => None,
    });
    violations.extend(gaps);

    violations
}

/// Parent chains that loop, one entry per distinct cycle.
fn find_cycles(blocks: &[Block]) -> Vec<Vec<BlockId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        OnPath,
        Done,
    }

    let parent_of: HashMap<BlockId, Option<BlockId>> = blocks
        .iter()
        .map(|block| (block.id, block.parent_id))
        .collect();
    let mut marks: HashMap<BlockId, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for block in blocks {
        let mut path = Vec::new();
        let mut current = Some(block.id);
        while let Some(id) = current {
            match marks.get(&id) {
                Some(Mark::Done) => break,
                Some(Mark::OnPath) => {
                    if let Some(start) = path.iter().position(|seen| *seen == id) {
                        cycles.push(path[start..].to_vec());
                    }
                    break;
                }
                None => {
                    marks.insert(id, Mark::OnPath);
                    path.push(id);
                    current = parent_of.get(&id).copied().flatten();
                    if current.is_some_and(|parent| !parent_of.contains_key(&parent)) {
                        current = None;
                    }
                }
            }
        }
        for id in path {
            marks.insert(id, Mark::Done);
        }
    }
    cycles
}

/// Parent of every block after dropping missing parents and breaking cycles.
fn effective_parents(blocks: &[Block]) -> HashMap<BlockId, Option<BlockId>> {
    let ids: HashSet<BlockId> = blocks.iter().map(|block| block.id).collect();
    let mut parents: HashMap<BlockId, Option<BlockId>> = blocks
        .iter()
        .map(|block| {
            let parent_id = block.parent_id.filter(|parent_id| ids.contains(parent_id));
            (block.id, parent_id)
        })
        .collect();
    for cycle in find_cycles(blocks) {
        if let Some(first) = cycle.first() {
            parents.insert(*first, None);
        }
    }
    parents
}

/// `child_ids` for `parent`: still-valid listed children first, then the
/// unlisted ones in store order.
fn rebuilt_child_ids(
    parent: &Block,
    blocks: &[Block],
    parents: &HashMap<BlockId, Option<BlockId>>,
) -> Vec<BlockId> {
    let is_child = |id: &BlockId| parents.get(id).copied().flatten() == Some(parent.id);
    let mut seen = HashSet::new();
    let mut child_ids: Vec<BlockId> = parent
        .child_ids
        .iter()
        .copied()
        .filter(|id| is_child(id) && seen.insert(*id))
        .collect();
    for block in blocks {
        if is_child(&block.id) && seen.insert(block.id) {
            child_ids.push(block.id);
        }
    }
    child_ids
}
