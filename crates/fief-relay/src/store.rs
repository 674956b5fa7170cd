//! Relay-node arena and the generation-stamped path search.

use std::collections::VecDeque;

use fief_core::{Direction, NodeId, SimError, SimResult};
use fief_grid::MapPos;

use crate::node::RelayNode;

/// Upper bound on nodes visited by one search.
pub const SEARCH_MAX_DEPTH: usize = 0x10000;

/// Filters applied while expanding a search.
#[derive(Copy, Clone, Debug, Default)]
pub struct SearchOpts {
    /// Skip water roads (searches on behalf of walking agents).
    pub land_only: bool,
    /// Only follow roads currently served by a transporter (searches on
    /// behalf of resources).
    pub with_transporter: bool,
}

/// Index-stable arena of relay nodes.
///
/// Slots of removed nodes are reused by later insertions, so a `NodeId`
/// is only meaningful while its node is alive; the engine never holds on
/// to IDs of removed nodes past the command that removed them.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayStore {
    nodes: Vec<Option<RelayNode>>,
    /// Next search generation stamp.
    search_counter: u32,
}

impl RelayStore {
    pub fn new() -> RelayStore {
        RelayStore::default()
    }

    pub fn add(&mut self, node: RelayNode) -> NodeId {
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return NodeId(i as u32);
            }
        }
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<RelayNode> {
        self.nodes.get_mut(id.index())?.take()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&RelayNode> {
        self.nodes.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RelayNode> {
        self.nodes.get_mut(id.index())?.as_mut()
    }

    /// Lookup that treats a dangling ID as state corruption.
    pub fn try_get(&self, id: NodeId) -> SimResult<&RelayNode> {
        self.get(id).ok_or(SimError::NodeNotFound(id))
    }

    pub fn try_get_mut(&mut self, id: NodeId) -> SimResult<&mut RelayNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(|n| n.as_mut())
            .ok_or(SimError::NodeNotFound(id))
    }

    /// Mutable access to two distinct nodes at once (linking road ends).
    pub fn get_pair_mut(
        &mut self,
        a: NodeId,
        b: NodeId,
    ) -> Option<(&mut RelayNode, &mut RelayNode)> {
        if a == b || a.index() >= self.nodes.len() || b.index() >= self.nodes.len() {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(hi.index());
        let lo_node = head[lo.index()].as_mut()?;
        let hi_node = tail[0].as_mut()?;
        if a < b {
            Some((lo_node, hi_node))
        } else {
            Some((hi_node, lo_node))
        }
    }

    /// Live node IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeId(i as u32)))
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node standing at `pos`, if any.
    pub fn at_pos(&self, pos: MapPos) -> Option<NodeId> {
        self.ids().find(|id| self.get(*id).is_some_and(|n| n.pos == pos))
    }

    // ── Path search ───────────────────────────────────────────────────────

    fn next_search_id(&mut self) -> u32 {
        self.search_counter = self.search_counter.wrapping_add(1).max(1);
        self.search_counter
    }

    /// Breadth-first expansion over the relay graph.
    ///
    /// Each source is stamped with an optional `search_dir` tag; expansion
    /// propagates the tag of the node it came from, so when the callback
    /// accepts a node, that node's `search_dir` names the source it was
    /// reached from.  Neighbor order is descending (Up → Right), which is
    /// the tie-break order every consumer relies on.
    ///
    /// The callback may mutate the store (e.g. write back a schedule); it
    /// returns `true` to stop the search.  Returns whether it ever did.
    pub fn search<F>(
        &mut self,
        sources: &[(NodeId, Option<Direction>)],
        opts: SearchOpts,
        mut callback: F,
    ) -> bool
    where
        F: FnMut(&mut RelayStore, NodeId) -> bool,
    {
        let id = self.next_search_id();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for &(source, dir) in sources {
            if let Some(node) = self.get_mut(source) {
                if node.search_num != id {
                    node.search_num = id;
                    node.search_dir = dir;
                    queue.push_back(source);
                }
            }
        }

        for _ in 0..SEARCH_MAX_DEPTH {
            let Some(current) = queue.pop_front() else {
                return false;
            };

            if callback(self, current) {
                return true;
            }

            let Some(node) = self.get(current) else {
                continue;
            };
            let inherited = node.search_dir;
            let mut next: Vec<NodeId> = Vec::new();
            for dir in Direction::iter_rev() {
                if let Some(link) = node.link(dir) {
                    if (opts.land_only && link.water)
                        || (opts.with_transporter && !link.has_transporter)
                    {
                        continue;
                    }
                    next.push(link.other_node);
                }
            }
            for other in next {
                if let Some(other_node) = self.get_mut(other) {
                    if other_node.search_num != id {
                        other_node.search_num = id;
                        other_node.search_dir = inherited;
                        queue.push_back(other);
                    }
                }
            }
        }

        false
    }

    /// Search from a single source with no direction tag.
    pub fn search_single<F>(&mut self, source: NodeId, opts: SearchOpts, callback: F) -> bool
    where
        F: FnMut(&mut RelayStore, NodeId) -> bool,
    {
        self.search(&[(source, None)], opts, callback)
    }

    /// Like [`search`](Self::search), but with an arbitrary index per
    /// source instead of a direction tag.  The tag is carried through the
    /// queue rather than stamped on the nodes, and handed to the callback
    /// alongside the visited node.
    pub fn search_tagged<F>(&mut self, sources: &[NodeId], opts: SearchOpts, mut callback: F) -> bool
    where
        F: FnMut(&mut RelayStore, NodeId, usize) -> bool,
    {
        let id = self.next_search_id();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();

        for (tag, &source) in sources.iter().enumerate() {
            if let Some(node) = self.get_mut(source) {
                if node.search_num != id {
                    node.search_num = id;
                    queue.push_back((source, tag));
                }
            }
        }

        for _ in 0..SEARCH_MAX_DEPTH {
            let Some((current, tag)) = queue.pop_front() else {
                return false;
            };

            if callback(self, current, tag) {
                return true;
            }

            let Some(node) = self.get(current) else {
                continue;
            };
            let mut next: Vec<NodeId> = Vec::new();
            for dir in Direction::iter_rev() {
                if let Some(link) = node.link(dir) {
                    if (opts.land_only && link.water)
                        || (opts.with_transporter && !link.has_transporter)
                    {
                        continue;
                    }
                    next.push(link.other_node);
                }
            }
            for other in next {
                if let Some(other_node) = self.get_mut(other) {
                    if other_node.search_num != id {
                        other_node.search_num = id;
                        queue.push_back((other, tag));
                    }
                }
            }
        }

        false
    }
}
