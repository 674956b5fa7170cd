//! Index-stable arena of agents.

use fief_core::{AgentId, PlayerId, SimError, SimResult};

use crate::agent::Agent;

/// Arena keyed by [`AgentId`].  Removed slots are reused by later
/// insertions; the scheduler walks agents in ascending index order, which
/// is part of the deterministic update order.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentStore {
    agents: Vec<Option<Agent>>,
}

impl AgentStore {
    pub fn new() -> AgentStore {
        AgentStore::default()
    }

    pub fn add(&mut self, agent: Agent) -> AgentId {
        for (i, slot) in self.agents.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(agent);
                return AgentId(i as u32);
            }
        }
        self.agents.push(Some(agent));
        AgentId(self.agents.len() as u32 - 1)
    }

    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        self.agents.get_mut(id.index())?.take()
    }

    #[inline]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id.index())?.as_mut()
    }

    /// Lookup that treats a dangling ID as state corruption.
    pub fn try_get(&self, id: AgentId) -> SimResult<&Agent> {
        self.get(id).ok_or(SimError::AgentNotFound(id))
    }

    pub fn try_get_mut(&mut self, id: AgentId) -> SimResult<&mut Agent> {
        self.agents
            .get_mut(id.index())
            .and_then(|a| a.as_mut())
            .ok_or(SimError::AgentNotFound(id))
    }

    /// Mutable access to two distinct agents at once (fights, swaps).
    pub fn get_pair_mut(&mut self, a: AgentId, b: AgentId) -> Option<(&mut Agent, &mut Agent)> {
        if a == b || a.index() >= self.agents.len() || b.index() >= self.agents.len() {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.agents.split_at_mut(hi.index());
        let lo_agent = head[lo.index()].as_mut()?;
        let hi_agent = tail[0].as_mut()?;
        if a < b {
            Some((lo_agent, hi_agent))
        } else {
            Some((hi_agent, lo_agent))
        }
    }

    /// Live agent IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|_| AgentId(i as u32)))
    }

    pub fn len(&self) -> usize {
        self.agents.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live agents owned by `player`.
    pub fn count_for(&self, player: PlayerId) -> usize {
        self.agents
            .iter()
            .flatten()
            .filter(|a| a.player == player)
            .count()
    }
}
