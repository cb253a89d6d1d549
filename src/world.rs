//! Joint world state (spec.md C6).

use std::rc::Rc;

use crate::config::CostVariant;
use crate::movement::Direction;

/// Mutable per-agent state during search. `prev` threads a singly-linked
/// chain of an agent's own positions so a single-agent path can be replayed
/// without consulting the joint-state arena (mirrors the teacher's
/// `Rc<RefCell<LowLevelNode>>` chains in `common/lowlevel.rs`, but
/// immutable since each step allocates a fresh node instead of mutating one
/// in place).
#[derive(Debug, Clone)]
pub struct AgentState {
    pub agent_num: usize,
    pub x: usize,
    pub y: usize,
    pub direction: Direction,
    /// g for this agent alone.
    pub current_step: usize,
    /// Step at which the agent most recently arrived at its goal; 0 while
    /// it has never left (spec.md §3).
    pub arrival_time: usize,
    /// Once true, this agent has stepped away from its goal at least once;
    /// distinguishes "resting at the start, which happens to be the goal"
    /// from "returned after a detour", since both can show `arrival_time`
    /// values that look alike at a glance.
    pub ever_left_goal: bool,
    /// This agent's own contribution to the joint `g`, accumulated under
    /// the active `CostVariant`'s free-wait rule; distinct from
    /// `current_step`, which counts every timestep including free waits.
    pub cost: usize,
    pub h: usize,
    pub prev: Option<Rc<AgentState>>,
}

impl AgentState {
    pub fn start(agent_num: usize, x: usize, y: usize, h: usize) -> Self {
        AgentState {
            agent_num,
            x,
            y,
            direction: Direction::Wait,
            current_step: 0,
            arrival_time: 0,
            ever_left_goal: false,
            cost: 0,
            h,
            prev: None,
        }
    }

    pub fn pos(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    /// Replay this agent's positions from start to here, oldest first.
    pub fn reconstruct_path(&self) -> Vec<(usize, usize)> {
        let mut path = vec![self.pos()];
        let mut cur = self.prev.clone();
        while let Some(node) = cur {
            path.push(node.pos());
            cur = node.prev.clone();
        }
        path.reverse();
        path
    }
}

/// The joint state: an ordered tuple of per-agent states plus search
/// bookkeeping (spec.md §3). `agent_turn` is the Operator Decomposition
/// cursor: 0 means fully committed (a plain joint state), 1..N mid-pass.
/// Reconstruction walks each agent's own `AgentState::prev` chain, so the
/// joint state itself carries no separate back-pointer.
#[derive(Debug, Clone)]
pub struct WorldState {
    pub agents: Vec<Rc<AgentState>>,
    pub g: usize,
    pub h: usize,
    pub makespan: usize,
    pub agent_turn: usize,
}

impl WorldState {
    pub fn f(&self) -> usize {
        self.g + self.h
    }

    pub fn is_od_intermediate(&self) -> bool {
        self.agent_turn != 0
    }

    /// Canonical identity for closed-set lookups (spec.md §3): per-agent
    /// `(x, y)` plus `agent_turn`, with makespan folded in only under the
    /// `Orig` cost variant (where stationary waits at the goal are counted,
    /// so two states that differ only in how long an agent dawdled at its
    /// goal are genuinely distinct).
    pub fn canonical_key(&self, variant: CostVariant) -> WorldKey {
        WorldKey {
            positions: self.agents.iter().map(|a| a.pos()).collect(),
            agent_turn: self.agent_turn,
            makespan: match variant {
                CostVariant::Orig => Some(self.makespan),
                CostVariant::WaitingAtGoalAlwaysFree => None,
            },
        }
    }

    pub fn all_at_goal(&self, goals: &[(usize, usize)]) -> bool {
        self.agents
            .iter()
            .zip(goals.iter())
            .all(|(a, g)| a.pos() == *g)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorldKey {
    positions: Vec<(usize, usize)>,
    agent_turn: usize,
    makespan: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_drops_makespan_when_waits_are_free() {
        let a = Rc::new(AgentState::start(0, 1, 1, 3));
        let ws = WorldState {
            agents: vec![a],
            g: 0,
            h: 3,
            makespan: 5,
            agent_turn: 0,
        };
        let orig = ws.canonical_key(CostVariant::Orig);
        let free = ws.canonical_key(CostVariant::WaitingAtGoalAlwaysFree);
        assert!(orig.makespan.is_some());
        assert!(free.makespan.is_none());
    }

    #[test]
    fn reconstruct_path_walks_prev_chain() {
        let a0 = Rc::new(AgentState::start(0, 0, 0, 4));
        let mut a1 = AgentState::start(0, 1, 0, 3);
        a1.prev = Some(a0.clone());
        a1.current_step = 1;
        let a1 = Rc::new(a1);
        let mut a2 = AgentState::start(0, 2, 0, 2);
        a2.prev = Some(a1.clone());
        a2.current_step = 2;

        assert_eq!(a2.reconstruct_path(), vec![(0, 0), (1, 0), (2, 0)]);
    }
}
