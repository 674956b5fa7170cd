//! The agent state machine's data model.
//!
//! Every state an agent can be in, with the data that state needs.  The
//! handlers that advance these states live in `fief-sim`; this module only
//! defines the shapes and the family predicates the scheduler and the
//! commands consult.
//!
//! Several conventions are inherited by all handlers:
//!
//! * `dir` fields in the road-walking states hold the direction the agent
//!   came FROM (the reverse of its heading) while moving, or `heading - 6`
//!   (a negative value) while blocked waiting for the cell ahead.
//! * Free-walking distances are signed column/row offsets to the target;
//!   `neg_dist1`/`neg_dist2` remember the way back.

use fief_core::{AgentId, Direction, NodeId, Resource, StructureId};
use fief_grid::Mineral;

/// Payload of the free-walking family: signed distance still to cover,
/// the memorized way back, and the flags register (bit 0 = end on a road
/// cell is acceptable, bit 3 = arrived, bits 1-2 = preferred axis).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreeWalk {
    pub dist_col:  i32,
    pub dist_row:  i32,
    pub neg_dist1: i32,
    pub neg_dist2: i32,
    pub flags:     i32,
}

/// Payload of the duel states: the scripted move sequence position, who
/// won, a scratch counter and the opponent.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fight {
    pub move_num:     i32,
    pub attacker_won: bool,
    pub misc:         i32,
    pub opponent:     AgentId,
}

/// Payload of the free-fight defender states: where the fight spot is
/// relative to the defender, and where the attacker stands relative to it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefendFree {
    pub dist_col:       i32,
    pub dist_row:       i32,
    pub misc:           i32,
    pub other_dist_col: i32,
    pub other_dist_row: i32,
}

/// Payload of the idle-on-road family: which road the transporter serves,
/// seen as the node reached by walking `rev_dir` from the agent.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnPath {
    pub rev_dir: Direction,
    pub node:    NodeId,
    pub misc:    i32,
}

/// Every state of the agent state machine.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AgentState {
    // ── Storage ───────────────────────────────────────────────────────────
    /// Parked inside an inventory.
    IdleInStock { inventory: StructureId },
    /// Called out; waiting at the inventory door for its exit slot.
    /// `mode` 0..=5 sends the agent onto the road leaving `dest` in that
    /// direction, 6 is a geologist surveying around `dest`, -1 walks into
    /// the structure behind `dest`, -2 reports to the inventory behind it.
    ReadyToLeaveInventory { mode: i32, dest: NodeId, inventory: StructureId },
    /// Carrying a stored resource from the inventory to its own door node.
    MoveResourceOut { resource: Resource, dest: NodeId },
    /// Inventory carrier with nothing queued.
    WaitForResourceOut,
    /// Dropping the carried resource on the door node.
    DropResourceOut { resource: Resource, dest: NodeId },

    // ── Road network ──────────────────────────────────────────────────────
    /// En route over the road network towards `dest`.  `dir1` carries the
    /// dispatch mode: 0..=5 take over the road leaving `dest` in that
    /// direction, 6 survey around `dest`, negative walk into the
    /// structure behind it.
    Walking { dir1: i32, dest: NodeId, dir: i32, wait_counter: i32 },
    /// Serving a road, possibly carrying `resource` addressed to `dest`.
    Transporting { resource: Option<Resource>, dest: NodeId, dir: i32, wait_counter: i32 },
    /// Carrying a resource into the structure behind a node.
    Delivering { resource: Option<Resource>, dest: NodeId, dir: i32, wait_counter: i32 },
    /// Parked on the middle of a served road, off the grid's occupancy.
    IdleOnPath(OnPath),
    /// Asked to leave the road; waiting for its cell to clear.
    WaitIdleOnPath(OnPath),
    /// Woken up while standing on a node cell.
    WakeAtFlag(OnPath),
    /// Woken up mid-road; walks to the nearer end first.
    WakeOnPath(OnPath),

    // ── Entering and leaving structures ───────────────────────────────────
    /// On the half-cell climb from a node to the structure door.  `mode`
    /// tells the arrival handler what the agent came to do (-2 garrison
    /// reinforcement, -1 worker/holder, 0 and up resource delivery).
    EnteringBuilding { mode: i32, slope_len: i32 },
    /// On the way down; `next` is installed when the node is reached.
    LeavingBuilding { next: Box<AgentState> },
    /// At the node, waiting for the door cell to clear.
    ReadyToEnter { mode: i32 },
    /// At the door, waiting for the node cell to clear before walking out.
    ReadyToLeave { next: Box<AgentState> },

    // ── Construction ──────────────────────────────────────────────────────
    /// Leveling the ground around a large site.  `substate` below zero is
    /// the wait-then-dig cadence, `dig_pos` which of the seven cells is
    /// being worked (0 = center).
    Digging { h_index: i32, target_height: u8, dig_pos: i32, substate: i32 },
    /// Raising a structure.  `mode` negative while fetching material,
    /// `material_step` indexes the plank/stone schedule.
    Building { mode: i32, structure: StructureId, material_step: u16, counter: u16 },
    /// The first holder raising the castle from inside.
    BuildingCastle { inventory: StructureId },
    /// Builder done, walking home.
    FinishedBuilding,

    // ── Free walking and outdoor work ─────────────────────────────────────
    FreeWalking(FreeWalk),
    Logging(FreeWalk),
    PlanningLogging,
    PlanningPlanting,
    Planting(FreeWalk),
    PlanningStoneCutting,
    StoneCutterFreeWalking(FreeWalk),
    StoneCutting(FreeWalk),
    PlanningFishing,
    Fishing(FreeWalk),
    PlanningFarming,
    Farming(FreeWalk),
    FreeSailing(FreeWalk),

    // ── Indoor production ─────────────────────────────────────────────────
    /// `mode` 0 entering, negative working, positive walking out with the
    /// product; the per-craft handlers give the exact meaning.
    Sawing { mode: i32 },
    /// `substate` walks the dig-descend-extract-ascend cycle 0..=10.
    Mining { substate: u32, res: Option<Resource>, deposit: Mineral },
    Smelting { mode: i32, counter: i32, gold: bool },
    Milling { mode: i32 },
    Baking { mode: i32 },
    PigFarming { mode: i32 },
    Butchering { mode: i32 },
    MakingWeapon { mode: i32 },
    MakingTool { mode: i32 },
    BuildingBoat { mode: i32 },

    // ── Geology ───────────────────────────────────────────────────────────
    LookingForGeoSpot,
    SamplingGeoSpot(FreeWalk),

    // ── Lost and eviction ─────────────────────────────────────────────────
    /// No valid route home.  `mode` 1 on the first attempt makes the agent
    /// pick a far random destination instead of the near spiral.
    Lost { mode: i32 },
    LostSailor,
    /// Thrown out of a demolished structure.
    EscapeBuilding,
    /// Fleeing a captured castle in a random direction.
    Scatter,

    // ── Combat ────────────────────────────────────────────────────────────
    KnightEngagingBuilding(Fight),
    KnightPrepareAttacking(Fight),
    KnightLeaveForFight { next: Box<AgentState> },
    KnightPrepareDefending,
    KnightAttacking(Fight),
    KnightDefending,
    KnightAttackingVictory(Fight),
    KnightAttackingDefeat(Fight),
    KnightOccupyEnemyBuilding,
    KnightFreeWalking(FreeWalk),
    KnightEngageDefendingFree(DefendFree),
    KnightEngageAttackingFree(Fight),
    KnightEngageAttackingFreeJoin(Fight),
    KnightPrepareAttackingFree(Fight),
    KnightPrepareDefendingFree(DefendFree),
    KnightPrepareDefendingFreeWait(DefendFree),
    KnightAttackingFree(Fight),
    KnightDefendingFree(DefendFree),
    KnightAttackingVictoryFree { move_num: i32, dist_col: i32, dist_row: i32, opponent: AgentId },
    KnightDefendingVictoryFree(DefendFree),
    KnightAttackingFreeWait(FreeWalk),
    KnightAttackingDefeatFree(Fight),
    KnightLeaveForWalkToFight { next: Box<AgentState> },

    // ── Garrison duty ─────────────────────────────────────────────────────
    /// Standing guard; the garrison is a linked list threaded through
    /// `next_knight`.
    DefendingHut { next_knight: AgentId },
    DefendingTower { next_knight: AgentId },
    DefendingFortress { next_knight: AgentId },
    DefendingCastle { next_knight: AgentId },
}

impl AgentState {
    /// States that keep the agent parked on a road without blocking the
    /// cell for other walkers.
    pub fn is_idle_on_path(&self) -> bool {
        matches!(self, AgentState::IdleOnPath(_) | AgentState::WaitIdleOnPath(_))
    }

    /// States in which the agent is walking the road network and subject
    /// to the head-on swap protocol.
    pub fn is_road_walking(&self) -> bool {
        matches!(
            self,
            AgentState::Walking { .. }
                | AgentState::Transporting { .. }
                | AgentState::Delivering { .. }
        )
    }

    /// Garrison duty, castle included.
    pub fn is_defending(&self) -> bool {
        matches!(
            self,
            AgentState::DefendingHut { .. }
                | AgentState::DefendingTower { .. }
                | AgentState::DefendingFortress { .. }
                | AgentState::DefendingCastle { .. }
        )
    }

    /// The next guard in the garrison list, for defending states.
    pub fn next_knight(&self) -> Option<AgentId> {
        match *self {
            AgentState::DefendingHut { next_knight }
            | AgentState::DefendingTower { next_knight }
            | AgentState::DefendingFortress { next_knight }
            | AgentState::DefendingCastle { next_knight } => Some(next_knight),
            _ => None,
        }
    }
}
