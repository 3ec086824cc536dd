use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an external account.
///
/// Only ever used as hash input by the partition router; the engine never
/// interprets its contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(pub String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type EntityId = u64;

/// A roster is owned by exactly one (tenant, team number) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RosterKey {
    pub tenant: TenantKey,
    pub team_no: u32,
}

impl RosterKey {
    pub fn new(tenant: TenantKey, team_no: u32) -> Self {
        Self { tenant, team_no }
    }
}

impl fmt::Display for RosterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tenant, self.team_no)
    }
}

/// Role categories a main-slot entity can fill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Defender,
    Midfielder,
    Forward,
    Striker,
    Goalkeeper,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Defender,
        Role::Midfielder,
        Role::Forward,
        Role::Striker,
        Role::Goalkeeper,
    ];

    pub fn from_id(role_id: u8) -> Option<Self> {
        match role_id {
            1 => Some(Role::Defender),
            2 => Some(Role::Midfielder),
            3 => Some(Role::Forward),
            4 => Some(Role::Striker),
            5 => Some(Role::Goalkeeper),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Role::Defender => 1,
            Role::Midfielder => 2,
            Role::Forward => 3,
            Role::Striker => 4,
            Role::Goalkeeper => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Defender => "DEFENDER",
            Role::Midfielder => "MIDFIELDER",
            Role::Forward => "FORWARD",
            Role::Striker => "STRIKER",
            Role::Goalkeeper => "GOALKEEPER",
        }
    }
}

/// One selected entity in a roster.
///
/// `role_id` is kept as the raw storage value so that rows carrying an
/// unknown role can still be loaded and reported by the validator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterSlot {
    pub entity_id: EntityId,
    pub role_id: u8,
    pub order: u32,
}

impl RosterSlot {
    pub fn new(entity_id: EntityId, role_id: u8, order: u32) -> Self {
        Self {
            entity_id,
            role_id,
            order,
        }
    }

    pub fn role(&self) -> Option<Role> {
        Role::from_id(self.role_id)
    }
}

/// Scoring period coordinate. Ordering is lexicographic over
/// (season, gameset, gameday).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochRef {
    pub season_id: u32,
    pub gameset_id: u32,
    pub gameday_id: u32,
}

impl EpochRef {
    pub fn new(season_id: u32, gameset_id: u32, gameday_id: u32) -> Self {
        Self {
            season_id,
            gameset_id,
            gameday_id,
        }
    }

    /// Two epochs share a persistence scope when they sit in the same gameset.
    pub fn same_gameset(&self, other: &EpochRef) -> bool {
        self.gameset_id == other.gameset_id
    }
}

impl fmt::Display for EpochRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.season_id, self.gameset_id, self.gameday_id
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoosterSelection {
    pub booster_id: u32,
    pub entity_id: EntityId,
}

/// Committed state of a single team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Roster {
    pub key: RosterKey,
    pub epoch: EpochRef,
    pub main_slots: Vec<RosterSlot>,
    pub reserve_slots: Vec<RosterSlot>,
    pub valuation: f64,
    pub remaining_budget: f64,
    pub captain_id: EntityId,
    pub vice_captain_id: EntityId,
    pub booster: Option<BoosterSelection>,
    pub transfers_allowed: u32,
    pub transfers_made: u32,
    pub updated_at: u64,
}

impl Roster {
    pub fn owns(&self, entity_id: EntityId) -> bool {
        self.main_slots
            .iter()
            .chain(self.reserve_slots.iter())
            .any(|slot| slot.entity_id == entity_id)
    }

    pub fn transfers_left(&self) -> u32 {
        transfers_left(self.transfers_allowed, self.transfers_made)
    }
}

/// Free transfers still available. Derived on read, never stored.
pub fn transfers_left(transfers_allowed: u32, transfers_made: u32) -> u32 {
    transfers_allowed.saturating_sub(transfers_made)
}

/// Rounds a currency amount to two decimals.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
