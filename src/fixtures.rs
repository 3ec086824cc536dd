//! Benchmark Fixtures
//!
//! A fixed catalog of football players and generators for valid teams and
//! like-for-like transfers. Shared by the benchmark binary and the tests.

use crate::roster::catalog::PriceCatalog;
use crate::roster::types::{EntityId, EpochRef, Role, Roster, RosterSlot, TenantKey};
use crate::transfer::types::{RosterDraft, TransferRequest};

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Player {
    pub id: EntityId,
    pub name: &'static str,
    pub role: Role,
    pub price: f64,
}

const fn player(id: EntityId, name: &'static str, role: Role, price: f64) -> Player {
    Player {
        id,
        name,
        role,
        price,
    }
}

pub const PLAYERS: [Player; 36] = [
    player(1011, "Alisson Becker", Role::Goalkeeper, 5.5),
    player(1016, "Thibaut Courtois", Role::Goalkeeper, 5.0),
    player(1021, "Gianluigi Donnarumma", Role::Goalkeeper, 4.5),
    player(1022, "Ederson", Role::Goalkeeper, 5.0),
    player(1031, "Marc-Andre ter Stegen", Role::Goalkeeper, 4.8),
    player(1004, "Virgil van Dijk", Role::Defender, 6.5),
    player(1007, "Sergio Ramos", Role::Defender, 5.0),
    player(1020, "Joao Cancelo", Role::Defender, 7.0),
    player(1023, "Marquinhos", Role::Defender, 5.5),
    player(1024, "Ruben Dias", Role::Defender, 6.0),
    player(1025, "Andrew Robertson", Role::Defender, 6.5),
    player(1026, "Trent Alexander-Arnold", Role::Defender, 7.5),
    player(1032, "Achraf Hakimi", Role::Defender, 6.8),
    player(1033, "Kyle Walker", Role::Defender, 6.2),
    player(1001, "Kevin De Bruyne", Role::Midfielder, 12.5),
    player(1006, "N'Golo Kante", Role::Midfielder, 5.5),
    player(1008, "Luka Modric", Role::Midfielder, 8.5),
    player(1012, "Mason Mount", Role::Midfielder, 6.5),
    player(1014, "Bruno Fernandes", Role::Midfielder, 8.5),
    player(1018, "Pedri", Role::Midfielder, 6.0),
    player(1027, "Casemiro", Role::Midfielder, 7.0),
    player(1034, "Jude Bellingham", Role::Midfielder, 9.0),
    player(1002, "Mohamed Salah", Role::Forward, 13.0),
    player(1005, "Sadio Mane", Role::Forward, 10.0),
    player(1010, "Kylian Mbappe", Role::Forward, 12.0),
    player(1013, "Phil Foden", Role::Forward, 8.0),
    player(1019, "Vinicius Jr.", Role::Forward, 9.5),
    player(1028, "Raheem Sterling", Role::Forward, 9.0),
    player(1035, "Bukayo Saka", Role::Forward, 8.5),
    player(1003, "Harry Kane", Role::Striker, 11.5),
    player(1009, "Robert Lewandowski", Role::Striker, 9.0),
    player(1015, "Erling Haaland", Role::Striker, 15.0),
    player(1017, "Karim Benzema", Role::Striker, 10.0),
    player(1029, "Darwin Nunez", Role::Striker, 8.5),
    player(1030, "Victor Osimhen", Role::Striker, 9.5),
    player(1036, "Olivier Giroud", Role::Striker, 7.5),
];

/// Starting eleven: 1 GK, 4 DEF, 4 MID, 1 FWD, 1 STR. Costs 68.0.
const STARTING_MAIN: [EntityId; 11] = [
    1021, 1007, 1023, 1024, 1004, 1006, 1018, 1012, 1027, 1013, 1036,
];
const STARTING_RESERVE: [EntityId; 4] = [1016, 1033, 1034, 1029];

const PLATFORM_PREFIXES: [&str; 4] = ["fb", "gg", "ap", "tw"];

pub fn find(entity_id: EntityId) -> Option<&'static Player> {
    PLAYERS.iter().find(|player| player.id == entity_id)
}

pub fn catalog(default_price: f64) -> PriceCatalog {
    PriceCatalog::from_prices(PLAYERS.iter().map(|player| (player.id, player.price)), default_price)
}

/// Slot for a catalog player. Unknown ids become midfielders.
pub fn slot(entity_id: EntityId, order: u32) -> RosterSlot {
    let role = find(entity_id).map(|player| player.role).unwrap_or(Role::Midfielder);
    RosterSlot::new(entity_id, role.id(), order)
}

fn slots(ids: &[EntityId]) -> Vec<RosterSlot> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| slot(*id, index as u32 + 1))
        .collect()
}

pub fn valid_draft() -> RosterDraft {
    RosterDraft {
        main_slots: slots(&STARTING_MAIN),
        reserve_slots: slots(&STARTING_RESERVE),
        captain_id: 1013,
        vice_captain_id: 1036,
        booster: None,
    }
}

/// Tenant keys spread over four source platforms, e.g. `gg_000000042`.
pub fn tenant_key(user_id: u64) -> TenantKey {
    let prefix = PLATFORM_PREFIXES[(user_id % PLATFORM_PREFIXES.len() as u64) as usize];
    TenantKey::new(format!("{}_{:09}", prefix, user_id))
}

/// One like-for-like swap of a random outfield main-slot player.
pub fn random_transfer<R: Rng + ?Sized>(
    roster: &Roster,
    target_epoch: EpochRef,
    rng: &mut R,
) -> Option<TransferRequest> {
    let outfield: Vec<&RosterSlot> = roster
        .main_slots
        .iter()
        .filter(|slot| slot.role() != Some(Role::Goalkeeper))
        .collect();
    let out = **outfield.choose(rng)?;

    let candidates: Vec<&Player> = PLAYERS
        .iter()
        .filter(|player| player.role.id() == out.role_id && !roster.owns(player.id))
        .collect();
    let incoming = *candidates.choose(rng)?;

    let captain_id = if rng.gen_range(0..4) == 0 {
        roster
            .main_slots
            .iter()
            .map(|slot| slot.entity_id)
            .find(|id| *id != out.entity_id && *id != roster.vice_captain_id)
    } else {
        None
    };

    Some(TransferRequest {
        tenant: roster.key.tenant.clone(),
        team_no: roster.key.team_no,
        entities_in: vec![RosterSlot::new(incoming.id, out.role_id, out.order)],
        entities_out: vec![out.entity_id],
        target_epoch,
        captain_id,
        vice_captain_id: None,
        booster: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterRules;
    use crate::roster::validator::{validate_budget, validate_formation};

    #[test]
    fn test_valid_draft_passes_both_checks() {
        let rules = RosterRules::default();
        let draft = valid_draft();

        assert!(validate_formation(&draft.main_slots, &rules).valid);
        let budget = validate_budget(&draft.main_slots, &catalog(rules.default_price), &rules);
        assert!(budget.valid);
        assert_eq!(budget.total_cost, 68.0);
    }

    #[test]
    fn test_tenant_keys_cycle_platforms() {
        assert_eq!(tenant_key(1).as_str(), "gg_000000001");
        assert_eq!(tenant_key(4).as_str(), "fb_000000004");
        assert_eq!(tenant_key(123_456_789).as_str(), "gg_123456789");
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let mut ids: Vec<EntityId> = PLAYERS.iter().map(|player| player.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PLAYERS.len());
    }
}
