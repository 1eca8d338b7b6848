//! Built-in vanilla server log patterns.
//!
//! Priority bands by specificity, lower evaluates first:
//! - 10: coordinate-bearing movement
//! - 20: login/spawn and command issuance
//! - 30: join/leave
//! - 40: death with a specific cause
//! - 50: world state
//! - 60: server lifecycle
//! - 90: generic catch-alls (death with unknown cause)
//!
//! The bands guarantee a more specific pattern is always preferred over a
//! broad one that would also match the same text.

use crate::pattern_registry::PatternRegistry;
use regex::Captures;
use serde_json::{Value, json};
use warden_proto::{DeathCause, EventKind};

fn coord(caps: &Captures<'_>, index: usize) -> anyhow::Result<f64> {
    caps[index]
        .parse::<f64>()
        .map_err(|e| anyhow::anyhow!("bad coordinate '{}': {e}", &caps[index]))
}

fn player(caps: &Captures<'_>) -> Value {
    json!({ "player": &caps[1] })
}

/// Installs the vanilla pattern set into a registry.
///
/// All entries are compile-time constants with unique names, so registration
/// cannot fail at runtime.
pub(crate) fn install_vanilla(registry: &mut PatternRegistry) {
    let entries: Vec<(
        &str,
        &str,
        EventKind,
        i64,
        fn(&Captures<'_>) -> anyhow::Result<Value>,
    )> = vec![
        (
            "teleport",
            r"^Teleported (\S+) from ([-\d.]+),\s*([-\d.]+),\s*([-\d.]+) to ([-\d.]+),\s*([-\d.]+),\s*([-\d.]+)$",
            EventKind::Teleport,
            10,
            |caps| {
                Ok(json!({
                    "player": &caps[1],
                    "from": { "x": coord(caps, 2)?, "y": coord(caps, 3)?, "z": coord(caps, 4)? },
                    "to": { "x": coord(caps, 5)?, "y": coord(caps, 6)?, "z": coord(caps, 7)? },
                }))
            },
        ),
        (
            "entity_spawn",
            r"^(\S+)\[[^\]]*\] logged in with entity id (\d+)",
            EventKind::EntitySpawn,
            20,
            |caps| {
                Ok(json!({
                    "player": &caps[1],
                    "entity_id": caps[2].parse::<u64>()?,
                }))
            },
        ),
        (
            "command",
            r"^(\S+) issued server command: (.+)$",
            EventKind::Command,
            20,
            |caps| Ok(json!({ "player": &caps[1], "command": &caps[2] })),
        ),
        (
            "join",
            r"^(\S+) joined the game$",
            EventKind::EntityJoin,
            30,
            |caps| Ok(player(caps)),
        ),
        (
            "leave",
            r"^(\S+) left the game$",
            EventKind::EntityLeave,
            30,
            |caps| Ok(player(caps)),
        ),
        (
            "death_fall",
            r"^(\S+) fell from a high place$",
            EventKind::EntityDeath(DeathCause::Fall),
            40,
            |caps| Ok(player(caps)),
        ),
        (
            "death_drown",
            r"^(\S+) drowned$",
            EventKind::EntityDeath(DeathCause::Drown),
            40,
            |caps| Ok(player(caps)),
        ),
        (
            "death_burn",
            r"^(\S+) burned to death$",
            EventKind::EntityDeath(DeathCause::Burn),
            40,
            |caps| Ok(player(caps)),
        ),
        (
            "death_slain",
            r"^(\S+) was slain by (\S+)$",
            EventKind::EntityDeath(DeathCause::Slain),
            40,
            |caps| Ok(json!({ "player": &caps[1], "killer": &caps[2] })),
        ),
        (
            "world_time",
            r"^Set the time to (\d+)$",
            EventKind::WorldTime,
            50,
            |caps| Ok(json!({ "time": caps[1].parse::<u64>()? })),
        ),
        (
            "world_weather",
            r"^Set the weather to (\w+)",
            EventKind::WorldWeather,
            50,
            |caps| Ok(json!({ "weather": &caps[1] })),
        ),
        (
            "world_difficulty",
            r"^The difficulty has been set to (\w+)$",
            EventKind::WorldDifficulty,
            50,
            |caps| Ok(json!({ "difficulty": &caps[1] })),
        ),
        (
            "world_gamemode",
            r"^Set (?:own game mode|(\S+)'s game mode) to (\w+) Mode$",
            EventKind::WorldGamemode,
            50,
            |caps| {
                Ok(json!({
                    "player": caps.get(1).map(|m| m.as_str()),
                    "gamemode": &caps[2],
                }))
            },
        ),
        (
            "save_start",
            r"^Saving the game",
            EventKind::WorldSaveStart,
            50,
            |_| Ok(json!({})),
        ),
        (
            "save_complete",
            r"^Saved the game$",
            EventKind::WorldSaveComplete,
            50,
            |_| Ok(json!({})),
        ),
        (
            "server_starting",
            r"^Starting minecraft server version (.+)$",
            EventKind::ServerStarting,
            60,
            |caps| Ok(json!({ "version": &caps[1] })),
        ),
        (
            "server_preparing",
            r#"^Preparing level "([^"]+)"$"#,
            EventKind::ServerPreparing,
            60,
            |caps| Ok(json!({ "level": &caps[1] })),
        ),
        (
            "server_done",
            r"^Done \(([\d.]+)s\)!",
            EventKind::ServerDone,
            60,
            |caps| Ok(json!({ "elapsed_secs": caps[1].parse::<f64>()? })),
        ),
        (
            "death_generic",
            r"^(\S+) died$",
            EventKind::EntityDeath(DeathCause::Unknown),
            90,
            |caps| Ok(player(caps)),
        ),
    ];

    for (name, source, kind, priority, extractor) in entries {
        registry
            .register_with_priority(name, source, kind, priority, extractor)
            .expect("vanilla pattern set is statically valid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vanilla() -> PatternRegistry {
        let mut registry = PatternRegistry::new();
        install_vanilla(&mut registry);
        registry
    }

    #[test]
    fn test_teleport_extracts_coordinates() {
        let registry = vanilla();
        let m = registry
            .find_match("Teleported Steve from 1,2,3 to 4.5, 6.0, -7.25")
            .unwrap();
        assert_eq!(m.kind, EventKind::Teleport);
        assert_eq!(m.data["from"]["x"], 1.0);
        assert_eq!(m.data["to"]["z"], -7.25);
    }

    #[test]
    fn test_specific_death_beats_generic() {
        let registry = vanilla();
        let m = registry.find_match("Steve fell from a high place").unwrap();
        assert_eq!(m.kind, EventKind::EntityDeath(DeathCause::Fall));

        let m = registry.find_match("Steve died").unwrap();
        assert_eq!(m.kind, EventKind::EntityDeath(DeathCause::Unknown));
    }

    #[test]
    fn test_world_and_server_lines() {
        let registry = vanilla();
        assert_eq!(
            registry.find_match("Set the time to 4000").unwrap().kind,
            EventKind::WorldTime
        );
        assert_eq!(
            registry.find_match("Saved the game").unwrap().kind,
            EventKind::WorldSaveComplete
        );
        let done = registry.find_match("Done (12.345s)! For help, type \"help\"").unwrap();
        assert_eq!(done.kind, EventKind::ServerDone);
        assert_eq!(done.data["elapsed_secs"], 12.345);
    }

    #[test]
    fn test_login_line_extracts_entity_id() {
        let registry = vanilla();
        let m = registry
            .find_match("Steve[/127.0.0.1:54321] logged in with entity id 352 at (8.5, 65.0, 8.5)")
            .unwrap();
        assert_eq!(m.kind, EventKind::EntitySpawn);
        assert_eq!(m.data["entity_id"], 352);
    }

    #[test]
    fn test_gamemode_with_and_without_player() {
        let registry = vanilla();
        let own = registry
            .find_match("Set own game mode to Creative Mode")
            .unwrap();
        assert_eq!(own.kind, EventKind::WorldGamemode);
        assert!(own.data["player"].is_null());

        let other = registry
            .find_match("Set Steve's game mode to Survival Mode")
            .unwrap();
        assert_eq!(other.data["player"], "Steve");
    }
}
