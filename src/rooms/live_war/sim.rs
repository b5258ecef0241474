//! Per-tick simulation orchestration (§4.6 tick loop, combat resolution,
//! economy).

use rand::Rng;

use crate::protocol::{Team, UnitType};

use super::ai::{step_to_flank, step_toward, DEFAULT_PROFILE, ENGINEER_PROFILE};
use super::state::{
    unit_stats, Base, BulletEffect, EnergyDrop, HealEffect, MineField, Point, SimState, Unit,
    ATTACK_COOLDOWN_SECS, ENERGY_DROP_LIFETIME_SECS, MAIN_MINER_RESPAWN_DELAY_SECS, MINE_ENERGY_MAX,
    MINE_LIFETIME_SECS, MINE_REGEN_PER_SEC,
};

const MINE_SPAWN_MIN_SPACING: f64 = 3.0;
const MINE_SPAWN_MIN_BASE_DISTANCE: f64 = 5.0;
const ENGINEER_HEAL_RADIUS: f64 = 3.0;
const ENGINEER_HEAL_PER_SEC: f64 = 10.0;
const MINER_CARRY_CAPACITY: f64 = 30.0;
const MINER_PICKUP_RADIUS: f64 = 1.5;
const MINER_EXTRACT_RADIUS: f64 = 2.0;
const MINER_EXTRACT_PER_TICK: f64 = 10.0;
const MINER_HEAL_FRACTION_FROM_DROP: f64 = 0.5;

/// Runs exactly one tick (§4.6, steps a-g). `now` and `game_time` are
/// supplied by the caller so the loop never re-derives wall clock itself —
/// keeping it trivially testable with synthetic time.
pub fn tick(sim: &mut SimState, now: f64, tick_index: u64) {
    regen_and_spawn_mines(sim, now);
    step_units(sim, now);
    resolve_combat(sim, now);
    expire_transient_entities(sim, now);
    respawn_main_miners(sim, now);
    check_game_over(sim, now);
    let _ = tick_index;
}

fn regen_and_spawn_mines(sim: &mut SimState, now: f64) {
    let mut expired = Vec::new();
    for (id, mine) in sim.mines.iter_mut() {
        if now - mine.created_at >= MINE_LIFETIME_SECS {
            expired.push(id.clone());
            continue;
        }
        mine.energy = (mine.energy + MINE_REGEN_PER_SEC * 0.1).min(MINE_ENERGY_MAX);
    }
    for id in expired {
        sim.mines.remove(&id);
    }
}

/// Called once at game start (§3: four mines near bases) and every 60s
/// thereafter by the owning room task (one new mine, randomly placed).
pub fn seed_initial_mines(sim: &mut SimState, now: f64) {
    let bases: Vec<Point> = sim.bases.values().map(|b| b.position).collect();
    for base in &bases {
        for _ in 0..2 {
            if let Some(point) = find_spawn_point(sim, Some(*base), now) {
                let id = sim.fresh_id("mine");
                sim.mines.insert(
                    id.clone(),
                    MineField {
                        id,
                        position: point,
                        energy: MINE_ENERGY_MAX,
                        created_at: now,
                    },
                );
            }
        }
    }
}

pub fn spawn_periodic_mine(sim: &mut SimState, now: f64) {
    if let Some(point) = find_spawn_point(sim, None, now) {
        let id = sim.fresh_id("mine");
        sim.mines.insert(
            id.clone(),
            MineField {
                id,
                position: point,
                energy: MINE_ENERGY_MAX,
                created_at: now,
            },
        );
    }
}

fn find_spawn_point(sim: &SimState, near_base: Option<Point>, _now: f64) -> Option<Point> {
    let mut rng = rand::rng();
    for _ in 0..40 {
        let candidate = match near_base {
            Some(base) => {
                let angle = rng.random_range(0.0..360.0_f64);
                let distance = rng.random_range(8.0..12.0_f64);
                Point::new(
                    (base.x + angle.to_radians().cos() * distance).clamp(2.0, sim.map_width as f64 - 3.0),
                    (base.y + angle.to_radians().sin() * distance).clamp(2.0, sim.map_height as f64 - 3.0),
                )
            }
            None => Point::new(
                rng.random_range(2.0..(sim.map_width as f64 - 3.0)),
                rng.random_range(2.0..(sim.map_height as f64 - 3.0)),
            ),
        };

        if near_base.is_none()
            && sim
                .bases
                .values()
                .any(|b| b.position.distance(candidate) < MINE_SPAWN_MIN_BASE_DISTANCE)
        {
            continue;
        }
        if sim
            .mines
            .values()
            .any(|m| m.position.distance(candidate) < MINE_SPAWN_MIN_SPACING)
        {
            continue;
        }
        return Some(candidate);
    }
    None
}

fn step_units(sim: &mut SimState, now: f64) {
    let unit_ids: Vec<String> = sim.units.keys().cloned().collect();
    for id in unit_ids {
        step_one_unit(sim, &id, now);
    }
}

fn step_one_unit(sim: &mut SimState, id: &str, now: f64) {
    let Some(unit) = sim.units.get(id) else { return };
    if unit.is_dead {
        return;
    }
    match unit.unit_type {
        UnitType::Miner => step_miner(sim, id, now),
        UnitType::Engineer => step_engineer(sim, id, now),
        UnitType::HeavyTank | UnitType::AssaultTank => step_tank(sim, id),
    }
}

fn nearest<'a, T>(
    from: Point,
    items: impl Iterator<Item = (&'a str, Point, &'a T)>,
) -> Option<(&'a str, Point, &'a T)> {
    items
        .map(|(id, p, v)| (id, p, v, from.distance(p)))
        .min_by(|a, b| a.3.partial_cmp(&b.3).unwrap())
        .map(|(id, p, v, _)| (id, p, v))
}

fn step_miner(sim: &mut SimState, id: &str, now: f64) {
    let (position, carrying, team, speed, is_mining) = {
        let unit = &sim.units[id];
        (unit.position, unit.carrying_energy, unit.team, unit.speed, unit.is_mining)
    };
    let _ = speed;

    let own_base_position = sim.bases.get(&team).map(|b| b.position);

    if carrying >= MINER_CARRY_CAPACITY {
        let Some(base_pos) = own_base_position else { return };
        if position.distance(base_pos) <= 4.0 {
            if let Some(player) = owner_player_mut(sim, id) {
                player.energy += carrying;
            }
            if let Some(unit) = sim.units.get_mut(id) {
                unit.carrying_energy = 0.0;
                unit.is_mining = false;
                unit.target = Some(base_pos);
            }
        } else {
            move_unit(sim, id, base_pos, &DEFAULT_PROFILE);
        }
        return;
    }

    let nearest_drop = nearest(
        position,
        sim.energy_drops.iter().map(|(k, v)| (k.as_str(), v.position, v)),
    )
    .map(|(id, p, v)| (id.to_string(), p, v.energy));
    let nearest_mine = nearest(
        position,
        sim.mines
            .values()
            .filter(|m| m.energy > 0.0)
            .map(|m| (m.id.as_str(), m.position, m)),
    )
    .map(|(id, p, v)| (id.to_string(), p, v.energy));

    let prefer_drop = match (&nearest_drop, &nearest_mine) {
        (Some((_, dp, _)), Some((_, mp, _))) => position.distance(*dp) < position.distance(*mp),
        (Some(_), None) => true,
        _ => false,
    };

    if prefer_drop {
        if let Some((drop_id, drop_pos, drop_energy)) = nearest_drop {
            if position.distance(drop_pos) <= MINER_PICKUP_RADIUS {
                sim.energy_drops.remove(&drop_id);
                if let Some(unit) = sim.units.get_mut(id) {
                    unit.carrying_energy += drop_energy;
                    unit.hp = (unit.hp + unit.hp_max * MINER_HEAL_FRACTION_FROM_DROP).min(unit.hp_max);
                    unit.is_mining = false;
                }
            } else {
                move_unit(sim, id, drop_pos, &DEFAULT_PROFILE);
            }
            return;
        }
    }

    if let Some((mine_id, mine_pos, _)) = nearest_mine {
        if position.distance(mine_pos) <= MINER_EXTRACT_RADIUS {
            if let Some(mine) = sim.mines.get_mut(&mine_id) {
                let extracted = mine.energy.min(MINER_EXTRACT_PER_TICK);
                mine.energy -= extracted;
                if let Some(unit) = sim.units.get_mut(id) {
                    unit.carrying_energy += extracted;
                    unit.is_mining = true;
                }
            }
        } else {
            if let Some(unit) = sim.units.get_mut(id) {
                unit.is_mining = false;
            }
            move_unit(sim, id, mine_pos, &DEFAULT_PROFILE);
        }
        return;
    }

    // Nothing to mine or collect: attack nearest enemy, else idle near base.
    if let Some(enemy) = nearest_enemy(sim, team, position) {
        engage_or_idle(sim, id, &enemy.0, enemy.1, now);
    } else if let Some(base_pos) = own_base_position {
        move_unit(sim, id, base_pos, &DEFAULT_PROFILE);
    }
}

fn step_engineer(sim: &mut SimState, id: &str, now: f64) {
    let (position, team) = {
        let unit = &sim.units[id];
        (unit.position, unit.team)
    };

    let heal_amount = ENGINEER_HEAL_PER_SEC * 0.1;
    let targets: Vec<String> = sim
        .units
        .values()
        .filter(|u| u.team == team && !u.is_dead && u.hp < u.hp_max && position.distance(u.position) <= ENGINEER_HEAL_RADIUS)
        .map(|u| u.id.clone())
        .collect();

    let base_needs_heal = sim
        .bases
        .get(&team)
        .map(|b| b.hp < super::state::BASE_HP_MAX && position.distance(b.position) <= ENGINEER_HEAL_RADIUS)
        .unwrap_or(false);

    if !targets.is_empty() || base_needs_heal {
        for target_id in &targets {
            if let Some(target) = sim.units.get_mut(target_id) {
                target.hp = (target.hp + heal_amount).min(target.hp_max);
                let to = target.position;
                let effect_id = sim.fresh_id("heal");
                sim.heal_effects.insert(
                    effect_id.clone(),
                    HealEffect {
                        id: effect_id,
                        from: position,
                        to,
                        team,
                        created_at: now,
                        lifetime: 1.0,
                    },
                );
            }
        }
        if base_needs_heal {
            if let Some(base) = sim.bases.get_mut(&team) {
                base.hp = (base.hp + heal_amount).min(super::state::BASE_HP_MAX);
            }
        }
        let self_effect_id = sim.fresh_id("heal");
        sim.heal_effects.insert(
            self_effect_id.clone(),
            HealEffect {
                id: self_effect_id,
                from: position,
                to: position,
                team,
                created_at: now,
                lifetime: 1.0,
            },
        );
        return;
    }

    let lowest_hp_ally = sim
        .units
        .values()
        .filter(|u| u.team == team && !u.is_dead && u.id != id)
        .min_by(|a, b| a.hp_fraction().partial_cmp(&b.hp_fraction()).unwrap());

    if let Some(ally) = lowest_hp_ally {
        let ally_pos = ally.position;
        let heading = ((position.y - ally_pos.y).atan2(position.x - ally_pos.x)).to_degrees();
        let destination = Point::new(
            ally_pos.x + heading.to_radians().cos() * 2.0,
            ally_pos.y + heading.to_radians().sin() * 2.0,
        );
        move_unit(sim, id, destination, &ENGINEER_PROFILE);
    } else if let Some(base) = sim.bases.get(&team) {
        let base_pos = base.position;
        move_unit(sim, id, base_pos, &ENGINEER_PROFILE);
    }
}

fn step_tank(sim: &mut SimState, id: &str) {
    let (team, unit_type, position) = {
        let unit = &sim.units[id];
        (unit.team, unit.unit_type, unit.position)
    };

    let target = match unit_type {
        UnitType::HeavyTank => nearest_enemy_tank(sim, team, position)
            .or_else(|| sim.bases.get(&team.opponent()).map(|b| ("base".to_string(), b.position))),
        UnitType::AssaultTank => nearest_enemy_tank(sim, team, position)
            .or_else(|| nearest_enemy_of_type(sim, team, position, UnitType::Engineer))
            .or_else(|| nearest_enemy_of_type(sim, team, position, UnitType::Miner)),
        _ => None,
    };

    match target {
        Some((target_id, target_pos)) => {
            let range = sim.units[id].attack_range;
            let next = step_to_flank(sim, &sim.units[id], &target_id, target_pos, range, &DEFAULT_PROFILE);
            if let Some(unit) = sim.units.get_mut(id) {
                unit.target = Some(target_pos);
                unit.target_id = Some(target_id);
                unit.position = next;
            }
        }
        None => {
            let forward_x = sim
                .bases
                .get(&team)
                .map(|b| if team == Team::Red { b.position.x + 15.0 } else { b.position.x - 15.0 })
                .unwrap_or(position.x);
            let forward_y = sim.bases.get(&team).map(|b| b.position.y).unwrap_or(position.y);
            move_unit(sim, id, Point::new(forward_x, forward_y), &DEFAULT_PROFILE);
        }
    }
}

fn engage_or_idle(sim: &mut SimState, id: &str, target_id: &str, target_pos: Point, _now: f64) {
    let range = sim.units[id].attack_range;
    let next = step_to_flank(sim, &sim.units[id], target_id, target_pos, range, &DEFAULT_PROFILE);
    if let Some(unit) = sim.units.get_mut(id) {
        unit.target = Some(target_pos);
        unit.target_id = Some(target_id.to_string());
        unit.position = next;
    }
}

fn move_unit(sim: &mut SimState, id: &str, destination: Point, profile: &super::ai::MovementProfile) {
    let next = step_toward(sim, &sim.units[id], destination, profile);
    if let Some(unit) = sim.units.get_mut(id) {
        unit.target = Some(destination);
        unit.position = next;
    }
}

fn nearest_enemy(sim: &SimState, team: Team, from: Point) -> Option<(String, Point)> {
    sim.units
        .values()
        .filter(|u| u.team != team && !u.is_dead)
        .map(|u| (u.id.clone(), u.position, from.distance(u.position)))
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .map(|(id, p, _)| (id, p))
}

fn nearest_enemy_tank(sim: &SimState, team: Team, from: Point) -> Option<(String, Point)> {
    sim.units
        .values()
        .filter(|u| u.team != team && !u.is_dead && matches!(u.unit_type, UnitType::HeavyTank | UnitType::AssaultTank))
        .map(|u| (u.id.clone(), u.position, from.distance(u.position)))
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .map(|(id, p, _)| (id, p))
}

fn nearest_enemy_of_type(sim: &SimState, team: Team, from: Point, unit_type: UnitType) -> Option<(String, Point)> {
    sim.units
        .values()
        .filter(|u| u.team != team && !u.is_dead && u.unit_type == unit_type)
        .map(|u| (u.id.clone(), u.position, from.distance(u.position)))
        .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .map(|(id, p, _)| (id, p))
}

fn owner_player_mut(sim: &mut SimState, unit_id: &str) -> Option<&mut super::state::PlayerState> {
    let owner = sim.units.get(unit_id)?.owner_id;
    sim.players.get_mut(&owner)
}

fn resolve_combat(sim: &mut SimState, now: f64) {
    let attacker_ids: Vec<String> = sim
        .units
        .iter()
        .filter(|(_, u)| !u.is_dead && now - u.last_attack_time >= ATTACK_COOLDOWN_SECS)
        .map(|(id, _)| id.clone())
        .collect();

    let mut base_damage: Vec<(Team, f64)> = Vec::new();
    let mut deaths: Vec<String> = Vec::new();
    let mut bullets: Vec<BulletEffect> = Vec::new();

    for id in attacker_ids {
        let Some(unit) = sim.units.get(&id) else { continue };
        let Some(target_id) = unit.target_id.clone() else { continue };
        let attack = unit.attack;
        let range = unit.attack_range;
        let from = unit.position;
        let team = unit.team;
        let is_tank = matches!(unit.unit_type, UnitType::HeavyTank | UnitType::AssaultTank);

        if target_id == "base" {
            if let Some(base) = sim.bases.get(&team.opponent()) {
                if from.distance(base.position) <= range {
                    base_damage.push((team.opponent(), attack));
                    if is_tank {
                        bullets.push(BulletEffect {
                            id: sim.fresh_id("bullet"),
                            from,
                            to: base.position,
                            team,
                            created_at: now,
                            lifetime: 0.3,
                        });
                    }
                    if let Some(unit) = sim.units.get_mut(&id) {
                        unit.last_attack_time = now;
                    }
                }
            }
            continue;
        }

        let Some(target) = sim.units.get(&target_id) else { continue };
        if target.is_dead || from.distance(target.position) > range {
            continue;
        }
        let target_pos = target.position;
        if let Some(target_mut) = sim.units.get_mut(&target_id) {
            target_mut.hp = (target_mut.hp - attack).max(0.0);
            if target_mut.hp <= 0.0 {
                deaths.push(target_id.clone());
            }
        }
        if is_tank {
            bullets.push(BulletEffect {
                id: sim.fresh_id("bullet"),
                from,
                to: target_pos,
                team,
                created_at: now,
                lifetime: 0.3,
            });
        }
        if let Some(unit) = sim.units.get_mut(&id) {
            unit.last_attack_time = now;
        }
    }

    for effect in bullets {
        sim.bullet_effects.insert(effect.id.clone(), effect);
    }

    for (team, damage) in base_damage {
        if let Some(base) = sim.bases.get_mut(&team) {
            base.hp = (base.hp - damage).max(0.0);
        }
    }

    deaths.sort();
    deaths.dedup();
    for dead_id in deaths {
        kill_unit(sim, &dead_id, now);
    }
}

fn kill_unit(sim: &mut SimState, unit_id: &str, now: f64) {
    let Some(unit) = sim.units.get_mut(unit_id) else { return };
    unit.is_dead = true;
    let position = unit.position;
    let carrying = unit.carrying_energy;
    let unit_type = unit.unit_type;
    let owner = unit.owner_id;
    let is_main_miner = unit.is_main_miner;

    let stats = unit_stats(unit_type);
    let drop_energy = carrying + stats.energy_drop_on_death;
    let drop_id = sim.fresh_id("drop");
    sim.energy_drops.insert(
        drop_id.clone(),
        EnergyDrop {
            id: drop_id,
            position,
            energy: drop_energy,
            dropped_at: now,
        },
    );
    sim.units.remove(unit_id);

    if is_main_miner {
        if let Some(player) = sim.players.get_mut(&owner) {
            player.main_miner_died_at = Some(now);
        }
    }
}

fn expire_transient_entities(sim: &mut SimState, now: f64) {
    sim.energy_drops
        .retain(|_, drop| now - drop.dropped_at < ENERGY_DROP_LIFETIME_SECS);
    sim.heal_effects.retain(|_, e| now - e.created_at < e.lifetime);
    sim.bullet_effects.retain(|_, e| now - e.created_at < e.lifetime);
}

fn respawn_main_miners(sim: &mut SimState, now: f64) {
    let due: Vec<(crate::protocol::UserId, Team)> = sim
        .players
        .iter()
        .filter_map(|(uid, player)| {
            let died_at = player.main_miner_died_at?;
            let team = player.team?;
            if now - died_at >= MAIN_MINER_RESPAWN_DELAY_SECS {
                Some((*uid, team))
            } else {
                None
            }
        })
        .collect();

    for (owner, team) in due {
        let Some(base) = sim.bases.get(&team) else { continue };
        let position = spawn_point_near_base(base, team);
        let id = sim.fresh_id("unit");
        let mut unit = Unit::spawn(id.clone(), UnitType::Miner, team, owner, position);
        unit.is_main_miner = true;
        sim.units.insert(id.clone(), unit);
        if let Some(player) = sim.players.get_mut(&owner) {
            player.main_miner_died_at = None;
            player.main_miner_id = Some(id);
        }
    }
}

fn spawn_point_near_base(base: &Base, team: Team) -> Point {
    let offset_x = if team == Team::Red { 2.0 } else { -2.0 };
    Point::new(base.position.x + offset_x, base.position.y)
}

/// Spawns a player's first unit (always a miner) on joining a team, tagged
/// as their main miner. No-op if they already have one.
pub fn spawn_main_miner(sim: &mut SimState, owner: crate::protocol::UserId, team: Team) {
    let has_one = sim
        .players
        .get(&owner)
        .map(|p| p.main_miner_id.is_some())
        .unwrap_or(false);
    if has_one {
        return;
    }
    let Some(base) = sim.bases.get(&team) else { return };
    let position = spawn_point_near_base(base, team);
    let id = sim.fresh_id("unit");
    let mut unit = Unit::spawn(id.clone(), UnitType::Miner, team, owner, position);
    unit.is_main_miner = true;
    sim.units.insert(id.clone(), unit);
    if let Some(player) = sim.players.get_mut(&owner) {
        player.main_miner_id = Some(id);
    }
}

/// Deducts the unit's spawn cost from the player's energy and places it at
/// their base, offset toward the enemy base (§4.6 economy).
pub fn spawn_unit(sim: &mut SimState, owner: crate::protocol::UserId) -> Result<(), &'static str> {
    let (team, unit_type) = {
        let player = sim.players.get(&owner).ok_or("you have not joined a team")?;
        let team = player.team.ok_or("you have not joined a team")?;
        let unit_type = player
            .selected_unit_type
            .ok_or("select a unit type before spawning")?;
        (team, unit_type)
    };
    let stats = unit_stats(unit_type);
    {
        let player = sim.players.get_mut(&owner).unwrap();
        if player.energy < stats.spawn_cost {
            return Err("not enough energy");
        }
        player.energy -= stats.spawn_cost;
    }

    let own_base_position = sim.bases.get(&team).map(|b| b.position).ok_or("no base for this team")?;
    let enemy_base_position = sim.bases.get(&team.opponent()).map(|b| b.position);
    let position = match enemy_base_position {
        Some(enemy_pos) => {
            let distance = own_base_position.distance(enemy_pos).max(1e-6);
            let dx = (enemy_pos.x - own_base_position.x) / distance;
            let dy = (enemy_pos.y - own_base_position.y) / distance;
            Point::new(
                (own_base_position.x + dx * 3.0).clamp(2.0, sim.map_width as f64 - 3.0),
                (own_base_position.y + dy * 3.0).clamp(2.0, sim.map_height as f64 - 3.0),
            )
        }
        None => own_base_position,
    };

    let id = sim.fresh_id("unit");
    let unit = Unit::spawn(id.clone(), unit_type, team, owner, position);
    sim.units.insert(id, unit);
    Ok(())
}

fn check_game_over(sim: &mut SimState, now: f64) {
    if sim.winner.is_some() {
        return;
    }
    let dead_team = sim.bases.values().find(|b| b.hp <= 0.0).map(|b| b.team);
    if let Some(losing_team) = dead_team {
        sim.winner = Some(losing_team.opponent());
        sim.game_over_time = Some(now);
    }
}
