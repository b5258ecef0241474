//! Movement primitives and per-unit-type behaviour (§4.6).
//!
//! Every unit consults [`step_toward`] (or, for attackers, [`step_to_flank`])
//! once per tick. The primitive is deliberately free of unit-type knowledge;
//! callers pass in the handful of knobs (step distance, direction fan,
//! angle count) that vary by type.

use crate::protocol::{Team, UnitType};

use super::state::{Point, SimState, Unit};

const TICK_SECS: f64 = 0.1;
const MINING_PENALTY: f64 = 0.8;
const LOOKAHEAD_STEPS: i32 = 3;
const FALLBACK_RADII: [f64; 4] = [1.0, 1.5, 2.0, 2.5];

pub struct MovementProfile {
    pub detour_half_arc_deg: f64,
    pub detour_step_deg: f64,
    pub primary_direction_count: u32,
}

pub const DEFAULT_PROFILE: MovementProfile = MovementProfile {
    detour_half_arc_deg: 45.0,
    detour_step_deg: 15.0,
    primary_direction_count: 8,
};

pub const ENGINEER_PROFILE: MovementProfile = MovementProfile {
    detour_half_arc_deg: 60.0,
    detour_step_deg: 15.0,
    primary_direction_count: 24,
};

fn is_blocked(sim: &SimState, candidate: Point, moving_unit_id: &str, is_engineer: bool) -> bool {
    let (cx, cy) = candidate.cell();
    if cx < 0 || cy < 0 || cx as u32 >= sim.map_width || cy as u32 >= sim.map_height {
        return true;
    }
    for base in sim.bases.values() {
        if base.position.cell() == (cx, cy) {
            return true;
        }
    }

    let mut non_engineer_count = 0;
    let mut engineer_count = 0;
    for unit in sim.units.values() {
        if unit.is_dead || unit.id == moving_unit_id {
            continue;
        }
        if unit.position.cell() != (cx, cy) {
            continue;
        }
        if unit.unit_type == UnitType::Engineer {
            engineer_count += 1;
        } else {
            non_engineer_count += 1;
        }
    }

    if is_engineer {
        engineer_count >= 2
    } else {
        non_engineer_count >= 2
    }
}

fn clamp_to_bounds(sim: &SimState, p: Point) -> Point {
    let min_x = 2.0;
    let min_y = 2.0;
    let max_x = sim.map_width as f64 - 3.0;
    let max_y = sim.map_height as f64 - 3.0;
    Point::new(p.x.clamp(min_x, max_x), p.y.clamp(min_y, max_y))
}

fn heading_deg(from: Point, to: Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees()
}

fn offset(origin: Point, heading_deg: f64, distance: f64) -> Point {
    let rad = heading_deg.to_radians();
    Point::new(origin.x + rad.cos() * distance, origin.y + rad.sin() * distance)
}

/// Advances `unit` one tick toward `destination`, honouring grid occupancy,
/// lookahead detour, and the final radial fallback. Returns the position the
/// unit ends the tick at (which the caller writes back).
pub fn step_toward(
    sim: &SimState,
    unit: &Unit,
    destination: Point,
    profile: &MovementProfile,
) -> Point {
    let origin = unit.position;
    if origin.distance(destination) < 1e-6 {
        return origin;
    }

    let is_engineer = unit.unit_type == UnitType::Engineer;
    let base_heading = heading_deg(origin, destination);
    let step_distance = unit.speed * TICK_SECS * if unit.is_mining { MINING_PENALTY } else { 1.0 };

    let direct = offset(origin, base_heading, step_distance);
    let lookahead_clear = (1..=LOOKAHEAD_STEPS).all(|i| {
        let probe = offset(origin, base_heading, step_distance * i as f64);
        !is_blocked(sim, probe, &unit.id, is_engineer)
    });

    if lookahead_clear {
        return clamp_to_bounds(sim, direct);
    }

    // Detour: sample headings within the arc, try decreasing step multipliers.
    let mut best: Option<(f64, Point)> = None;
    let mut angle = -profile.detour_half_arc_deg;
    while angle <= profile.detour_half_arc_deg {
        let heading = base_heading + angle;
        for multiplier in [1.0, 0.8, 0.6] {
            let candidate = offset(origin, heading, step_distance * multiplier);
            let two_step_clear = (1..=2).all(|i| {
                let probe = offset(origin, heading, step_distance * multiplier * i as f64);
                !is_blocked(sim, probe, &unit.id, is_engineer)
            });
            if two_step_clear {
                let score = candidate.distance(destination) + angle.abs() * 0.1;
                if best.map(|(s, _)| score < s).unwrap_or(true) {
                    best = Some((score, candidate));
                }
            }
        }
        angle += profile.detour_step_deg;
    }
    if let Some((_, candidate)) = best {
        return clamp_to_bounds(sim, candidate);
    }

    // Direct move blocked and no detour: try primary directions ordered by
    // similarity to the desired heading.
    let direction_count = profile.primary_direction_count.max(1);
    let mut directions: Vec<f64> = (0..direction_count)
        .map(|i| i as f64 * 360.0 / direction_count as f64)
        .collect();
    directions.sort_by(|a, b| {
        let da = angle_delta(base_heading, *a).abs();
        let db = angle_delta(base_heading, *b).abs();
        da.partial_cmp(&db).unwrap()
    });
    for heading in directions {
        for tenth in (2..=10).rev() {
            let multiplier = tenth as f64 / 10.0;
            let candidate = offset(origin, heading, step_distance * multiplier);
            if !is_blocked(sim, candidate, &unit.id, is_engineer) {
                return clamp_to_bounds(sim, candidate);
            }
        }
    }

    // Final fallback: radial probes that do not worsen distance-to-target
    // beyond speed.
    let current_distance = origin.distance(destination);
    let mut fallback_angle = 0.0;
    while fallback_angle < 360.0 {
        for radius in FALLBACK_RADII {
            let candidate = offset(origin, fallback_angle, radius);
            if is_blocked(sim, candidate, &unit.id, is_engineer) {
                continue;
            }
            if candidate.distance(destination) <= current_distance + unit.speed * TICK_SECS * 10.0 {
                return clamp_to_bounds(sim, candidate);
            }
        }
        fallback_angle += 37.5; // one of the 30-45 degree increments named in the primitive
    }

    origin
}

fn angle_delta(a: f64, b: f64) -> f64 {
    let mut delta = (a - b) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    delta
}

/// How many allied units already have `target_id == target_id_of_interest`
/// pointing at roughly the same location, read live off unit state this
/// tick (never cached — §9).
fn flank_slot(sim: &SimState, team: Team, target_id: &str, excluding: &str) -> u32 {
    sim.units
        .values()
        .filter(|u| u.team == team && !u.is_dead && u.id != excluding)
        .filter(|u| u.target_id.as_deref() == Some(target_id))
        .count() as u32
}

/// Attack-range-aware movement: picks a flank slot based on concurrent
/// intents, computes an ideal parking position at `range * 0.9` from the
/// target, and steps toward it — but treats any cell already within `range`
/// of the target as acceptable.
pub fn step_to_flank(
    sim: &SimState,
    unit: &Unit,
    target_id: &str,
    target_position: Point,
    range: f64,
    profile: &MovementProfile,
) -> Point {
    if unit.position.distance(target_position) <= range {
        return unit.position;
    }
    let slot = flank_slot(sim, unit.team, target_id, &unit.id) % 4;
    let flank_angle = match slot {
        0 => heading_deg(target_position, unit.position),
        1 => heading_deg(target_position, unit.position) + 90.0,
        2 => heading_deg(target_position, unit.position) - 90.0,
        _ => heading_deg(target_position, unit.position) + 180.0,
    };
    let ideal = offset(target_position, flank_angle, range * 0.9);
    let next = step_toward(sim, unit, ideal, profile);
    if next.distance(target_position) <= range {
        next
    } else {
        step_toward(sim, unit, ideal, profile)
    }
}
