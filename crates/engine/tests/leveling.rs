//! Leveling engine behavior on small hand-built worlds: transfer, pouring,
//! equalization, barriers, overflow, hooks, and end-to-end settling.

mod common;

use std::sync::Arc;

use common::*;
use finite_engine::World;
use finite_engine::config::LevelingConfig;
use finite_engine::fluid::{FluidError, Handling, Outcome};
use finite_engine::world::block::{BlockId, Facing, Layer};
use finite_engine::world::position::{BlockPos, Vec3};
use finite_engine::world::registry::BlockRegistry;

const DT: u64 = 50;

// ---------------------------------------------------------------------------
// Vertical transfer
// ---------------------------------------------------------------------------

#[test]
fn vertical_transfer_moves_what_fits() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let below = BlockPos::new(8, 10, 8);
    let above = below.up();
    wall_in(&world, &blocks, below);
    wall_in(&world, &blocks, above);
    put_level(&world, &blocks, below, 5);
    put_level(&world, &blocks, above, 4);

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(above));

    assert_eq!(outcome, Ok(Outcome::MovedDown));
    assert_eq!(level(&world, &reg, below), 7);
    assert_eq!(level(&world, &reg, above), 2);
    assert_eq!(report.conservation_anomalies, 0);
    // Both cells still hold fluid, so both are re-armed.
    assert!(sim.scheduler().is_pending(below));
    assert!(sim.scheduler().is_pending(above));
}

#[test]
fn resting_on_solid_ground_skips_vertical_transfer() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    wall_in(&world, &blocks, pos);
    put_level(&world, &blocks, pos, 3);

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(pos));
    assert_eq!(outcome, Ok(Outcome::Idle));
    assert_eq!(report.mutations, 0);
    assert!(sim.is_quiet());
}

#[test]
fn stacked_column_over_full_cell_is_stable() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let bottom = BlockPos::new(8, 10, 8);
    for y in 10..=12 {
        wall_in(&world, &blocks, BlockPos::new(8, y, 8));
    }
    let mut sim = simulation(&reg);
    let placed = sim.add_fluid(&world, bottom, 10).unwrap();
    assert_eq!(placed.placed, 10);

    sim.run_until_quiet(&world, DT, 1_000).unwrap();
    assert_eq!(level(&world, &reg, bottom), 7);
    assert_eq!(level(&world, &reg, bottom.up()), 3);
}

// ---------------------------------------------------------------------------
// Merging into a legacy body
// ---------------------------------------------------------------------------

#[test]
fn merges_into_water_like_legacy_body_below() {
    let (reg, blocks) = registry();
    let world = empty_world(&reg, 1);
    let pos = BlockPos::new(8, 11, 8);
    world.set_block(pos.down(), blocks.legacy_water);
    wall_in(&world, &blocks, pos);
    put_level(&world, &blocks, pos, 4);

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(pos));
    assert_eq!(outcome, Ok(Outcome::Merged));
    assert_eq!(report.merged, 1);
    assert_eq!(level(&world, &reg, pos), 0);
    assert_eq!(world.get_block(pos.down(), Layer::Fluid), blocks.legacy_water);
}

#[test]
fn never_merges_into_lava() {
    let (reg, blocks) = registry();
    let world = empty_world(&reg, 1);
    let pos = BlockPos::new(8, 11, 8);
    world.set_block(pos.down(), blocks.lava);
    wall_in(&world, &blocks, pos);
    put_level(&world, &blocks, pos, 4);

    let mut sim = simulation(&reg);
    let (outcome, _) = sim.with_pass(&world, |p| p.evaluate(pos));
    assert_eq!(outcome, Ok(Outcome::Idle));
    assert_eq!(level(&world, &reg, pos), 4);
}

// ---------------------------------------------------------------------------
// Downward pouring
// ---------------------------------------------------------------------------

/// A source on a one-block pillar: stone under the source, open air beside
/// it, and stone one block further down under the pour targets.
fn ledge(level_at_source: u8) -> (Arc<World>, Arc<BlockRegistry>, Blocks, BlockPos) {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 8);
    let source = BlockPos::new(8, 10, 8);
    world.set_block(source.down(), blocks.stone);
    put_level(&world, &blocks, source, level_at_source);
    (world, reg, blocks, source)
}

#[test]
fn pours_over_a_ledge() {
    let (world, reg, blocks, source) = ledge(2);
    stone_at(
        &world,
        &blocks,
        &[
            source.offset(Facing::North),
            source.offset(Facing::South),
            source.offset(Facing::West),
        ],
    );
    let target = source.offset(Facing::East).down();

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(source));
    assert_eq!(outcome, Ok(Outcome::Poured));
    assert_eq!(level(&world, &reg, source), 0);
    assert_eq!(level(&world, &reg, target), 2);
    assert_eq!(report.limit_hits, 0);
    assert_eq!(report.conservation_anomalies, 0);
}

#[test]
fn pour_candidates_rank_downwind_first() {
    let (world, reg, _blocks, source) = ledge(4);
    world.set_wind(Vec3::new(-1.0, 0.0, 0.0));

    let mut sim = simulation(&reg);
    let (targets, _) = sim.with_pass(&world, |p| p.find_downward_pours(source, 4, BlockId::AIR));
    let targets = targets.unwrap();
    assert_eq!(targets.len(), 4);
    assert_eq!(targets[0], source.offset(Facing::West).down());
    assert_eq!(targets[3], source.offset(Facing::East).down());
}

#[test]
fn pour_stops_at_iteration_cap_and_keeps_partial_result() {
    let (world, reg, blocks, source) = ledge(5);
    stone_at(
        &world,
        &blocks,
        &[source.offset(Facing::South), source.offset(Facing::West)],
    );
    let north = source.offset(Facing::North).down();
    let east = source.offset(Facing::East).down();
    put_level(&world, &blocks, north, 6);
    let before = total(&world, &reg, &[source, north, east]);

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(source));
    assert_eq!(outcome, Ok(Outcome::Poured));
    assert_eq!(report.limit_hits, 1);
    assert_eq!(level(&world, &reg, north), 7);
    assert_eq!(level(&world, &reg, east), 3);
    assert_eq!(level(&world, &reg, source), 1);
    assert_eq!(total(&world, &reg, &[source, north, east]), before);
    // The leftover unit is picked up by the next recheck.
    assert!(sim.scheduler().is_pending(source));
}

// ---------------------------------------------------------------------------
// Horizontal equalization
// ---------------------------------------------------------------------------

#[test]
fn equal_levels_are_a_fixed_point() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let center = BlockPos::new(8, 10, 8);
    world.set_block(center.offset(Facing::South), blocks.stone);
    for p in [
        center,
        center.offset(Facing::North),
        center.offset(Facing::East),
        center.offset(Facing::West),
    ] {
        put_level(&world, &blocks, p, 4);
    }

    let mut sim = simulation(&reg);
    let (outcome, report) = sim.with_pass(&world, |p| p.evaluate(center));
    assert_eq!(outcome, Ok(Outcome::Idle));
    assert_eq!(report.mutations, 0);
    assert!(sim.is_quiet());
}

fn three_cell_row() -> (Arc<World>, Arc<BlockRegistry>, BlockPos) {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let center = BlockPos::new(8, 10, 8);
    stone_at(
        &world,
        &blocks,
        &[
            center.offset(Facing::North),
            center.offset(Facing::South),
            center.offset(Facing::East).offset(Facing::East),
            center.offset(Facing::West).offset(Facing::West),
        ],
    );
    put_level(&world, &blocks, center, 5);
    put_level(&world, &blocks, center.offset(Facing::East), 1);
    put_level(&world, &blocks, center.offset(Facing::West), 1);
    (world, reg, center)
}

#[test]
fn remainder_goes_to_self_without_wind() {
    let (world, reg, center) = three_cell_row();
    let mut sim = simulation(&reg);
    let (outcome, _) = sim.with_pass(&world, |p| p.evaluate(center));
    assert_eq!(outcome, Ok(Outcome::Equalized));
    assert_eq!(level(&world, &reg, center), 3);
    assert_eq!(level(&world, &reg, center.offset(Facing::East)), 2);
    assert_eq!(level(&world, &reg, center.offset(Facing::West)), 2);
}

#[test]
fn remainder_goes_downwind() {
    let (world, reg, center) = three_cell_row();
    world.set_wind(Vec3::new(1.0, 0.0, 0.0));
    let mut sim = simulation(&reg);
    sim.with_pass(&world, |p| p.evaluate(center)).0.unwrap();
    assert_eq!(level(&world, &reg, center.offset(Facing::East)), 3);
    assert_eq!(level(&world, &reg, center), 2);
    assert_eq!(level(&world, &reg, center.offset(Facing::West)), 2);
}

#[test]
fn off_by_one_neighbors_stay_settled_without_wind() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let a = BlockPos::new(8, 10, 8);
    let b = a.offset(Facing::East);
    stone_at(
        &world,
        &blocks,
        &[
            a.offset(Facing::North),
            a.offset(Facing::South),
            a.offset(Facing::West),
            b.offset(Facing::North),
            b.offset(Facing::South),
            b.offset(Facing::East),
        ],
    );
    put_level(&world, &blocks, a, 4);
    put_level(&world, &blocks, b, 3);

    let mut sim = simulation(&reg);
    sim.on_placed(&world, a);
    sim.on_placed(&world, b);
    let ticks = sim.run_until_quiet(&world, DT, 2_000).unwrap();

    assert!(sim.is_quiet(), "trough still busy after {} ticks", ticks);
    assert!(ticks < 10);
    assert_eq!(level(&world, &reg, a), 4);
    assert_eq!(level(&world, &reg, b), 3);
}

#[test]
fn remainder_row_settles() {
    let (world, reg, center) = three_cell_row();
    let row = [center.offset(Facing::West), center, center.offset(Facing::East)];
    let mut sim = simulation(&reg);
    for &p in &row {
        sim.on_placed(&world, p);
    }
    let ticks = sim.run_until_quiet(&world, DT, 2_000).unwrap();

    assert!(sim.is_quiet(), "row still busy after {} ticks", ticks);
    let layer: Vec<BlockPos> = (0..32)
        .flat_map(|x| (0..32).map(move |z| BlockPos::new(x, center.y, z)))
        .collect();
    assert_eq!(total(&world, &reg, &layer), 7);
}

#[test]
fn single_unit_does_not_spread_sideways() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    put_level(&world, &blocks, pos, 1);

    let mut sim = simulation(&reg);
    let (outcome, _) = sim.with_pass(&world, |p| p.evaluate(pos));
    assert_eq!(outcome, Ok(Outcome::Idle));
    assert_eq!(level(&world, &reg, pos), 1);
}

// ---------------------------------------------------------------------------
// Barrier admission
// ---------------------------------------------------------------------------

#[test]
fn barrier_equal_to_fill_fraction_denies() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    let east = pos.offset(Facing::East);
    let west = pos.offset(Facing::West);
    world.set_block(east, blocks.wall_three_sevenths);
    world.set_block(west, blocks.wall_just_under);
    put_level(&world, &blocks, pos, 3);

    let mut sim = simulation(&reg);
    let (east_ok, _) = sim.with_pass(&world, |p| p.can_spread_into(3, BlockId::AIR, pos, east, Facing::East));
    let (west_ok, _) = sim.with_pass(&world, |p| p.can_spread_into(3, BlockId::AIR, pos, west, Facing::West));
    assert_eq!(east_ok, Ok(false));
    assert_eq!(west_ok, Ok(true));

    // A fuller source clears the same barrier.
    let (east_ok, _) = sim.with_pass(&world, |p| p.can_spread_into(4, BlockId::AIR, pos, east, Facing::East));
    assert_eq!(east_ok, Ok(true));
}

#[test]
fn spread_into_unloaded_chunk_is_denied() {
    let (reg, blocks) = registry();
    let world = empty_world(&reg, 1);
    let edge = BlockPos::new(31, 10, 8);
    put_level(&world, &blocks, edge, 5);

    let mut sim = simulation(&reg);
    let (ok, _) = sim.with_pass(&world, |p| {
        p.can_spread_into(5, BlockId::AIR, edge, edge.offset(Facing::East), Facing::East)
    });
    assert_eq!(ok, Ok(false));
}

#[test]
fn spread_into_foreign_fluid_is_denied() {
    let (reg, blocks) = registry();
    let world = empty_world(&reg, 1);
    let pos = BlockPos::new(8, 10, 8);
    world.set_block(pos.offset(Facing::North), blocks.lava);

    let mut sim = simulation(&reg);
    let (ok, _) = sim.with_pass(&world, |p| {
        p.can_spread_into(7, BlockId::AIR, pos, pos.offset(Facing::North), Facing::North)
    });
    assert_eq!(ok, Ok(false));
}

// ---------------------------------------------------------------------------
// Placement and overflow
// ---------------------------------------------------------------------------

#[test]
fn overflow_goes_to_the_cell_above() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);

    let mut sim = simulation(&reg);
    let placement = sim.add_fluid(&world, pos, 10).unwrap();
    assert_eq!(placement.placed, 10);
    assert_eq!(placement.lost, 0);
    assert_eq!(level(&world, &reg, pos), 7);
    assert_eq!(level(&world, &reg, pos.up()), 3);
    assert!(sim.scheduler().is_pending(pos));
    assert!(sim.scheduler().is_pending(pos.up()));
}

#[test]
fn overflow_into_blocked_cell_is_lost() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    world.set_block(pos.up(), blocks.stone);

    let mut sim = simulation(&reg);
    let placement = sim.add_fluid(&world, pos, 10).unwrap();
    assert_eq!(placement.placed, 7);
    assert_eq!(placement.lost, 3);
    assert_eq!(level(&world, &reg, pos), 7);
}

#[test]
fn walled_shaft_settles_to_the_bottom() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let shaft: Vec<BlockPos> = (10..=13).map(|y| BlockPos::new(8, y, 8)).collect();
    for &p in &shaft {
        wall_in(&world, &blocks, p);
    }

    let mut sim = simulation(&reg);
    sim.add_fluid(&world, shaft[3], 7).unwrap();
    let mut ticks = 0;
    while !sim.is_quiet() {
        sim.tick(&world, DT).unwrap();
        ticks += 1;
        assert_eq!(total(&world, &reg, &shaft), 7, "volume drifted on tick {}", ticks);
        assert!(ticks < 1_000, "shaft never settled");
    }

    assert_eq!(level(&world, &reg, shaft[0]), 7);
    for &p in &shaft[1..] {
        assert_eq!(level(&world, &reg, p), 0);
    }
    assert_eq!(total(&world, &reg, &shaft), 7);
}

#[test]
fn open_floor_spill_conserves_volume() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let origin = BlockPos::new(16, 10, 16);

    let mut sim = simulation(&reg);
    sim.add_fluid(&world, origin, 7).unwrap();
    let ticks = sim.run_until_quiet(&world, DT, 5_000).unwrap();
    assert!(sim.is_quiet(), "spill still busy after {} ticks", ticks);

    let area: Vec<BlockPos> = (8..=24)
        .flat_map(|x| (8..=24).map(move |z| BlockPos::new(x, 10, z)))
        .collect();
    assert_eq!(total(&world, &reg, &area), 7);
    assert!(area.iter().all(|&p| level(&world, &reg, p) <= 2));
}

#[test]
fn resolve_addition_merges_and_caps() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    put_level(&world, &blocks, pos, 5);

    let mut sim = simulation(&reg);
    let merged = sim.resolve_addition(&world, pos, blocks.levels[1]).unwrap();
    assert_eq!(merged, blocks.levels[6]);
    let capped = sim.resolve_addition(&world, pos, blocks.levels[3]).unwrap();
    assert_eq!(capped, blocks.levels[6]);
    let other = sim.resolve_addition(&world, pos, blocks.stone).unwrap();
    assert_eq!(other, blocks.stone);
    // Pure: nothing was written.
    assert_eq!(level(&world, &reg, pos), 5);
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

#[test]
fn neighbor_change_is_owned_for_family_cells_only() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    put_level(&world, &blocks, pos, 2);

    let mut sim = simulation(&reg);
    assert_eq!(sim.on_neighbor_changed(&world, pos), Handling::PreventDefault);
    assert!(sim.scheduler().is_pending(pos));
    assert_eq!(sim.on_neighbor_changed(&world, pos.up()), Handling::PassThrough);
    assert!(!sim.scheduler().is_pending(pos.up()));
}

#[test]
fn burst_of_changes_coalesces_into_one_evaluation() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    put_level(&world, &blocks, pos, 1);

    let mut sim = simulation(&reg);
    for _ in 0..5 {
        sim.on_neighbor_changed(&world, pos);
        sim.tick(&world, 20).unwrap();
    }
    assert_eq!(sim.pending(), 1);
    let report = sim.tick(&world, 150).unwrap();
    assert_eq!(report.evaluations, 1);
}

#[test]
fn take_one_unit_decrements() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let pos = BlockPos::new(8, 10, 8);
    put_level(&world, &blocks, pos, 1);

    let mut sim = simulation(&reg);
    assert_eq!(sim.take_one_unit(&world, pos), Ok(true));
    assert_eq!(level(&world, &reg, pos), 0);
    assert_eq!(sim.take_one_unit(&world, pos), Ok(false));
}

#[test]
fn evaporation_needs_open_sky_and_a_low_roll() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let open = BlockPos::new(8, 10, 8);
    let covered = BlockPos::new(12, 10, 12);
    put_level(&world, &blocks, open, 3);
    put_level(&world, &blocks, covered, 3);
    world.set_block(covered.up(), blocks.stone);

    let mut sim = simulation(&reg);
    assert_eq!(sim.evaporate(&world, open, 0.5), Ok(false));
    assert_eq!(sim.evaporate(&world, open, 0.001), Ok(true));
    assert_eq!(level(&world, &reg, open), 2);
    assert_eq!(sim.evaporate(&world, covered, 0.001), Ok(false));
    assert_eq!(level(&world, &reg, covered), 3);
}

// ---------------------------------------------------------------------------
// Tick driver
// ---------------------------------------------------------------------------

#[test]
fn per_tick_cap_defers_the_rest() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let config = LevelingConfig {
        max_evaluations_per_tick: 2,
        ..LevelingConfig::default()
    };
    let mut sim = simulation_with(&reg, config);
    for i in 0..5 {
        let pos = BlockPos::new(2 + 3 * i, 10, 8);
        put_level(&world, &blocks, pos, 1);
        sim.on_placed(&world, pos);
    }

    let report = sim.tick(&world, 150).unwrap();
    assert_eq!(report.evaluations, 2);
    assert_eq!(report.deferred, 3);
    assert_eq!(report.limit_hits, 1);
    assert_eq!(sim.pending(), 3);

    let report = sim.tick(&world, DT).unwrap();
    assert_eq!(report.evaluations, 2);
    assert_eq!(sim.pending(), 1);
}

#[test]
fn corrupt_tag_fails_the_tick_and_rearms_the_rest() {
    let (reg, blocks) = registry();
    let world = flat_world(&reg, &blocks, 1, 9);
    let bad = BlockPos::new(4, 10, 4);
    let good = BlockPos::new(20, 10, 20);
    world.set_block(bad, blocks.corrupt);
    put_level(&world, &blocks, good, 1);

    let mut sim = simulation(&reg);
    sim.on_placed(&world, bad);
    sim.on_placed(&world, good);

    let err = sim.tick(&world, 150).unwrap_err();
    assert!(matches!(err, FluidError::CorruptLevelTag { .. }));
    assert!(sim.scheduler().is_pending(good));
    assert!(!sim.scheduler().is_pending(bad));
}
