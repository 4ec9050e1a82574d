#![allow(dead_code)]

use tick_scheduler::engine::systems::SystemMetadata;

pub const SYSTEMS: usize = 24;
pub const WORK_PER_SYSTEM: u64 = 20_000;

pub struct Position;
pub struct Velocity;
pub struct Health;
pub struct Wealth;

/// Every fourth system writes one of four components; the rest read it.
pub fn layered_metadata(i: usize) -> SystemMetadata {
    let meta = SystemMetadata::new((i / 4) as i32);
    match (i % 4, i % 8 < 4) {
        (0, true) => meta.writes::<Position>(),
        (0, false) => meta.writes::<Velocity>(),
        (1, _) => meta.reads::<Position>(),
        (2, _) => meta.reads::<Velocity>().writes::<Health>(),
        _ => meta.reads::<Health>().writes::<Wealth>(),
    }
}

/// Deterministic busy work standing in for a system body.
pub fn spin(iterations: u64, seed: u64) -> u64 {
    let mut x = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    for _ in 0..iterations {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
    }
    x
}
