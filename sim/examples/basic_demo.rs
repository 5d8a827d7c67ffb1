//! Basic demonstration of the tempo simulation.
//!
//! Run with: cargo run --example basic_demo
//! Per-stage timings: cargo run --example basic_demo --features profile
//! Verbose logs: RUST_LOG=debug cargo run --example basic_demo

use tempo_sim::{SimWorld, Timeline};

fn main() {
    env_logger::init();

    println!("=== Tempo - Simulation Demo ===\n");

    // Walled present arena, open future arena, two players, three enemies
    let mut sim = SimWorld::new_default_test_world();
    if cfg!(feature = "profile") {
        sim.enable_profiling();
    }

    if let Some(grid) = sim.nav_grid(Timeline::Present) {
        println!(
            "Present grid: {}x{} cells, {} walkable\n",
            grid.width,
            grid.height,
            grid.walkable_count()
        );
    }

    println!("Initial state:");
    print_snapshot(&mut sim);

    // Enemies chase toward the players' side of the wall
    println!("\n--- Sending enemies after the players ---\n");
    for id in [100, 101] {
        if let Err(e) = sim.set_destination(id, -6.0, 0.0) {
            eprintln!("  enemy {id}: {e}");
        }
    }
    if let Err(e) = sim.set_destination(200, -6.0, 3.0) {
        eprintln!("  enemy 200: {e}");
    }

    // Players stand still for a second, then sprint: time crawls, then flows
    println!("Running simulation for 5 seconds at 50 ticks/sec...\n");
    for tick in 0..250u32 {
        if tick >= 50 {
            let t = (tick - 50) as f32 * 0.02;
            let _ = sim.set_player_position(1, -6.0 + 4.0 * t, 0.0);
        }
        sim.step(0.02);

        if (tick + 1) % 50 == 0 {
            println!(
                "--- Tick {} (t={:.1}s, timescale={:.2}) ---",
                sim.current_tick(),
                sim.current_time(),
                sim.timescale()
            );
            print_snapshot(&mut sim);
        }
    }

    if let Some(profiler) = sim.profiler() {
        println!("\n{}", profiler.summary());
    }

    println!("\n=== Final State (JSON) ===\n");
    match sim.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize snapshot: {e}"),
    }
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();

    for agent in &snapshot.agents {
        println!(
            "    {:<6} {:>3} [{:<7}] pos=({:>5.1}, {:>5.1}) dir=({:>5.2}, {:>5.2}) speed={:.2} left={}",
            agent.kind,
            agent.id,
            agent.timeline,
            agent.x,
            agent.y,
            agent.dir_x,
            agent.dir_y,
            agent.speed,
            agent.path_remaining
        );
    }
}
