//! Timing wheel load simulation: a connection table's worth of timeouts
//! scheduled at once, then drained through the tick loop.

use intrusive_timing_wheel::TimingWheel;
use rand::Rng;
use std::time::Instant;

fn main() {
    println!("Starting Timing Wheel Simulation...");

    let mut wheel = TimingWheel::new();
    let num_timers = 100_000;
    let mut rng = rand::thread_rng();

    println!("-> Scheduling {} timers...", num_timers);
    let start_schedule = Instant::now();

    // Timeouts between 1ms and 10s at 1ms per tick, the mix a connection
    // manager sees: retransmits up close, keepalives far out
    for i in 0..num_timers {
        let lifetime: u64 = rng.gen_range(1..=10_000);
        wheel.insert(lifetime, format!("Request-{}", i));
    }

    let schedule_time = start_schedule.elapsed();
    println!("   Scheduled {} timers in {:?}", num_timers, schedule_time);
    println!(
        "   Rate: {:.2} million schedules/sec",
        (num_timers as f64 / schedule_time.as_secs_f64()) / 1_000_000.0
    );

    println!("\n-> Running Tick Loop...");
    let start_tick = Instant::now();

    let mut total_expired = 0;
    let mut ticks = 0u64;

    // Run ticks until every timer has expired
    while total_expired < num_timers {
        total_expired += wheel.tick(|wheel, id| {
            wheel.remove(id);
        });
        ticks += 1;

        if ticks % 1000 == 0 {
            println!("   Tick {}: Processed {} timers so far...", ticks, total_expired);
        }
    }

    let tick_time = start_tick.elapsed();
    println!("   Finished in {:?}", tick_time);
    println!("   Total Ticks: {}", ticks);
    println!("   Total Expired: {}", total_expired);

    println!("\n SUCCESS: The Wheel handled the load!");
}
