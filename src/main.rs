use stress_test::{stress_test_actors, stress_test_scaling, stress_test_simulated};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async_main());
}

async fn async_main() {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            SIMULATED NETWORK STRESS TESTS                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: reliable network, small scale
    let stats = stress_test_simulated(4, 100, 0.0);
    stats.print();

    // Test 2: lossy, duplicating, reordering network
    let stats = stress_test_simulated(6, 100, 0.1);
    stats.print();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC ACTOR STRESS TESTS                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 3: actor runtime, small scale
    let stats = stress_test_actors(4, 100).await;
    stats.print();

    // Test 4: actor runtime, medium scale
    let stats = stress_test_actors(10, 200).await;
    stats.print();

    // Test 5: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (actors)                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(12, 4).await;

    println!("\n✓ All stress tests completed successfully!");
}
