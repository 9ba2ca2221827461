use roulette_core::{
    compute_schedule, BandFormat, DrawEngine, DrawRequest, PrizeCategory, ProvablyFairRng,
    QuotaPolicy, SpinnerConfig, SpinnerTimeSelector, TraversalMode,
};

fn main() {
    // Example end-to-end draw without waiting on the delays
    let mut category = PrizeCategory::structured(
        "R001",
        "Grand",
        "Grand Prize",
        2,
        BandFormat::default(),
        ["Amy", "Bo", "Cy", "Di", "Ed", "Flo"].iter().map(|s| s.to_string()).collect(),
    );
    let mut rng = ProvablyFairRng::new("example-server-seed", "example-client-seed", 1);
    let seconds = SpinnerTimeSelector::start(&SpinnerConfig::default(), &mut rng).run_to_end();
    let schedule = compute_schedule(seconds, 100, 500);

    let mut engine = DrawEngine::new(rng, QuotaPolicy::Advisory);
    engine
        .start(
            &category,
            DrawRequest {
                pick_count: 2,
                mode: TraversalMode::RandomNoRepeat,
                schedule,
            },
        )
        .expect("category has candidates");
    while !engine.tick().expect("spinning").done {}
    let outcome = engine.commit(&mut category, false).expect("within quota");
    println!(
        "server_seed_hash={} duration={:.1}s winners={:?}",
        engine.rng().server_seed_hash_hex(),
        seconds,
        outcome.winners
    );
}
