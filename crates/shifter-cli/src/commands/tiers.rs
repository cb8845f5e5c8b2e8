use anyhow::Result;

use shifter_core::config::ShifterConfig;

pub fn run(config: &ShifterConfig) -> Result<()> {
    let table = config.progression.table();

    println!("{:>10}  {:>5}  title", "min score", "level");
    for tier in table.tiers() {
        println!("{:>10}  {:>5}  {}", tier.min_score, tier.level, tier.title);
    }
    Ok(())
}
