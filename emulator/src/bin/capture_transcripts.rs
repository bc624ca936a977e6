use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../chip.rs"]
mod chip;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Scenario, Session};

const TRANSCRIPT_DIR: &str = "transcripts";
const CYCLES_PER_SCENARIO: usize = 2;

fn main() -> io::Result<()> {
    for scenario in Scenario::ALL {
        record_scenario(scenario)?;
    }
    Ok(())
}

fn record_scenario(scenario: Scenario) -> io::Result<()> {
    let path = Path::new(TRANSCRIPT_DIR).join(format!("{}.log", scenario.tag()));
    let mut session = Session::new(scenario).with_transcript(&path)?;
    let reports = session.run(CYCLES_PER_SCENARIO)?;
    println!(
        "{}: {} boot(s), final state {}",
        path.display(),
        reports.len(),
        reports
            .last()
            .map_or_else(|| "none".to_string(), |report| report.state.to_string())
    );
    Ok(())
}
