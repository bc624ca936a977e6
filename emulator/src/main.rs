mod chip;
mod session;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use session::{CycleReport, Scenario, Session, Tone, TranscriptLine};

const DEFAULT_CYCLES: usize = 2;
const USAGE: &str = "Usage: programmer-emulator [--scenario <healthy|absent|stuck-store|wrong-id>] \
[--cycles <n>] [--transcript <path>] [--no-color] | programmer-emulator <scenario>";

struct Options {
    scenario: Scenario,
    cycles: usize,
    transcript: Option<PathBuf>,
    color: bool,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = Session::new(options.scenario);
    if let Some(path) = &options.transcript {
        session = session.with_transcript(path)?;
    }

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    writeln!(writer, "{}", options.scenario.header())?;

    let reports = session.run(options.cycles)?;
    for report in &reports {
        write_report(&mut writer, report, options.color)?;
    }

    let last_failed = reports.last().is_some_and(|report| report.outcome.is_err());
    let chip = session.chip();
    writeln!(
        writer,
        "{} boot(s), {} ms of virtual time, {} sector write(s), {} soft reset(s), stored PDO count {}",
        reports.len(),
        session.elapsed().as_millis(),
        chip.nvm_writes(),
        chip.soft_resets(),
        chip.nvm().pdo_count()
    )?;
    if last_failed {
        process::exit(1);
    }
    Ok(())
}

fn write_report(writer: &mut impl Write, report: &CycleReport, color: bool) -> io::Result<()> {
    writeln!(writer, "-- boot {} --", report.index)?;
    for line in &report.lines {
        if color {
            writeln!(writer, "{}", styled(line))?;
        } else {
            writeln!(writer, "{}", line.plain())?;
        }
    }
    match &report.outcome {
        Ok(_) => writeln!(writer, "result: {} (rebooted: {})", report.state, report.rebooted),
        Err(error) => writeln!(writer, "result: {} ({error})", report.state),
    }
}

fn styled(line: &TranscriptLine) -> String {
    let stamp = format!("[+{:>6} ms]", line.at.as_millis()).dark_grey();
    let text = line.text.as_str();
    match line.tone {
        Tone::Info => format!("{stamp} {text}"),
        Tone::Warn => format!("{stamp} {}", text.yellow()),
        Tone::Error => format!("{stamp} {}", text.red().bold()),
        Tone::Led(true) => format!("{stamp} {} {text}", "●".green()),
        Tone::Led(false) => format!("{stamp} {} {text}", "○".dark_grey()),
    }
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        scenario: Scenario::Healthy,
        cycles: DEFAULT_CYCLES,
        transcript: None,
        color: true,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--scenario=") {
            options.scenario = Scenario::from_tag(value)?;
        } else if arg == "--scenario" {
            let value = args.next().ok_or("Expected value after --scenario")?;
            options.scenario = Scenario::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--cycles=") {
            options.cycles = parse_cycles(value)?;
        } else if arg == "--cycles" {
            let value = args.next().ok_or("Expected value after --cycles")?;
            options.cycles = parse_cycles(&value)?;
        } else if arg == "--transcript" {
            let value = args.next().ok_or("Expected value after --transcript")?;
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--no-color" {
            options.color = false;
        } else if arg.starts_with("--") {
            return Err(format!("Unknown option `{arg}`"));
        } else {
            options.scenario = Scenario::from_tag(&arg)?;
        }
    }
    Ok(options)
}

fn parse_cycles(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("Invalid cycle count `{value}`")),
        Ok(cycles) => Ok(cycles),
    }
}
