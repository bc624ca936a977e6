use std::cell::{Cell, RefCell};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use programmer_core::clock::BlockingClock;
use programmer_core::config::ProgrammerConfig;
use programmer_core::cycle::{CycleOutcome, ProgrammingCycle};
use programmer_core::driver::Stusb4500;
use programmer_core::profile::DESIRED_PROFILE;
use programmer_core::reboot::SystemRestart;
use programmer_core::status::{Indicator, SignalState, StatusSignal};
use programmer_core::telemetry::{CycleEvent, CycleObserver};

use crate::chip::{ChipFault, EmulatedStusb4500};

/// Blink periods rendered after a failure before the session stops.
pub const FAILURE_BLINK_PERIODS: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scenario {
    Healthy,
    Absent,
    StuckStore,
    WrongId,
}

impl Scenario {
    pub const ALL: [Self; 4] = [Self::Healthy, Self::Absent, Self::StuckStore, Self::WrongId];

    pub fn tag(self) -> &'static str {
        match self {
            Scenario::Healthy => "healthy",
            Scenario::Absent => "absent",
            Scenario::StuckStore => "stuck-store",
            Scenario::WrongId => "wrong-id",
        }
    }

    pub fn fault(self) -> ChipFault {
        match self {
            Scenario::Healthy => ChipFault::None,
            Scenario::Absent => ChipFault::Absent,
            Scenario::StuckStore => ChipFault::StuckStore,
            Scenario::WrongId => ChipFault::WrongId,
        }
    }

    pub fn header(self) -> String {
        format!("PD programmer emulator, scenario `{}`", self.tag())
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown scenario `{tag}`"))
    }
}

/// How a transcript line should be presented.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Info,
    Warn,
    Error,
    Led(bool),
}

impl Tone {
    fn for_event(event: &CycleEvent) -> Self {
        match event {
            CycleEvent::BringUpFailed(_)
            | CycleEvent::VerificationFailed { .. }
            | CycleEvent::ReadbackUnavailable => Tone::Error,
            other if other.is_fault() => Tone::Warn,
            _ => Tone::Info,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranscriptLine {
    pub at: Duration,
    pub tone: Tone,
    pub text: String,
}

impl TranscriptLine {
    pub fn plain(&self) -> String {
        format!("[+{:>6} ms] EMU < {}", self.at.as_millis(), self.text)
    }
}

/// Everything one emulated boot produced.
#[derive(Debug)]
pub struct CycleReport {
    pub index: usize,
    pub outcome: CycleOutcome,
    pub state: SignalState,
    pub rebooted: bool,
    pub lines: Vec<TranscriptLine>,
}

/// Runs programming cycles against one emulated controller.
///
/// The chip's NVM persists across cycles; its registers are cleared on every
/// emulated reboot, the same way a watchdog reset power-cycles the board.
pub struct Session {
    scenario: Scenario,
    config: ProgrammerConfig,
    chip: EmulatedStusb4500,
    now: Rc<Cell<Duration>>,
    transcript: Option<TranscriptLogger>,
    cycles_run: usize,
}

impl Session {
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            config: ProgrammerConfig::DEFAULT,
            chip: EmulatedStusb4500::new(scenario.fault()),
            now: Rc::new(Cell::new(Duration::ZERO)),
            transcript: None,
            cycles_run: 0,
        }
    }

    /// Mirrors every line into a transcript file at `path`.
    pub fn with_transcript(mut self, path: &Path) -> io::Result<Self> {
        self.transcript = Some(TranscriptLogger::new(path, self.scenario)?);
        Ok(self)
    }

    pub fn chip(&self) -> &EmulatedStusb4500 {
        &self.chip
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }

    /// Runs up to `cycles` boots, stopping at the first one that does not
    /// reboot.
    pub fn run(&mut self, cycles: usize) -> io::Result<Vec<CycleReport>> {
        let mut reports = Vec::with_capacity(cycles);
        for _ in 0..cycles {
            let report = self.run_cycle()?;
            let rebooted = report.rebooted;
            reports.push(report);
            if !rebooted {
                break;
            }
        }
        Ok(reports)
    }

    pub fn run_cycle(&mut self) -> io::Result<CycleReport> {
        self.cycles_run += 1;
        let index = self.cycles_run;
        let lines = Rc::new(RefCell::new(Vec::new()));

        let clock = VirtualClock::new(Rc::clone(&self.now));
        let observer = TranscriptObserver {
            now: Rc::clone(&self.now),
            lines: Rc::clone(&lines),
        };
        let led = ConsoleLed {
            now: Rc::clone(&self.now),
            lines: Rc::clone(&lines),
        };

        let mut cycle = ProgrammingCycle::new(self.config, DESIRED_PROFILE, clock, observer);
        let mut status = StatusSignal::new(led, self.config.signal);

        let driver = Stusb4500::new(&mut self.chip, self.config.bus.address);
        let (outcome, _) = cycle.execute(driver);
        let state = match cycle.signal(&mut status, &outcome) {
            Ok(state) => state,
            Err(rejected) => return Err(io::Error::other(rejected.to_string())),
        };

        let mut restart = HostRestart::default();
        let rebooted = match state {
            SignalState::Success => {
                cycle.reboot(&status, &mut restart).is_ok() && restart.requested
            }
            _ => {
                let (mut clock, _) = cycle.into_parts();
                status.render(&mut clock, FAILURE_BLINK_PERIODS);
                false
            }
        };
        if rebooted {
            self.chip.power_cycle();
        }

        let lines = lines.take();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_cycle(index, &lines)?;
        }

        Ok(CycleReport {
            index,
            outcome,
            state,
            rebooted,
            lines,
        })
    }
}

struct VirtualClock {
    now: Rc<Cell<Duration>>,
}

impl VirtualClock {
    fn new(now: Rc<Cell<Duration>>) -> Self {
        Self { now }
    }
}

impl BlockingClock for VirtualClock {
    fn wait(&mut self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

struct TranscriptObserver {
    now: Rc<Cell<Duration>>,
    lines: Rc<RefCell<Vec<TranscriptLine>>>,
}

impl CycleObserver for TranscriptObserver {
    fn record(&mut self, event: CycleEvent) {
        self.lines.borrow_mut().push(TranscriptLine {
            at: self.now.get(),
            tone: Tone::for_event(&event),
            text: event.to_string(),
        });
    }
}

/// Status LED that logs every level change.
struct ConsoleLed {
    now: Rc<Cell<Duration>>,
    lines: Rc<RefCell<Vec<TranscriptLine>>>,
}

impl Indicator for ConsoleLed {
    fn set_lit(&mut self, lit: bool) {
        self.lines.borrow_mut().push(TranscriptLine {
            at: self.now.get(),
            tone: Tone::Led(lit),
            text: format!("LED {}", if lit { "on" } else { "off" }),
        });
    }
}

#[derive(Default)]
struct HostRestart {
    requested: bool,
}

impl SystemRestart for HostRestart {
    fn restart(&mut self) {
        self.requested = true;
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, scenario: Scenario) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(scenario)?;
        Ok(logger)
    }

    fn write_header(&mut self, scenario: Scenario) -> io::Result<()> {
        writeln!(self.writer, "# {}", scenario.header())?;
        writeln!(
            self.writer,
            "# Timestamps are virtual milliseconds since the first power-on"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_cycle(&mut self, index: usize, lines: &[TranscriptLine]) -> io::Result<()> {
        writeln!(self.writer, "## boot {index}")?;
        for line in lines {
            writeln!(self.writer, "{}", line.plain())?;
        }
        self.writer.flush()
    }
}
