use std::sync::Arc;
use std::time::SystemTime;

use arrrg::CommandLine;
use indicio::stdio::StdioEmitter;
use indicio::INFO;

use rwpolicy::starvation::{Starvation, StarvationOptions};

const USAGE: &str =
    "Usage: rwpolicy-starvation [--verbose] [--biometrics] [--starvation-OPTION VALUE]";

////////////////////////////////////////////// Options /////////////////////////////////////////////

#[derive(Clone, Debug, Default, Eq, PartialEq, arrrg_derive::CommandLine)]
struct StarvationCommandLine {
    #[arrrg(flag, "Emit clues to stderr.")]
    verbose: bool,
    #[arrrg(flag, "Print biometrics to stdout when finished.")]
    biometrics: bool,
    #[arrrg(nested)]
    starvation: StarvationOptions,
}

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

fn emit_biometrics() {
    let collector = biometrics::Collector::new();
    rwpolicy::register_biometrics(&collector);
    let fout = match std::fs::File::create("/dev/stdout") {
        Ok(fout) => fout,
        Err(err) => {
            eprintln!("could not open stdout: {}", err);
            return;
        }
    };
    let mut emit = biometrics::PlainTextEmitter::new(fout);
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    if let Err(err) = collector.emit(&mut emit, now) {
        eprintln!("collector error: {}", err);
    }
}

/////////////////////////////////////////////// main ///////////////////////////////////////////////

fn main() {
    let (options, free) = StarvationCommandLine::from_command_line_relaxed(USAGE);
    if !free.is_empty() {
        eprintln!("command takes no positional arguments");
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    if options.verbose {
        rwpolicy::COLLECTOR.register(Arc::new(StdioEmitter));
        rwpolicy::COLLECTOR.set_verbosity(INFO);
    }
    let experiment = match Starvation::new(options.starvation.clone()) {
        Ok(experiment) => experiment,
        Err(err) => {
            eprintln!("invalid experiment: {}", err);
            std::process::exit(1);
        }
    };
    println!(
        "Running {} readers and {} writers for {} iterations each under {} preference",
        options.starvation.readers,
        options.starvation.writers,
        options.starvation.iterations,
        options.starvation.policy,
    );
    let report = match experiment.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("experiment failed: {}", err);
            std::process::exit(1);
        }
    };
    println!("{}", report);
    println!("Final shared value: {}", report.final_value);
    if options.biometrics {
        emit_biometrics();
    }
}
