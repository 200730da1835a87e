use std::sync::Arc;
use std::time::SystemTime;

use arrrg::CommandLine;
use indicio::stdio::StdioEmitter;
use indicio::INFO;

use rwpolicy::workload::{Workload, WorkloadOptions};

const USAGE: &str = "Usage: rwpolicy-bench [--verbose] [--biometrics] [--workload-OPTION VALUE]";

////////////////////////////////////////////// Options /////////////////////////////////////////////

#[derive(Clone, Debug, Default, Eq, PartialEq, arrrg_derive::CommandLine)]
struct BenchOptions {
    #[arrrg(flag, "Emit clues to stderr.")]
    verbose: bool,
    #[arrrg(flag, "Print biometrics to stdout when finished.")]
    biometrics: bool,
    #[arrrg(nested)]
    workload: WorkloadOptions,
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
    let (options, free) = BenchOptions::from_command_line_relaxed(USAGE);
    if !free.is_empty() {
        eprintln!("command takes no positional arguments");
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    if options.verbose {
        rwpolicy::COLLECTOR.register(Arc::new(StdioEmitter));
        rwpolicy::COLLECTOR.set_verbosity(INFO);
    }
    let workload = match Workload::new(options.workload.clone()) {
        Ok(workload) => workload,
        Err(err) => {
            eprintln!("invalid workload: {}", err);
            std::process::exit(1);
        }
    };
    workload.populate();
    let report = match workload.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("workload failed: {}", err);
            std::process::exit(1);
        }
    };
    println!("{}", report);
    if options.biometrics {
        emit_biometrics();
    }
}
