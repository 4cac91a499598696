use airpods_listener::app::{self, Options, RunError};
use airpods_listener::scanner::{self, lifecycle::AirPodsScanner};
use clap::Parser;
use log::LevelFilter;
use std::io::Write;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

async fn run(options: Options) -> Result<(), RunError> {
    let watcher = scanner::create_watcher(options.backend)?;
    let scanner = AirPodsScanner::new(watcher);

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    app::run_with_io(options, &scanner, &mut out, &mut err).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for callers that
    // consume the report programmatically
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    // RUST_LOG overrides the verbosity flag
    pretty_env_logger::formatted_builder()
        .filter_level(if options.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    match run(options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            let _ = writeln!(std::io::stderr(), "error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
