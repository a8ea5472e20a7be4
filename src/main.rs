//! dusklight daemon entry point. Takes no arguments.

use dusklight::Dusklight;
use dusklight::common::constants::EXIT_FAILURE;
use dusklight::common::logger::Log;
use dusklight::{log_end, log_error_exit};

fn main() {
    if let Err(e) = Dusklight::new().run() {
        let log = Log::stdout(false);
        log_error_exit!(log, "{e:#}");
        log_end!(log);
        std::process::exit(EXIT_FAILURE);
    }
}
