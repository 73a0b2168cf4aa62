//! Binary entrypoint for the crop scan chat client.

use std::process::ExitCode;

use cropscan_chat::start_chat;

/// Send one message (or manage history) and exit.
fn main() -> ExitCode {
    start_chat::run()
}
