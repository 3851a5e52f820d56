// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Log output for the command-line tool.
//!
//! The library itself only speaks to the `log` facade; this installs a
//! `tracing-subscriber` formatter, which picks `log` records up through
//! its bridge.

use tracing_subscriber::EnvFilter;

/// With `debug` the filter comes from `RUST_LOG`, falling back to
/// `debug`.  Without it the level is `info` whatever the environment
/// says.  Calling this twice is harmless.
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_harmless() {
        super::init(false);
        super::init(true);
        log::info!("still logging");
    }
}
