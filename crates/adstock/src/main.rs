//! Adstock.
//!
//! Adstock keeps a small stock of pre-fetched ad inventory per placement kind, so that an ad
//! can be shown the moment it is needed. This binary runs the caches against a synthetic
//! provider, which is useful to tune capacities, TTLs and timeouts before wiring up a real
//! ad SDK.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod logging;
mod simulate;
mod synthetic;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
