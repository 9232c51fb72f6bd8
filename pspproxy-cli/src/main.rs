// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal code-module runner: load a flat binary onto a PSP stub and run
//! it, printing whatever it returns.
//!
//! `clap` parses arguments into a typed `Args`, `anyhow` carries context
//! through the connect/load/run pipeline, and `env_logger` wires up
//! `RUST_LOG`-controlled logging at startup.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pspproxy::{ProxyContext, StdIoSink};

/// Upload and run a code module on a PSP stub.
#[derive(Debug, Parser)]
#[clap(max_term_width = 100, about = "Load and execute a PSP code module")]
struct Args {
    /// Device URI, e.g. tcp://localhost:4455, serial:///dev/ttyUSB0:115200:8:n:1
    #[clap(short, long)]
    device: String,

    /// Flat binary to upload as buffer 0 and execute
    module: PathBuf,

    /// Milliseconds to wait for the stub's beacon and connect response
    #[clap(long, default_value_t = 5_000)]
    connect_timeout_ms: u32,

    /// Milliseconds to wait for the code module to finish running
    #[clap(long, default_value_t = u32::MAX)]
    exec_timeout_ms: u32,

    /// The four 32-bit argument registers passed to the module's entry point
    #[clap(long, num_args = 4, default_values_t = [0u32; 4])]
    arg: Vec<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let module = fs::read(&args.module).with_context(|| format!("reading {}", args.module.display()))?;

    let mut ctx = ProxyContext::new(&args.device, Box::new(StdIoSink::new()), args.connect_timeout_ms)
        .with_context(|| format!("connecting to {}", args.device))?;

    ctx.code_mod_load(&module, args.connect_timeout_ms).context("uploading code module")?;

    let module_args: [u32; 4] = args.arg.try_into().expect("clap enforces exactly 4 values");
    let ret = ctx.code_mod_exec(module_args, args.exec_timeout_ms).context("running code module")?;
    println!("code module returned {ret:#x}");

    ctx.destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn well_formed_arguments_parse() {
        let args = Args::try_parse_from(["pspproxy-cli", "--device", "tcp://host:1234", "module.bin"]).unwrap();
        assert_eq!(args.device, "tcp://host:1234");
        assert_eq!(args.module, PathBuf::from("module.bin"));
        assert_eq!(args.connect_timeout_ms, 5_000);
        assert_eq!(args.exec_timeout_ms, u32::MAX);
        assert_eq!(args.arg, vec![0, 0, 0, 0]);
    }

    #[test]
    fn missing_module_path_is_a_usage_error_not_a_panic() {
        let err = Args::try_parse_from(["pspproxy-cli", "--device", "tcp://host:1234"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn cli_definition_is_internally_consistent() {
        Args::command().debug_assert();
    }
}
