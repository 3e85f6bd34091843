//! Downloads, verifies, and caches the configured `mongod`, then prints the
//! path of the cached binary.
//!
//! The server is **not** started. Configuration comes from `MEMONGO_*`
//! environment variables or the matching CLI flags parsed by
//! [`OrthoConfig`](https://github.com/leynos/ortho-config). The binary exits
//! with status code `0` on success and `1` on error.

use std::io::Write as _;

use color_eyre::eyre::eyre;
use mongo_embed_ephemeral::MongoEnvCfg;

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let cfg = MongoEnvCfg::load_from_args(std::env::args_os()).map_err(|err| eyre!(err))?;
    let level = cfg.log_level().map_err(|err| eyre!(err))?;
    tracing_subscriber::fmt()
        .with_max_level(level.filter())
        .with_writer(std::io::stderr)
        .init();

    let path = mongo_embed_ephemeral::run(&cfg).map_err(|err| eyre!(err))?;
    writeln!(std::io::stdout(), "{path}")?;
    Ok(())
}
