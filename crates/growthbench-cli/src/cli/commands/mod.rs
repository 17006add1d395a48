use super::args::*;
use std::path::Path;

pub mod analyze;
pub mod run;
pub mod validate;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_DEGRADED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const CONNECTION_ERROR: i32 = 3;
    pub const INTERRUPTED: i32 = 130;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Validate(args) => validate::run(args),
        Command::Init(args) => cmd_init(args),
        Command::Analyze(args) => analyze::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.catalog.exists() {
        eprintln!("note: {} already exists (skipped)", args.catalog.display());
        return Ok(exit_codes::OK);
    }
    ensure_parent_dir(&args.catalog)?;
    growthbench_core::catalog::write_sample_catalog(&args.catalog)?;
    eprintln!("created {}", args.catalog.display());
    Ok(exit_codes::OK)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
