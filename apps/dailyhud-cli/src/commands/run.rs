//! The default command: run the selected checks and print the report

use std::io::IsTerminal;

use dailyhud_checks::{display_order, parse_check_list, resolve_run_set, CheckKind};
use dailyhud_core::{CacheStore, Config, HudError, ProbeContext};
use dailyhud_engine::{
    format_json, format_text, overall_exit_code, CheckRunner, RunnerConfig, TextOptions, WorkUnit,
};
use dailyhud_secrets::resolve_secrets;
use tracing::info;

pub struct RunArgs {
    pub config: String,
    pub only: Option<String>,
    pub verbose: bool,
    pub json: bool,
    pub no_cache: bool,
    pub no_color: bool,
}

/// Returns the process exit code derived from the worst result
pub fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = Config::load(&args.config)?;
    let secrets = resolve_secrets(&config.secrets);

    let explicit = args.only.as_deref().map(parse_check_list);
    let run_set = resolve_run_set(explicit.as_deref(), &config, &secrets)?;

    let cache = CacheStore::from_config(&config.cache, args.no_cache);
    let runner_config = RunnerConfig::from_check_timeout(config.thresholds.check_timeout());
    let ctx = ProbeContext::new(config, secrets, cache);

    let units = run_set
        .iter()
        .map(|kind| WorkUnit::new(kind.id(), kind.section()))
        .collect();

    let run = CheckRunner::new()
        .with_config(runner_config)
        .run(units, move |id| {
            let kind: CheckKind = id.parse().map_err(HudError::Other)?;
            kind.probe().run(&ctx)
        });
    info!("Run finished in {:.1}s", run.elapsed().as_secs_f64());

    let order = display_order();
    if args.json {
        println!("{}", format_json(&run, &order, true)?);
    } else {
        let opts = TextOptions {
            color: !args.no_color && std::io::stdout().is_terminal(),
            verbose: args.verbose,
        };
        print!("{}", format_text(&run, &order, opts));
    }

    Ok(overall_exit_code(&run))
}
