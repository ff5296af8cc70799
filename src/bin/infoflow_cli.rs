//! Command-line driver: reads a JSON IR module, runs the whole-program
//! analysis, and either reports taint for every tracked value or computes a
//! source/sink slice. Modeled on the teacher's `json_to_constraints`
//! binary — same `clap` positional-argument shape, same `env_logger::init()`
//! at the top of `main`, same `eprintln!`-for-progress/`println!`-for-result
//! split.

use clap::{App, Arg};
use regex::Regex;

use infoflow::api::InfoflowSolution;
use infoflow::config::AnalysisConfig;
use infoflow::context::{ContextId, DEFAULT_CONTEXT};
use infoflow::ir::{Module, ValueId};
use infoflow::providers::{EmptyPointsTo, NoGlobalFlows, NoIndirectCalls, TrivialPostDominators};
use infoflow::slice::{MultiSlice, Slice};
use infoflow::util::FileDebugLogger;
use infoflow::Driver;

/// Parses a `"<ctx>:<value>"` CLI argument into a `(ContextId, ValueId)`
/// pair; a bare `"<value>"` is shorthand for the default context.
fn parse_value_ref(raw: &str) -> anyhow::Result<(ContextId, ValueId)> {
    match raw.split_once(':') {
        Some((ctx, value)) => {
            let ctx: u32 = ctx.parse()?;
            let value: u32 = value.parse()?;
            Ok((ContextId(ctx), ValueId(value)))
        }
        None => {
            let value: u32 = raw.parse()?;
            Ok((DEFAULT_CONTEXT, ValueId(value)))
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("infoflow_cli")
        .arg(Arg::with_name("input_json").required(true).index(1))
        .arg(
            Arg::with_name("debug_dir")
                .long("debug-dir")
                .takes_value(true)
                .help("directory to dump per-unit analysis logs into"),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .takes_value(true)
                .help("worker threads for bulk source slicing"),
        )
        .arg(Arg::with_name("collapse_external").long("collapse-external-context"))
        .arg(Arg::with_name("collapse_indirect").long("collapse-indirect-context"))
        .arg(Arg::with_name("drop_at_sinks").long("drop-at-sinks"))
        .arg(
            Arg::with_name("source")
                .long("source")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("\"[ctx:]value\" to slice forward from; repeatable"),
        )
        .arg(
            Arg::with_name("sink")
                .long("sink")
                .takes_value(true)
                .help("\"[ctx:]value\" to slice backward from"),
        )
        .arg(
            Arg::with_name("filter")
                .long("filter")
                .takes_value(true)
                .help("regex restricting which variables are printed in the whole-program report"),
        )
        .get_matches();

    let input_json = matches.value_of("input_json").unwrap();
    let json_file = std::fs::File::open(input_json)?;
    let module: Module = serde_json::from_reader(json_file)?;
    log::info!("parsed module with {} function(s)", module.functions.len());

    let config = AnalysisConfig {
        collapse_external_context: matches.is_present("collapse_external"),
        collapse_indirect_context: matches.is_present("collapse_indirect"),
        drop_at_sinks: matches.is_present("drop_at_sinks"),
        parallel_workers: matches
            .value_of("workers")
            .map(|w| w.parse())
            .transpose()?
            .unwrap_or_else(|| AnalysisConfig::default().parallel_workers),
    };
    let debug = FileDebugLogger::new(matches.value_of("debug_dir").map(str::to_owned));

    let points_to = EmptyPointsTo;
    let call_graph = NoIndirectCalls;
    let post_dominators = TrivialPostDominators;
    let source_sink = NoGlobalFlows;

    let driver = Driver::new(&module, &points_to, &call_graph, &post_dominators, &source_sink, config, debug);
    let (mut kit, mut pool) = driver.run();
    log::info!(
        "generated {} default-kind constraint(s)",
        kit.store.explicit_count(infoflow::constraints::DEFAULT) + kit.store.implicit_count(infoflow::constraints::DEFAULT)
    );

    let sink = matches.value_of("sink").map(parse_value_ref).transpose()?;
    let sources: Vec<(ContextId, ValueId)> = matches
        .values_of("source")
        .into_iter()
        .flatten()
        .map(parse_value_ref)
        .collect::<anyhow::Result<_>>()?;

    if let Some((sink_ctx, sink_value)) = sink {
        if sources.is_empty() {
            anyhow::bail!("--sink requires at least one --source");
        } else if sources.len() == 1 {
            let (src_ctx, src_value) = sources[0];
            let slice = Slice::compute(&mut kit, &mut pool, src_ctx, src_value, sink_ctx, sink_value);
            println!("reaches: {}", slice.reaches(&kit));
        } else {
            let workers = config.parallel_workers;
            let multi = MultiSlice::compute(&mut kit, &mut pool, sink_ctx, sink_value, &sources, workers);
            for (i, (ctx, value)) in sources.iter().enumerate() {
                println!("source {:?}:{:?} reaches: {}", ctx, value, multi.reaches(&kit, i));
            }
        }
        return Ok(());
    }

    let solution = InfoflowSolution::solve(&mut kit);
    let filter = matches.value_of("filter").map(Regex::new).transpose()?;

    for id in kit.vars.ids() {
        let description = kit.vars.description(id).to_owned();
        if let Some(re) = &filter {
            if !re.is_match(&description) {
                continue;
            }
        }
        let var = infoflow::lattice::Element::Var(id);
        let tainted = solution.least().is_tainted(&var, &kit);
        let could_be = solution.greatest().is_tainted(&var, &kit);
        println!("{}: tainted={} could_be_tainted={}", description, tainted, could_be);
    }

    Ok(())
}
