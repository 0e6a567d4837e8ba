use std::fs;
use std::io;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use kway_sort::sort::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_OPEN_RUNS, DEFAULT_MEMORY_BUDGET, DEFAULT_RECORD_SIZE};
use kway_sort::{ExternalSorter, ExternalSorterBuilder, LineRecords};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let memory = parse_size(&arg_parser, "memory");
    let block_size = parse_size(&arg_parser, "block_size");
    let record_size = parse_size(&arg_parser, "record_size");
    let max_open_runs: usize = arg_parser.value_of_t_or_exit("max_open_runs");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_memory_budget(memory)
        .with_block_size(block_size as usize)
        .with_record_size(record_size)
        .with_max_open_runs(max_open_runs);

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: ExternalSorter<i64> = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let summary = match sorter.sort(LineRecords::new(input_stream), path::Path::new(output)) {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    log::info!(
        "{} records sorted into {} ({} runs, {} merge passes, {} merges)",
        summary.records,
        output,
        summary.runs,
        summary.passes,
        summary.merges
    );
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn parse_size(arg_parser: &clap::ArgMatches, name: &str) -> u64 {
    arg_parser
        .value_of(name)
        .expect("value has a default")
        .parse::<ByteSize>()
        .expect("value is pre-validated")
        .as_u64()
}

fn validate_size(value: &str) -> Result<(), String> {
    match value.parse::<ByteSize>() {
        Ok(_) => Ok(()),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    let default_memory = DEFAULT_MEMORY_BUDGET.to_string();
    let default_block_size = DEFAULT_BLOCK_SIZE.to_string();
    let default_record_size = DEFAULT_RECORD_SIZE.to_string();
    let default_max_open_runs = DEFAULT_MAX_OPEN_RUNS.to_string();

    clap::App::new("kway-sort")
        .about("external k-way merge sorter of integers, one per line")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("memory")
                .short('m')
                .long("memory")
                .help("working memory budget")
                .takes_value(true)
                .default_value(&default_memory)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("block_size")
                .short('b')
                .long("block-size")
                .help("run read block size")
                .takes_value(true)
                .default_value(&default_block_size)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("record_size")
                .short('r')
                .long("record-size")
                .help("accounted size of a single record")
                .takes_value(true)
                .default_value(&default_record_size)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("max_open_runs")
                .short('k')
                .long("max-open-runs")
                .help("maximum number of runs merged at once")
                .takes_value(true)
                .default_value(&default_max_open_runs),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel run sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
