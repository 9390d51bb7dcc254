use std::path::Path;

use clap::{Arg, ArgAction, Command, value_parser};
use log::{debug, error};
use scca::PrefetchFile;
use serde_json::json;

fn main() {
    let matches = Command::new("scca")
        .version("0.1.0")
        .author("k1nd0ne")
        .about("Decode Windows prefetch (.pf) files.")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_parser(value_parser!(String))
                .action(ArgAction::Append)
                .required(true)
                .help("Path to a prefetch file (repeatable)."),
        )
        .arg(
            Arg::new("format")
                .short('o')
                .long("format")
                .value_parser(["table", "csv", "body", "json"])
                .default_value("table")
                .help("Output format."),
        )
        .arg(
            Arg::new("node_index")
                .short('n')
                .long("node-index")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Starting node index used by the csv and body formats."),
        )
        .arg(
            Arg::new("metadata")
                .short('m')
                .long("metadata")
                .action(ArgAction::SetTrue)
                .help("Include filesystem metadata (hashes, stat times) of each file."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
        .get_matches();

    // Initialize logger.
    let log_level_str = matches.get_one::<String>("log_level").unwrap();
    let level_filter = match log_level_str.as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new().filter_level(level_filter).init();

    let files: Vec<&String> = matches.get_many::<String>("file").unwrap().collect();
    let format = matches.get_one::<String>("format").unwrap();
    let node_index = *matches.get_one::<u64>("node_index").unwrap();
    let with_metadata = matches.get_flag("metadata");

    if format == "csv" {
        println!("{}", scca::CSV_FIELDS.join(","));
    }

    // One corrupt file must not abort a batch.
    for (i, file_path) in files.iter().enumerate() {
        let path = Path::new(file_path.as_str());
        let prefetch = match PrefetchFile::from_path(path) {
            Ok(pf) => pf,
            Err(e) => {
                error!("Could not decode '{}': {}", file_path, e);
                continue;
            }
        };
        debug!("Decoded '{}'", file_path);

        let metadata = if with_metadata || format == "body" {
            match prefetch.metadata(path) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    error!("Could not stat '{}': {}", file_path, e);
                    None
                }
            }
        } else {
            None
        };

        let nodeidx = node_index + i as u64;
        match format.as_str() {
            "csv" => println!("{}", prefetch.csv_record(nodeidx).join(",")),
            "body" => {
                for row in prefetch.body_records(nodeidx, metadata.as_ref()) {
                    println!("{}", row);
                }
            }
            "json" => {
                let mut value = prefetch.to_json();
                if let Some(meta) = &metadata {
                    value["metadata"] = meta.to_json();
                }
                let doc = json!({ "file": file_path, "prefetch": value });
                match serde_json::to_string_pretty(&doc) {
                    Ok(s) => println!("{}", s),
                    Err(e) => error!("Error serializing '{}' to JSON: {}", file_path, e),
                }
            }
            _ => {
                println!("{}", prefetch.to_string());
                if let Some(meta) = &metadata {
                    match serde_json::to_string_pretty(&meta.to_json()) {
                        Ok(s) => println!("{}", s),
                        Err(e) => error!("Error serializing metadata: {}", e),
                    }
                }
            }
        }
    }
}
