#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! SSSP application driver.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use chrono::{DateTime, Local};
use clap::{App, Arg};
use courier::Runtime;

fn main() {
    env_logger::init();

    let matches = App::new("sssp")
        .version("0.1.0")
        .about("Single-source shortest paths on a weighted directed graph")
        .arg(
            Arg::with_name("filepath")
                .required(true)
                .index(1)
                .help("Binary triples input file (u32 weights)"),
        )
        .arg(
            Arg::with_name("nvertices")
                .required(true)
                .index(2)
                .help("Number of vertices; 0 if a header is present"),
        )
        .arg(
            Arg::with_name("root")
                .required(true)
                .index(3)
                .help("Source vertex id"),
        )
        .arg(
            Arg::with_name("nranks")
                .short("n")
                .long("nranks")
                .takes_value(true)
                .help("Number of ranks to launch in-process"),
        )
        .get_matches();

    let filepath = matches.value_of("filepath").unwrap().to_string();
    let nvertices: u32 = matches
        .value_of("nvertices")
        .unwrap()
        .parse()
        .expect("nvertices: not an integer");
    let root: u32 = matches
        .value_of("root")
        .unwrap()
        .parse()
        .expect("root: not an integer");
    let nranks: usize = matches
        .value_of("nranks")
        .unwrap_or("1")
        .parse()
        .expect("nranks: not an integer");

    let now: DateTime<Local> = Local::now();
    println!(
        "Running sssp on {} from root {} using {} ranks at {}",
        filepath, root, nranks, now
    );

    Runtime::launch(nranks, move |env| {
        if let Err(e) = sssp::run(&env, &filepath, nvertices, root) {
            eprintln!("sssp failed: {:#}", e);
            std::process::exit(1);
        }
    });
}
