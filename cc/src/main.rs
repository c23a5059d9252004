#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Connected components driver.
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
use gasmat::UNTIL_CONVERGENCE;

fn main() {
    env_logger::init();

    let matches = App::new("cc")
        .version("0.1.0")
        .about("Identify the connected components in an undirected graph")
        .arg(
            Arg::with_name("filepath")
                .required(true)
                .index(1)
                .help("Binary triples input file"),
        )
        .arg(
            Arg::with_name("nvertices")
                .required(true)
                .index(2)
                .help("Number of vertices; 0 if a header is present"),
        )
        .arg(
            Arg::with_name("iterations")
                .short("i")
                .long("iterations")
                .takes_value(true)
                .help("Iteration cap (default: until convergence)"),
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
    let max_iters: u32 = matches
        .value_of("iterations")
        .map(|v| v.parse().expect("iterations: not an integer"))
        .unwrap_or(UNTIL_CONVERGENCE);
    let nranks: usize = matches
        .value_of("nranks")
        .unwrap_or("1")
        .parse()
        .expect("nranks: not an integer");

    let now: DateTime<Local> = Local::now();
    println!("Running cc on {} using {} ranks at {}", filepath, nranks, now);

    Runtime::launch(nranks, move |env| {
        if let Err(e) = cc::run(&env, &filepath, nvertices, max_iters, None) {
            eprintln!("cc failed: {:#}", e);
            std::process::exit(1);
        }
    });
}
