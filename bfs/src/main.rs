#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! BFS application driver.
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

    let matches = App::new("bfs")
        .version("0.1.0")
        .about("Breadth-first search from a root vertex")
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
            Arg::with_name("root")
                .required(true)
                .index(3)
                .help("Root vertex id"),
        )
        .arg(
            Arg::with_name("reverse")
                .short("r")
                .long("reverse")
                .takes_value(false)
                .help("Walk the edges backwards"),
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
    let reverse = matches.is_present("reverse");
    let nranks: usize = matches
        .value_of("nranks")
        .unwrap_or("1")
        .parse()
        .expect("nranks: not an integer");

    let now: DateTime<Local> = Local::now();
    println!(
        "Running bfs on {} from root {} using {} ranks at {}",
        filepath, root, nranks, now
    );

    Runtime::launch(nranks, move |env| {
        if let Err(e) = bfs::run(&env, &filepath, nvertices, root, reverse) {
            eprintln!("bfs failed: {:#}", e);
            std::process::exit(1);
        }
    });
}
