/*
MIT License

Copyright (c) 2021 Philipp Schuster

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/
use ova_extract::{extract_with, ExtractObserver, ExtractOptions, FailurePolicy, Member};

/// Prints every member as soon as it is extracted.
struct Printer;

impl ExtractObserver for Printer {
    fn on_member(&mut self, member: &Member) {
        println!("{:>12}  {}", member.size(), member.name());
    }
}

/// Lists the files of an `.ova` (or any uncompressed `.tar`) file.
///
/// Usage: `cargo run --example list_members -- appliance.ova [--lenient]`
fn main() {
    // log: not mandatory
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: list_members <file.ova> [--lenient]");
        std::process::exit(2);
    };
    let mut options = ExtractOptions::new();
    if args.any(|arg| arg == "--lenient") {
        options = options.with_failure_policy(FailurePolicy::Lenient);
    }

    // reading the file is the caller's business, the library only sees bytes
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            log::error!("Can't read {path}: {e}");
            std::process::exit(1);
        }
    };

    let extraction = extract_with(&data, &options, &mut Printer);
    for error in &extraction.errors {
        log::warn!("{error}");
    }
    log::info!(
        "{} members, outcome {:?}",
        extraction.members.len(),
        extraction.outcome
    );
    if extraction.fatal_error().is_some() {
        std::process::exit(1);
    }
}
