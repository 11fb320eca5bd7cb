mod outcome;

use clap::{Arg, ArgAction, Command};
use jverify::jvm::assembly::parse_assembly;
use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jverify::jvm::model::Method;
use jverify::jvm::verifier::{verify_method, Settings, Subroutines};
use jverify::jvm::Name;
use outcome::Outcome;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::{fs, io};
use termcolor::{ColorChoice, StandardStream};
use walkdir::WalkDir;

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = Command::new("JVM bytecode verifier")
        .version(clap::crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Check that the methods in JVM assembly files are well-typed")
        .arg(
            Arg::new("method")
                .long("method")
                .value_name("NAME")
                .required(false)
                .help("Only verify methods with this name (eg. `next` or `me/alec/Counter.next`)"),
        )
        .arg(
            Arg::new("subroutines")
                .long("subroutines")
                .action(ArgAction::SetTrue)
                .help("Print out the subroutines found in each method"),
        )
        .arg(
            Arg::new("no-return-heuristic")
                .long("no-return-heuristic")
                .action(ArgAction::SetTrue)
                .help("Don't double-check returned types against the instruction before the return"),
        )
        .arg(
            Arg::new("no-uninitialized-warnings")
                .long("no-uninitialized-warnings")
                .action(ArgAction::SetTrue)
                .help("Don't warn about uninitialized objects left around when returning"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input `.jasm` file or folder")
                .required(true)
                .index(1),
        )
        .get_matches();

    let input_path = match matches.get_one::<String>("INPUT") {
        Some(input) => PathBuf::from(input),
        None => unreachable!("INPUT is required"),
    };
    let method_filter = matches.get_one::<String>("method").cloned();
    let print_subroutines = matches.get_flag("subroutines");
    let settings = Settings {
        check_returned_type: !matches.get_flag("no-return-heuristic"),
        warn_uninitialized_on_return: !matches.get_flag("no-uninitialized-warnings"),
    };

    // Find all of the assembly files
    let inputs: Vec<PathBuf> = if input_path.is_file() {
        vec![input_path]
    } else {
        WalkDir::new(input_path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "jasm"))
            .collect()
    };

    let mut count_ok = 0;
    let mut count_not_yet = 0;
    let mut count_failed = 0;
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    for input in inputs {
        log::info!("Reading '{}'", input.display());
        let outcomes = verify_file(&input, method_filter.as_deref(), &settings, print_subroutines);

        for (subject, outcome) in outcomes {
            if outcome.is_failure() {
                count_failed += 1;
            } else if let Outcome::NotYet(_) = outcome {
                count_not_yet += 1;
            } else {
                count_ok += 1;
            }

            outcome.write_line(&mut stdout.lock(), &subject)?;
        }
    }

    log::info!(
        "{} passed, {} not yet verifiable, {} failed",
        count_ok,
        count_not_yet,
        count_failed
    );

    // Exit code
    exit(if count_failed > 0 { 1 } else { 0 })
}

/// Verify the matching methods of one assembly file
///
/// Each file gets its own class graph, so files can't refer to each other's classes.
fn verify_file(
    path: &Path,
    method_filter: Option<&str>,
    settings: &Settings,
    print_subroutines: bool,
) -> Vec<(String, Outcome)> {
    let subject = path.to_string_lossy().into_owned();
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => return vec![(subject, Outcome::Error(format!("IO - {}", err)))],
    };

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_java_library_types();

    let methods = match parse_assembly(&source, &class_graph) {
        Ok(methods) => methods,
        Err(err) => return vec![(subject, Outcome::from(err))],
    };

    methods
        .iter()
        .filter(|method| method_filter.map_or(true, |filter| matches_filter(method, filter)))
        .map(|method| {
            let qualified_name = method.qualified_name();
            if print_subroutines {
                print_method_subroutines(&qualified_name, method);
            }
            let outcome = verify_method(&class_graph, method, settings)
                .map_or_else(Outcome::from, Outcome::from);
            (format!("{}:{}", subject, qualified_name), outcome)
        })
        .collect()
}

fn matches_filter(method: &Method, filter: &str) -> bool {
    let qualified = format!("{}.{}", method.id.class.name.as_str(), method.id.name.as_str());
    method.id.name.as_str() == filter || qualified == filter
}

fn print_method_subroutines(qualified_name: &str, method: &Method) {
    let code = match &method.code_impl {
        Some(code) => code,
        None => return,
    };
    match Subroutines::new(code) {
        Ok(subroutines) => println!("{}\n{}", qualified_name, subroutines),
        Err(err) => log::error!("Cannot find subroutines of {}: {}", qualified_name, err),
    }
}
