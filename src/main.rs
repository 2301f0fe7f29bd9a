use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::thread;
use structopt::StructOpt;

use lazyk::{parse, run, Program, DEFAULT_HEAP_NODES};

macro_rules! error {
    ($fmt:tt $($arg:tt)*) => {{
        eprintln!(concat!("error: ", $fmt) $($arg)*);
        process::exit(1)
    }};
}

#[derive(StructOpt)]
#[structopt(name = "lazyk")]
struct Opt {
    #[structopt(short = "b", help = "Accepted for compatibility; streams are always binary")]
    binary: bool,
    #[structopt(
        short = "e",
        number_of_values = 1,
        value_name = "program",
        help = "Take program code from the command line"
    )]
    exprs: Vec<String>,
    #[structopt(
        long,
        short = "s",
        value_name = "bytes",
        help = "Specify the stack size"
    )]
    stack_size: Option<usize>,
    #[structopt(
        long,
        value_name = "nodes",
        help = "Arena capacity per semispace, in nodes"
    )]
    heap_size: Option<usize>,
    #[structopt(
        value_name = "program-file",
        help = "Files containing program code; - reads from standard input"
    )]
    files: Vec<PathBuf>,
}

enum Source {
    Inline(String),
    File(PathBuf),
}

impl Source {
    // Fragments compose in argument order, so the display name and the
    // text are resolved together, before evaluation starts.
    fn load(self) -> (String, String) {
        match self {
            Source::Inline(text) => ("command line".to_owned(), text),
            Source::File(path) => {
                if path.as_os_str() == "-" {
                    let mut text = String::new();
                    if let Err(err) = io::stdin().read_to_string(&mut text) {
                        error!("{}", err);
                    }
                    ("\"(standard input)\"".to_owned(), text)
                } else {
                    match fs::read_to_string(&path) {
                        Ok(text) => (format!("\"{}\"", path.display()), text),
                        Err(_) => {
                            eprintln!("Unable to open the file \"{}\".", path.display());
                            process::exit(1)
                        }
                    }
                }
            }
        }
    }
}

fn main() {
    let matches = Opt::clap().get_matches();
    let opt = Opt::from_clap(&matches);
    let _ = opt.binary;

    let mut sources = Vec::new();
    if let Some(indices) = matches.indices_of("exprs") {
        for (index, text) in indices.zip(&opt.exprs) {
            sources.push((index, Source::Inline(text.clone())));
        }
    }
    if let Some(indices) = matches.indices_of("files") {
        for (index, path) in indices.zip(&opt.files) {
            sources.push((index, Source::File(path.clone())));
        }
    }
    sources.sort_by_key(|&(index, _)| index);

    let fragments: Vec<(String, String)> = sources
        .into_iter()
        .map(|(_, source)| source.load())
        .collect();
    let heap_nodes = opt.heap_size.unwrap_or(DEFAULT_HEAP_NODES);

    let result = {
        let mut builder = thread::Builder::new().name("runtime".to_owned());
        if let Some(stack_size) = opt.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder
            .spawn(move || {
                let mut program: Option<Program> = None;
                for (name, text) in &fragments {
                    match parse(text) {
                        Ok(fragment) => {
                            program = Some(match program.take() {
                                Some(acc) => acc.pipe(fragment),
                                None => fragment,
                            });
                        }
                        Err(err) => {
                            eprintln!("{}", err.report(name));
                            process::exit(1)
                        }
                    }
                }

                let stdin = io::stdin();
                let stdout = io::stdout();
                let reader = Box::new(stdin);
                let writer = stdout.lock();
                run(reader, writer, program.unwrap_or_default(), heap_nodes)
            })
            .unwrap_or_else(|err| error!("{}", err))
            .join()
            .unwrap()
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(err.exit_code());
        }
    }
}
