//! Command-line driver for the glaze interpreter.

use std::{
    env, fs,
    io::Read,
    path::{Path, PathBuf},
    process::ExitCode,
};

use glaze::{EvalConfig, ExtVar, FileResolver, Runner};

const VERSION: &str = concat!("glaze v", env!("CARGO_PKG_VERSION"));

fn usage() -> String {
    let mut o = String::new();
    o.push_str(&format!("{VERSION}\n"));
    o.push_str("usage: glaze [<options>] <filename>\n");
    o.push_str("Available options:\n");
    o.push_str("  -h / --help               This message\n");
    o.push_str("  -e / --exec               Treat filename as code\n");
    o.push_str("  -J / --jpath <dir>        Specify an additional library search dir\n");
    o.push_str("  -V / --var <var>=<val>    Specify an 'external' var to the given value\n");
    o.push_str("  -E / --env <var>          Bring in an environment var as an 'external' var\n");
    o.push_str("  --code-var <var>=<code>   As -V but the value is code\n");
    o.push_str("  --code-env <var>          As -E but the value is code\n");
    o.push_str("  --code-file <var>=<file>  As --code-var but the code is read from a file\n");
    o.push_str("  -m / --multi <dir>        Write multiple files to the dir, list files on stdout\n");
    o.push_str("  -y / --yaml-stream        Write output as a stream of JSON documents\n");
    o.push_str("  -S / --string             Expect a string, manifest as plain text\n");
    o.push_str("  -s / --max-stack <n>      Number of allowed stack frames\n");
    o.push_str("  -t / --max-trace <n>      Max length of stack trace before cropping\n");
    o.push_str("  --gc-min-objects <n>      Do not run garbage collector until this many\n");
    o.push_str("  --gc-growth-trigger <n>   Run garbage collector after this amount of growth\n");
    o.push_str("  -o / --output-file <file> Write to the output file rather than stdout\n");
    o.push_str("  --version                 Print version\n");
    o.push_str("\nThe -- option suppresses option processing for subsequent arguments.\n");
    o.push_str("Note that since filenames and snippets can begin with -, it is advisable to\n");
    o.push_str("use -- with -e if the program is unknown, e.g. glaze -e -- \"$CODE\".\n");
    o
}

/// Collects command-line args, expanding `-abc` to `-a -b -c`. Everything
/// after `--` passes through untouched.
fn simplify_args(args: impl Iterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut raw = false;
    for arg in args {
        if raw {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            raw = true;
            out.push(arg);
        } else if arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--") {
            for c in arg.chars().skip(1) {
                out.push(format!("-{c}"));
            }
        } else {
            out.push(arg);
        }
    }
    out
}

enum Input {
    File(String),
    Snippet(String),
}

struct Opts {
    input: Input,
    jpaths: Vec<PathBuf>,
    ext_vars: Vec<(String, ExtVar)>,
    multi_dir: Option<String>,
    yaml_stream: bool,
    output_file: Option<String>,
    config: EvalConfig,
}

fn split_var(arg: &str, flag: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Err(format!("ERROR: {flag} argument requires <var>=<val>, got: {arg}")),
    }
}

fn env_var(name: &str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("ERROR: environment variable {name} was undefined."))
}

fn parse_number<N: std::str::FromStr>(flag: &str, value: &str) -> Result<N, String> {
    value
        .parse()
        .map_err(|_| format!("ERROR: invalid {flag} value: {value}"))
}

/// Parses the command line; `Ok(None)` means help or version was printed.
fn parse_opts(args: &[String]) -> Result<Option<Opts>, String> {
    let mut config = EvalConfig::default();
    let mut jpaths = Vec::new();
    let mut ext_vars = Vec::new();
    let mut multi_dir = None;
    let mut yaml_stream = false;
    let mut output_file = None;
    let mut exec = false;
    let mut remaining: Vec<String> = Vec::new();

    let mut i = 0;
    let next = |i: &mut usize| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| "ERROR: expected another commandline argument.".to_string())
    };
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", usage());
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("{VERSION}");
                return Ok(None);
            }
            "-e" | "--exec" => exec = true,
            "-J" | "--jpath" => jpaths.push(PathBuf::from(next(&mut i)?)),
            "-V" | "--var" => {
                let (name, value) = split_var(&next(&mut i)?, "-V")?;
                ext_vars.push((name, ExtVar::Str(value)));
            }
            "-E" | "--env" => {
                let name = next(&mut i)?;
                let value = env_var(&name)?;
                ext_vars.push((name, ExtVar::Str(value)));
            }
            "--code-var" => {
                let (name, value) = split_var(&next(&mut i)?, "--code-var")?;
                ext_vars.push((name, ExtVar::Code(value)));
            }
            "--code-env" => {
                let name = next(&mut i)?;
                let value = env_var(&name)?;
                ext_vars.push((name, ExtVar::Code(value)));
            }
            "--code-file" => {
                let (name, file) = split_var(&next(&mut i)?, "--code-file")?;
                let code = fs::read_to_string(&file)
                    .map_err(|err| format!("ERROR: could not read {file}: {err}"))?;
                ext_vars.push((name, ExtVar::Code(code)));
            }
            "-m" | "--multi" => multi_dir = Some(next(&mut i)?),
            "-y" | "--yaml-stream" => yaml_stream = true,
            "-S" | "--string" => config.string_output = true,
            "-s" | "--max-stack" => {
                config.max_stack = parse_number("--max-stack", &next(&mut i)?)?;
                if config.max_stack == 0 {
                    return Err("ERROR: invalid --max-stack value: 0".to_string());
                }
            }
            "-t" | "--max-trace" => {
                config.max_trace = parse_number("--max-trace", &next(&mut i)?)?;
            }
            "--gc-min-objects" => {
                config.gc_min_objects = parse_number("--gc-min-objects", &next(&mut i)?)?;
            }
            "--gc-growth-trigger" => {
                config.gc_growth_trigger = parse_number("--gc-growth-trigger", &next(&mut i)?)?;
                if !config.gc_growth_trigger.is_finite() || config.gc_growth_trigger < 0.0 {
                    return Err(format!(
                        "ERROR: invalid --gc-growth-trigger value: {}",
                        config.gc_growth_trigger
                    ));
                }
            }
            "-o" | "--output-file" => output_file = Some(next(&mut i)?),
            "--" => {
                remaining.extend(args[i + 1..].iter().cloned());
                break;
            }
            other => {
                if other.starts_with('-') && other.len() > 1 {
                    return Err(format!("ERROR: unrecognized argument: {other}\n\n{}", usage()));
                }
                remaining.push(other.to_string());
            }
        }
        i += 1;
    }

    if remaining.len() != 1 {
        return Err(format!(
            "ERROR: must give exactly one {}\n\n{}",
            if exec { "code snippet" } else { "filename" },
            usage()
        ));
    }
    let want = remaining.remove(0);
    let input = if exec {
        Input::Snippet(want)
    } else {
        Input::File(want)
    };
    Ok(Some(Opts {
        input,
        jpaths,
        ext_vars,
        multi_dir,
        yaml_stream,
        output_file,
        config,
    }))
}

fn write_output(text: &str, output_file: Option<&str>) -> Result<(), String> {
    match output_file {
        None => {
            print!("{text}");
            Ok(())
        }
        Some(path) => fs::write(path, text)
            .map_err(|err| format!("ERROR: could not write {path}: {err}")),
    }
}

fn run() -> Result<(), String> {
    let args = simplify_args(env::args().skip(1));
    let Some(opts) = parse_opts(&args)? else {
        return Ok(());
    };

    let mut runner = match &opts.input {
        Input::Snippet(code) => Runner::new(code, "<cmdline>", opts.config.clone()),
        Input::File(path) if path.as_str() == "-" => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|err| format!("ERROR: could not read stdin: {err}"))?;
            Runner::new(&source, "<stdin>", opts.config.clone())
        }
        Input::File(path) => Runner::from_file(path, opts.config.clone()),
    }
    .map_err(|err| err.to_string())?;

    for (name, value) in opts.ext_vars {
        runner.add_ext_var(name, value);
    }
    let mut resolver = FileResolver::new(opts.jpaths.clone());

    if let Some(dir) = &opts.multi_dir {
        let documents = runner.run_multi(&mut resolver).map_err(|err| err.to_string())?;
        fs::create_dir_all(dir).map_err(|err| format!("ERROR: could not create {dir}: {err}"))?;
        let mut listing = String::new();
        for (name, document) in &documents {
            let path = Path::new(dir).join(name);
            let mut contents = document.clone();
            if !contents.ends_with('\n') {
                contents.push('\n');
            }
            fs::write(&path, contents)
                .map_err(|err| format!("ERROR: could not write {}: {err}", path.display()))?;
            listing.push_str(&path.to_string_lossy());
            listing.push('\n');
        }
        write_output(&listing, opts.output_file.as_deref())?;
    } else if opts.yaml_stream {
        let documents = runner.run_stream(&mut resolver).map_err(|err| err.to_string())?;
        let mut out = String::new();
        for (i, document) in documents.iter().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            out.push_str(document);
            out.push('\n');
        }
        write_output(&out, opts.output_file.as_deref())?;
    } else {
        let mut document = runner.run(&mut resolver).map_err(|err| err.to_string())?;
        document.push('\n');
        write_output(&document, opts.output_file.as_deref())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprint!("{message}");
            if !message.ends_with('\n') {
                eprintln!();
            }
            ExitCode::FAILURE
        }
    }
}
