use crate::*;
use std::io::{self, BufRead, BufReader, Read, Write};

#[cfg(feature = "bin")]
pub mod bin {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Debug, Parser)]
    #[command(version, about = env!("CARGO_PKG_DESCRIPTION"))]
    struct Args {
        /// The script files to run
        inputs: Vec<PathBuf>,
        /// Turns off merging the consequences of asserted facts
        #[clap(long)]
        no_implications: bool,
        /// Maximum number of rewrite steps per rewrite call
        #[clap(long)]
        max_rewrite_steps: Option<usize>,
        /// Maximum number of nodes a proof search expands
        #[clap(long)]
        max_search_nodes: Option<usize>,
        /// Serializes the congruence classes after each file as JSON
        #[clap(long)]
        to_json: bool,
        /// Serializes the congruence classes after each file as a dot file
        #[clap(long)]
        to_dot: bool,
        /// Maximum number of classes to render in dot output
        #[clap(long, default_value = "100")]
        max_classes: usize,
    }

    /// Start a command-line interface for the reasoning engine.
    #[allow(clippy::disallowed_macros)]
    pub fn cli(mut engine: Engine) {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .format_timestamp(None)
            .format_target(false)
            .parse_default_env()
            .init();

        let args = Args::parse();
        if args.no_implications {
            engine.config.do_implications = false;
            engine.scope.cc.do_implications = false;
        }
        if let Some(n) = args.max_rewrite_steps {
            engine.config.max_rewrite_steps = n;
        }
        if let Some(n) = args.max_search_nodes {
            engine.config.max_search_nodes = n;
        }

        if args.inputs.is_empty() {
            log::info!("Welcome to the rwkernel REPL! (version {})", env!("CARGO_PKG_VERSION"));
            match engine.repl() {
                Ok(()) => std::process::exit(0),
                Err(err) => {
                    log::error!("{err}");
                    std::process::exit(1)
                }
            }
        }

        for input in &args.inputs {
            let program = match std::fs::read_to_string(input) {
                Ok(program) => program,
                Err(err) => {
                    log::error!("{}", Error::Io(input.clone(), err));
                    std::process::exit(1)
                }
            };
            let filename = input.to_string_lossy().into_owned();
            match engine.parse_and_run_program(Some(filename), &program) {
                Ok(msgs) => {
                    for msg in msgs {
                        println!("{msg}");
                    }
                }
                Err(err) => {
                    log::error!("{err}");
                    std::process::exit(1)
                }
            }

            if args.to_json || args.to_dot {
                let serialized = engine.serialize(SerializeConfig {
                    max_classes: args.to_dot.then_some(args.max_classes),
                    ..SerializeConfig::default()
                });
                if args.to_dot {
                    let dot_path = input.with_extension("dot");
                    if let Err(err) = serialized.to_dot_file(dot_path.clone()) {
                        log::error!("Failed to write dot file to {dot_path:?}: {err}");
                    }
                }
                if args.to_json {
                    let json_path = input.with_extension("json");
                    if let Err(err) = serialized.to_json_file(json_path.clone()) {
                        log::error!("Failed to write json file to {json_path:?}: {err}");
                    }
                }
            }
        }
    }
}

impl Engine {
    /// Start a Read-Eval-Print Loop with standard I/O.
    pub fn repl(&mut self) -> io::Result<()> {
        self.repl_with(io::stdin(), io::stdout())
    }

    /// Start a Read-Eval-Print Loop with the given input and output channel.
    pub fn repl_with<R, W>(&mut self, input: R, mut output: W) -> io::Result<()>
    where
        R: Read,
        W: Write,
    {
        let mut cmd_buffer = String::new();

        for line in BufReader::new(input).lines() {
            let line_str = line?;
            cmd_buffer.push_str(&line_str);
            cmd_buffer.push('\n');
            // handles multi-line commands
            if should_eval(&cmd_buffer) {
                run_command_in_scripting(self, &cmd_buffer, &mut output)?;
                cmd_buffer = String::new();
            }
        }

        if !cmd_buffer.trim().is_empty() {
            run_command_in_scripting(self, &cmd_buffer, &mut output)?;
        }

        Ok(())
    }
}

fn should_eval(curr_cmd: &str) -> bool {
    parse::parse_sexps(None, curr_cmd).is_ok()
}

fn run_command_in_scripting<W>(engine: &mut Engine, command: &str, mut output: W) -> io::Result<()>
where
    W: Write,
{
    match engine.parse_and_run_program(None, command) {
        Ok(msgs) => {
            for msg in msgs {
                writeln!(output, "{msg}")?;
            }
        }
        Err(err) => log::error!("{err}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_eval() {
        #[rustfmt::skip]
        let test_cases = vec![
            vec![
                "(rewrite",
                "\"1",
                ")",
                "(",
                ")))",
                "\"",
                "; )",
                ")"
            ],
            vec![
                "(rewrite 1) (rewrite",
                "2) (",
                "rewrite 3) (rewrite 4) ;;;; ("
            ],
        ];
        for test in test_cases {
            let mut cmd_buffer = String::new();
            for (i, line) in test.iter().enumerate() {
                cmd_buffer.push_str(line);
                cmd_buffer.push('\n');
                assert_eq!(should_eval(&cmd_buffer), i == test.len() - 1);
            }
        }
    }

    #[test]
    fn test_repl() {
        let mut engine = Engine::default();

        let input = "(rewrite (+ 1 2))";
        let mut output = Vec::new();
        engine.repl_with(input.as_bytes(), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "3\n");

        let input = "\n\n\n";
        let mut output = Vec::new();
        engine.repl_with(input.as_bytes(), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "");

        let input = "(rule (f x) (g x))\n(rewrite\n  (f 1))(rewrite (f 2))\n";
        let mut output = Vec::new();
        engine.repl_with(input.as_bytes(), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "(g 1)\n(g 2)\n");
    }
}
