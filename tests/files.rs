use std::path::PathBuf;

use hashbrown::HashSet;
use libtest_mimic::Trial;
use rwkernel::*;

#[derive(Clone)]
struct Run {
    path: PathBuf,
    no_implications: bool,
}

impl Run {
    fn run(&self) {
        let _ = env_logger::builder().is_test(true).try_init();
        let program = std::fs::read_to_string(&self.path)
            .unwrap_or_else(|err| panic!("Couldn't read {:?}: {:?}", self.path, err));
        let mut engine = Engine::new(EngineConfig {
            do_implications: !self.no_implications,
            ..EngineConfig::default()
        });
        match engine.parse_and_run_program(self.path.to_str().map(String::from), &program) {
            Ok(msgs) => {
                if self.should_fail() {
                    panic!(
                        "Program should have failed! Instead, logged:\n {}",
                        msgs.join("\n")
                    );
                }
                for msg in &msgs {
                    log::info!("  {}", msg);
                }
                // serialization must work on whatever state the script left
                let serialized = engine.serialize(SerializeConfig::default());
                assert_eq!(
                    serialized.class_data.len(),
                    engine.scope().cc.classes().len()
                );
            }
            Err(err) => {
                if !self.should_fail() {
                    panic!("Top level error: {err}")
                }
            }
        }
    }

    fn into_trial(self) -> Trial {
        let name = self.name().to_string();
        Trial::test(name, move || {
            self.run();
            Ok(())
        })
    }

    fn name(&self) -> impl std::fmt::Display + '_ {
        struct Wrapper<'a>(&'a Run);
        impl std::fmt::Display for Wrapper<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.0.should_fail() {
                    write!(f, "fail/")?;
                }
                let stem = self.0.path.file_stem().unwrap();
                let stem_str = stem.to_string_lossy().replace(['.', '-', ' '], "_");
                write!(f, "{stem_str}")?;
                if self.0.no_implications {
                    write!(f, "_no_implications")?;
                }
                Ok(())
            }
        }
        Wrapper(self)
    }

    fn should_fail(&self) -> bool {
        self.path.parent().is_some_and(|p| p.ends_with("fail"))
    }

    /// Scripts that rely on merging the consequences of asserted facts.
    fn needs_implications(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .map(|program| program.contains("; needs implications"))
            .unwrap_or(false)
    }
}

fn generate_tests(glob: &str) -> Vec<Trial> {
    let mut trials = vec![];
    let mut push_trial = |run: Run| trials.push(run.into_trial());

    for entry in glob::glob(glob).unwrap() {
        let run = Run {
            path: entry.unwrap().clone(),
            no_implications: false,
        };
        push_trial(run.clone());
        if !run.should_fail() && !run.needs_implications() {
            push_trial(Run {
                no_implications: true,
                ..run
            });
        }
    }

    trials
}

fn main() {
    let args = libtest_mimic::Arguments::from_args();
    let tests = generate_tests("tests/**/*.rw");
    // ensure all the tests have unique names
    let mut names = HashSet::new();
    for test in &tests {
        let name = test.name().to_string();
        if !names.insert(name.clone()) {
            panic!("Duplicate test name: {}", name);
        }
    }
    libtest_mimic::run(&args, tests).exit();
}
