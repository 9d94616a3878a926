//! Test doubles shared by this crate's unit tests.

use std::sync::Mutex;

use fabricboot_common::{CmdOutput, CommandError, CommandRunner, RunOpts};

/// Scripted command runner: responses are matched by command-line prefix,
/// unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, CmdOutput)>>,
}

impl ScriptedRunner {
    pub(crate) fn respond_stdout(&self, prefix: &str, stdout: &str) {
        self.responses.lock().unwrap().push((
            prefix.to_string(),
            CmdOutput {
                stdout: stdout.to_string(),
                code: Some(0),
                ..CmdOutput::default()
            },
        ));
    }

    pub(crate) fn fail(&self, prefix: &str) {
        self.responses.lock().unwrap().push((
            prefix.to_string(),
            CmdOutput {
                stderr: "boom".to_string(),
                code: Some(1),
                ..CmdOutput::default()
            },
        ));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[&str], _opts: &RunOpts) -> Result<CmdOutput, CommandError> {
        let line = argv.join(" ");
        self.calls.lock().unwrap().push(line.clone());
        let responses = self.responses.lock().unwrap();
        for (prefix, output) in responses.iter() {
            if line.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(CmdOutput {
            code: Some(0),
            ..CmdOutput::default()
        })
    }
}
