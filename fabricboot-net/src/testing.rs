//! Recording test doubles for the command runner and ifcfg store.

use std::collections::HashMap;
use std::sync::Mutex;

use fabricboot_common::{CmdOutput, CommandError, CommandRunner, RunOpts};

use crate::error::Result;
use crate::ifcfg::IfcfgStore;

/// Command runner that records every invocation and replays canned outputs
/// keyed by command-line prefix. Unmatched commands succeed with empty
/// output.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    pub calls: Mutex<Vec<String>>,
    pub responses: Mutex<Vec<(String, CmdOutput)>>,
}

impl RecordingRunner {
    pub fn respond(&self, prefix: &str, output: CmdOutput) {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
    }

    pub fn respond_stdout(&self, prefix: &str, stdout: &str) {
        self.respond(
            prefix,
            CmdOutput {
                stdout: stdout.to_string(),
                code: Some(0),
                ..Default::default()
            },
        );
    }

    pub fn fail(&self, prefix: &str) {
        self.respond(
            prefix,
            CmdOutput {
                code: Some(1),
                ..Default::default()
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[&str], _opts: &RunOpts) -> std::result::Result<CmdOutput, CommandError> {
        let cmd = argv.join(" ");
        self.calls.lock().unwrap().push(cmd.clone());
        for (prefix, output) in self.responses.lock().unwrap().iter() {
            if cmd.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(CmdOutput {
            code: Some(0),
            ..Default::default()
        })
    }
}

/// In-memory ifcfg store.
#[derive(Default)]
pub(crate) struct MemIfcfgStore {
    pub entries: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl MemIfcfgStore {
    pub fn entries_for(&self, iface: &str) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap()
            .get(iface)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&self, iface: &str, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .entry(iface.to_string())
            .or_default()
            .push((key.to_string(), value.to_string()));
    }
}

impl IfcfgStore for MemIfcfgStore {
    fn append(&self, iface: &str, key: &str, value: &str) -> Result<()> {
        self.set(iface, key, value);
        Ok(())
    }

    fn read(&self, iface: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .entries_for(iface)
            .into_iter()
            .map(|(k, v)| (k, v.trim_matches('"').to_string()))
            .collect())
    }
}
